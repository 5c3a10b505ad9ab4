use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use udp_joystick::config::{BUTTON_COUNT, MAX_LINE_LEN};
use udp_joystick::joystick::{ButtonSlot, JsEvent, MergeError, Snapshot};
use udp_joystick::link::receiver::MAX_RECV_FAILURES;
use udp_joystick::link::{self, DatagramChannel, LinkError, Receiver, Transmitter, UdpChannel};
use udp_joystick::wire::encode;

const WAIT: Duration = Duration::from_secs(2);

async fn local_pair() -> (Transmitter<UdpChannel>, Receiver<UdpChannel>) {
    let listen: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = UdpChannel::bind(listen).await.unwrap();
    let client = UdpChannel::connect(server.local_addr().unwrap()).await.unwrap();
    (Transmitter::new(client), Receiver::new(server))
}

async fn drain_until(receiver: &mut Receiver<UdpChannel>, expected: usize) {
    let mut processed = 0;
    timeout(WAIT, async {
        while processed < expected {
            processed += receiver.drain_pending().unwrap();
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("datagrams did not arrive in time");
}

#[tokio::test]
async fn replayed_events_prime_without_sending() {
    let (mut transmitter, receiver) = local_pair().await;
    let mut updates = receiver.subscribe();
    let cancel = CancellationToken::new();
    let receiving = tokio::spawn(receiver.run(cancel.clone()));

    let sent = transmitter
        .handle_event(JsEvent::button(10, ButtonSlot::L1.index(), true).into_init())
        .await
        .unwrap();
    assert!(!sent);
    assert!(!transmitter.snapshot().initialized);

    let sent = transmitter
        .handle_event(JsEvent::axis(25, 2, -1200))
        .await
        .unwrap();
    assert!(sent);
    assert_eq!(transmitter.stats().sent, 1);

    timeout(WAIT, updates.changed()).await.unwrap().unwrap();
    let mirrored = updates.borrow().clone();
    assert_eq!(&mirrored, transmitter.snapshot());
    assert!(mirrored.is_pressed(ButtonSlot::L1));
    assert_eq!(mirrored.axes.r_stick_x, -1200);

    cancel.cancel();
    receiving.await.unwrap().unwrap();
}

#[tokio::test]
async fn receiver_keeps_only_valid_newer_packets() {
    let server = UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let mut receiver = Receiver::new(server);
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut newer = Snapshot {
        timestamp: 300,
        ..Snapshot::default()
    };
    newer.buttons[ButtonSlot::Select as usize] = 1;

    let packets = [
        encode(&Snapshot {
            timestamp: 200,
            ..Snapshot::default()
        }),
        encode(&Snapshot {
            timestamp: 100,
            ..Snapshot::default()
        }),
        "42 400 garbage".to_string(),
        encode(&newer),
    ];
    for packet in &packets {
        sock.send_to(packet.as_bytes(), addr).await.unwrap();
    }

    drain_until(&mut receiver, packets.len()).await;

    assert_eq!(receiver.snapshot().timestamp, 300);
    assert!(receiver.snapshot().is_pressed(ButtonSlot::Select));
    assert_eq!(receiver.stats().accepted, 2);
    assert_eq!(receiver.stats().discarded, 2);
}

#[tokio::test]
async fn fatal_event_stops_transmitter_and_cancels() {
    let (transmitter, _receiver) = local_pair().await;
    let (tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    tx.send(JsEvent::button(1, 0, true)).await.unwrap();
    tx.send(JsEvent::button(2, BUTTON_COUNT as u8, true))
        .await
        .unwrap();

    let result = timeout(WAIT, transmitter.run(rx, cancel.clone()))
        .await
        .unwrap();
    assert!(matches!(
        result,
        Err(LinkError::Fatal(MergeError::ButtonIndexOutOfRange { index })) if index == BUTTON_COUNT as u8
    ));
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn closed_source_ends_transmitter() {
    let (transmitter, _receiver) = local_pair().await;
    let (tx, rx) = mpsc::channel::<JsEvent>(8);
    drop(tx);

    let result = timeout(WAIT, transmitter.run(rx, CancellationToken::new()))
        .await
        .unwrap();
    assert!(matches!(result, Err(LinkError::SourceClosed)));
}

#[tokio::test]
async fn cancelled_receiver_returns_cleanly() {
    let (_, receiver) = local_pair().await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    timeout(WAIT, receiver.run(cancel)).await.unwrap().unwrap();
}

#[tokio::test]
async fn loopback_mirrors_live_events() {
    let (transmitter, receiver) = local_pair().await;
    let mut updates = receiver.subscribe();
    let (tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let running = tokio::spawn(link::run_loopback(transmitter, receiver, rx, cancel.clone()));

    tx.send(JsEvent::axis(1, 4, 32767).into_init()).await.unwrap();
    tx.send(JsEvent::button(2, ButtonSlot::Start.index(), true))
        .await
        .unwrap();
    tx.send(JsEvent::axis(3, 0, 500)).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    // Packets are drained after the next event, so one more pushes the earlier ones through.
    tx.send(JsEvent::axis(4, 1, -500)).await.unwrap();

    let mirrored = timeout(WAIT, updates.wait_for(|s| s.timestamp >= 3))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert!(mirrored.is_pressed(ButtonSlot::Start));
    assert_eq!(mirrored.axes.cross_x, 32767);
    assert_eq!(mirrored.axes.l_stick_x, 500);

    drop(tx);
    let result = timeout(WAIT, running).await.unwrap().unwrap();
    assert!(matches!(result, Err(LinkError::SourceClosed)));
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn oversized_datagram_is_discarded_not_truncated() {
    let server = UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let mut receiver = Receiver::new(server);
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // Cut at MAX_LINE_LEN this would still be 20 fields, ending in "12".
    let zero = encode(&Snapshot {
        timestamp: 100,
        ..Snapshot::default()
    });
    let padding = " ".repeat(MAX_LINE_LEN - zero.len());
    let packet = format!("{padding}{}12345 ", &zero[..zero.len() - 2]);
    assert!(packet.len() > MAX_LINE_LEN);
    sock.send_to(packet.as_bytes(), addr).await.unwrap();

    drain_until(&mut receiver, 1).await;

    assert_eq!(receiver.stats().accepted, 0);
    assert_eq!(receiver.stats().discarded, 1);
    assert_eq!(receiver.snapshot(), &Snapshot::default());
}

/// Channel whose every receive fails
struct BrokenChannel;

impl DatagramChannel for BrokenChannel {
    async fn send(&self, packet: &[u8]) -> io::Result<usize> {
        Ok(packet.len())
    }

    async fn recv(&self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "socket gone"))
    }

    fn try_recv(&self, _buf: &mut [u8]) -> io::Result<Option<usize>> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "socket gone"))
    }
}

#[tokio::test(flavor = "current_thread")]
async fn persistent_receive_errors_stop_receiver() {
    tokio::time::pause();
    let receiver = Receiver::new(BrokenChannel);
    let started = tokio::time::Instant::now();

    let result = receiver.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(LinkError::Io(e)) if e.kind() == io::ErrorKind::ConnectionReset));
    let waited = started.elapsed();
    assert!(waited >= link::receiver::RECV_RETRY_DELAY * (MAX_RECV_FAILURES - 1));
}

#[tokio::test]
async fn receive_errors_back_off_until_cancelled() {
    let receiver = Receiver::new(BrokenChannel);
    let cancel = CancellationToken::new();
    let running = tokio::spawn(receiver.run(cancel.clone()));

    sleep(link::receiver::RECV_RETRY_DELAY).await;
    cancel.cancel();
    timeout(WAIT, running).await.unwrap().unwrap().unwrap();
}

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "current_thread")]
async fn loopback_reports_both_flows_periodically() {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (transmitter, receiver) = local_pair().await;
    let (tx, rx) = mpsc::channel::<JsEvent>(8);
    let cancel = CancellationToken::new();

    tokio::time::pause();
    let running = tokio::spawn(link::run_loopback(transmitter, receiver, rx, cancel.clone()));
    tokio::task::yield_now().await;
    assert!(!log.text().contains("stats:"));

    tokio::time::advance(Duration::from_secs(11)).await;
    tokio::task::yield_now().await;

    let text = log.text();
    assert!(text.contains("Transmitter stats:"), "log was: {text}");
    assert!(text.contains("Receiver stats:"), "log was: {text}");

    cancel.cancel();
    running.await.unwrap().unwrap();
    drop(tx);
}
