use clap::{Parser, ValueEnum};
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::Formatter;
use tracing_subscriber::reload;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use udp_joystick::config::{Config, SourceKind};
use udp_joystick::joystick::{ButtonSlot, JsEvent, Snapshot};
use udp_joystick::link::{self, LinkError, Receiver, Transmitter, UdpChannel, EVENT_BUFFER};
use udp_joystick::source::{SourceHandle, SourceSettings};

#[derive(Parser, Debug)]
#[command(
    name = "udp-joystick",
    about = "Mirror a joystick's buttons and axes to another host over UDP."
)]
struct Args {
    /// send: read the joystick and transmit; receive: mirror a remote joystick;
    /// loopback: both at once in this process
    #[arg(value_enum)]
    mode: Mode,

    /// Config file (defaults to <config dir>/udp-joystick/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Host to send packets to
    #[arg(long, value_name = "HOST")]
    server_ip: Option<String>,

    /// Port to send packets to
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Port to receive packets on
    #[arg(long, value_name = "PORT")]
    listen_port: Option<u16>,

    /// Where joystick events come from
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// Joystick device node for the device source
    #[arg(long, value_name = "PATH")]
    device: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Send,
    Receive,
    Loopback,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup()?;

    // Logging starts at the default level so config loading is visible, then
    // switches to the configured one. RUST_LOG overrides both.
    let rust_log = std::env::var("RUST_LOG").ok();
    let log_filter_handle = setup_logging(log_filter(rust_log.as_deref(), Level::INFO));

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)
        .await
        .wrap_err_with(|| format!("Failed to load config from {}", config_path.display()))?;
    apply_overrides(&mut config, &args);

    log_filter_handle.reload(log_filter(rust_log.as_deref(), config.log_level()?))?;
    info!("Starting udp-joystick in {:?} mode", args.mode);

    let cancel = CancellationToken::new();
    spawn_shutdown_signal(cancel.clone());

    match args.mode {
        Mode::Send => run_sender(&config, cancel).await,
        Mode::Receive => run_receiver(&config, cancel).await,
        Mode::Loopback => run_loopback(&config, cancel).await,
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(filter: EnvFilter) -> reload::Handle<EnvFilter, Formatter> {
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter_reloading();
    let handle = builder.reload_handle();
    builder.init();
    handle
}

/// Directives from `RUST_LOG` when it parses, otherwise just `level`
fn log_filter(rust_log: Option<&str>, level: Level) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()))
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(server_ip) = &args.server_ip {
        config.network.server_ip = server_ip.clone();
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(listen_port) = args.listen_port {
        config.network.listen_port = listen_port;
    }
    if let Some(kind) = args.source {
        config.source.kind = kind;
    }
    if let Some(device) = &args.device {
        config.source.device_path = device.clone();
    }
}

fn spawn_shutdown_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                cancel.cancel();
            }
            Err(e) => warn!("Unable to listen for interrupt: {}", e),
        }
    });
}

async fn open_transmitter(config: &Config) -> Result<Transmitter<UdpChannel>> {
    let peer = config.resolve_server().await?;
    let channel = UdpChannel::connect(peer)
        .await
        .wrap_err_with(|| format!("Failed to open UDP socket towards {peer}"))?;
    info!("Sending joystick state to {}", peer);
    Ok(Transmitter::new(channel))
}

async fn open_receiver(config: &Config) -> Result<Receiver<UdpChannel>> {
    let addr = config.listen_addr();
    let channel = UdpChannel::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind UDP socket on {addr}"))?;
    info!("UDP server listening on {}", addr);
    Ok(Receiver::new(channel))
}

fn spawn_source(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<(SourceHandle, mpsc::Receiver<JsEvent>)> {
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let source = SourceHandle::spawn(SourceSettings::from(&config.source), event_tx, cancel.clone())?;
    Ok((source, event_rx))
}

async fn run_sender(config: &Config, cancel: CancellationToken) -> Result<()> {
    let transmitter = open_transmitter(config).await?;
    let (source, events) = spawn_source(config, &cancel)?;
    let result = transmitter.run(events, cancel).await;
    finish(result, source).await
}

async fn run_receiver(config: &Config, cancel: CancellationToken) -> Result<()> {
    let receiver = open_receiver(config).await?;
    tokio::spawn(report_buttons(receiver.subscribe()));
    receiver.run(cancel).await?;
    Ok(())
}

async fn run_loopback(config: &Config, cancel: CancellationToken) -> Result<()> {
    let receiver = open_receiver(config).await?;
    tokio::spawn(report_buttons(receiver.subscribe()));
    let transmitter = open_transmitter(config).await?;
    let (source, events) = spawn_source(config, &cancel)?;
    let result = link::run_loopback(transmitter, receiver, events, cancel).await;
    finish(result, source).await
}

/// When the link stopped because the source went away, the source's own error is
/// the one worth reporting.
async fn finish(result: Result<(), LinkError>, source: SourceHandle) -> Result<()> {
    match result {
        Err(LinkError::SourceClosed) => {
            tokio::task::spawn_blocking(move || source.join())
                .await?
                .map_err(|e| eyre!("Event source failed: {}", e))
        }
        other => Ok(other?),
    }
}

async fn report_buttons(mut updates: watch::Receiver<Snapshot>) {
    let mut last: Vec<ButtonSlot> = Vec::new();
    while updates.changed().await.is_ok() {
        let pressed: Vec<ButtonSlot> = updates.borrow_and_update().pressed().collect();
        if pressed != last {
            info!("Pressed buttons: {:?}", pressed);
            last = pressed;
        }
    }
}
