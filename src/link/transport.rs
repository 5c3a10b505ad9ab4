use std::future::Future;
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Connectionless byte channel the link flows run on
pub trait DatagramChannel {
    fn send(&self, packet: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Waits for the next datagram
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// `Ok(None)` when nothing is queued
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
}

impl UdpChannel {
    /// Socket bound to `addr` that accepts datagrams from anyone
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        debug!("UDP channel listening on {}", socket.local_addr()?);
        Ok(Self { socket })
    }

    /// Socket on an ephemeral port that sends to `peer`
    pub async fn connect(peer: SocketAddr) -> io::Result<Self> {
        let local = match peer {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        debug!("UDP channel {} sending to {}", socket.local_addr()?, peer);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramChannel for UdpChannel {
    async fn send(&self, packet: &[u8]) -> io::Result<usize> {
        self.socket.send(packet).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, from) = self.socket.recv_from(buf).await?;
        trace!("Received {} bytes from {}", len, from);
        Ok(len)
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.try_recv_from(buf) {
            Ok((len, from)) => {
                trace!("Received {} bytes from {}", len, from);
                Ok(Some(len))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
