//! Link-local multicast socket

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use kedge_core::{KedgeError, KedgeResult};
use kedge_wire::MAX_DATAGRAM_SIZE;

/// UDP socket bound to the zone port and joined to its multicast group
pub struct PulseSocket {
    socket: Arc<UdpSocket>,
    group: SocketAddr,
    local_addr: SocketAddr,
}

impl PulseSocket {
    /// Bind to the zone port and join `group` on `interface` (0 = default).
    ///
    /// Loopback of own multicast sends is disabled; self-echoes that still
    /// arrive through other paths are dropped upstream by sender id.
    pub async fn bind(group: Ipv6Addr, port: u16, interface: u32) -> KedgeResult<Self> {
        let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, port))
            .await
            .map_err(|e| KedgeError::TransportError(e.to_string()))?;

        socket
            .join_multicast_v6(&group, interface)
            .map_err(|e| KedgeError::TransportError(e.to_string()))?;
        socket
            .set_multicast_loop_v6(false)
            .map_err(|e| KedgeError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| KedgeError::TransportError(e.to_string()))?;

        Ok(PulseSocket {
            socket: Arc::new(socket),
            group: SocketAddr::V6(SocketAddrV6::new(group, port, 0, interface)),
            local_addr,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Multicast destination used by [`broadcast`](Self::broadcast)
    pub fn group(&self) -> SocketAddr {
        self.group
    }

    /// Send a datagram to the whole zone.
    pub async fn broadcast(&self, bytes: &[u8]) -> KedgeResult<()> {
        self.socket
            .send_to(bytes, self.group)
            .await
            .map_err(|e| KedgeError::TransportError(e.to_string()))?;
        Ok(())
    }

    /// Send a datagram to one peer.
    pub async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> KedgeResult<()> {
        self.socket
            .send_to(bytes, dest)
            .await
            .map_err(|e| KedgeError::TransportError(e.to_string()))?;
        Ok(())
    }

    /// Receive one datagram (blocking).
    pub async fn recv_from(&self) -> KedgeResult<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, addr) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| KedgeError::TransportError(e.to_string()))?;

        Ok((buf[..len].to_vec(), addr))
    }

    /// Get a clone of the socket for concurrent operations
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

/// Datagram receiver channel
pub type DatagramReceiver = mpsc::Receiver<(Vec<u8>, SocketAddr)>;

/// Datagram sender channel
pub type DatagramSender = mpsc::Sender<(Vec<u8>, SocketAddr)>;

/// Start a background receive loop.
///
/// Receive errors back off and retry rather than kill the loop; the loop
/// ends only when the channel's receiving side is dropped.
pub fn start_receive_loop(socket: Arc<UdpSocket>, buffer_size: usize) -> DatagramReceiver {
    let (tx, rx) = mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut backoff = Duration::from_millis(100);
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    backoff = Duration::from_millis(100);
                    let datagram = buf[..len].to_vec();
                    if tx.send((datagram, addr)).await.is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(e) => {
                    tracing::warn!("multicast receive error: {}", e);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_loop_delivers_datagrams() {
        let receiver_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver_addr = receiver_socket.local_addr().unwrap();
        let mut incoming = start_receive_loop(Arc::new(receiver_socket), 16);

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"pulse bytes", receiver_addr).await.unwrap();

        let (datagram, from) = incoming.recv().await.unwrap();
        assert_eq!(datagram, b"pulse bytes");
        assert_eq!(from, sender.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_receive_loop_stops_when_receiver_dropped() {
        let receiver_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver_addr = receiver_socket.local_addr().unwrap();
        let incoming = start_receive_loop(Arc::new(receiver_socket), 1);
        drop(incoming);

        // The loop exits on its next send; this just must not hang or panic.
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"late", receiver_addr).await.unwrap();
    }
}
