//! TCP connection factory for the backend RPC server

use async_trait::async_trait;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::pool::{BoxError, Connection, ConnectionFactory};

/// Open TCP connection to the backend RPC server
#[derive(Debug)]
pub struct RpcConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl RpcConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }

    /// Underlying stream, for issuing a call
    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Connection for RpcConnection {
    fn close(self) -> Result<(), BoxError> {
        let stream = self.stream.into_std()?;
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already hung up
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Dials the backend RPC server
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnector {
    type Connection = RpcConnection;

    async fn connect(&self) -> Result<RpcConnection, BoxError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| -> BoxError {
                format!(
                    "connecting to {} timed out after {}ms",
                    self.addr,
                    self.connect_timeout.as_millis()
                )
                .into()
            })??;

        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!("🔌 Dialed RPC backend {}", peer);

        Ok(RpcConnection::new(stream, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let connector = TcpConnector::new(addr.to_string(), Duration::from_secs(1));
        let conn = connector.connect().await.unwrap();
        assert_eq!(conn.peer_addr(), addr);

        let (_accepted, _) = listener.accept().await.unwrap();
        assert!(conn.close().is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Grab a free port, then stop listening on it
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let connector = TcpConnector::new(addr.to_string(), Duration::from_secs(1));
        assert!(connector.connect().await.is_err());
    }
}
