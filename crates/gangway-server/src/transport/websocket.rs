//! WebSocket acceptor for tunnel connections.
//!
//! Accepting the TCP connection and performing the WebSocket upgrade are
//! separate steps: the acceptor returns raw streams immediately so a peer
//! that stalls mid-handshake cannot hold up the accept loop, and the
//! upgrade runs on the per-connection task. Endpoint authentication
//! happens before a connection reaches this process and is not repeated
//! here.

use gangway_core::{GangwayError, GangwayResult};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

/// Listening socket for incoming tunnel connections.
pub struct TunnelListener {
    inner: TcpListener,
}

impl TunnelListener {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> GangwayResult<Self> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|e| GangwayError::Transport(format!("bind {addr} failed: {e}")))?;
        info!(addr = %addr, "tunnel listener bound");
        Ok(Self { inner })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> GangwayResult<SocketAddr> {
        self.inner
            .local_addr()
            .map_err(|e| GangwayError::Transport(format!("local addr unavailable: {e}")))
    }

    /// Wait for the next TCP connection.
    pub async fn accept(&self) -> GangwayResult<(TcpStream, SocketAddr)> {
        self.inner
            .accept()
            .await
            .map_err(|e| GangwayError::Transport(format!("accept failed: {e}")))
    }
}

/// Perform the WebSocket upgrade on an accepted connection.
pub async fn upgrade(
    stream: TcpStream,
    remote: SocketAddr,
) -> GangwayResult<WebSocketStream<TcpStream>> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| GangwayError::Transport(format!("handshake with {remote} failed: {e}")))?;
    debug!(remote = %remote, "connection upgraded");
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_accept_and_upgrade() {
        let listener = TunnelListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            tokio_tungstenite::client_async(format!("ws://{addr}/"), stream)
                .await
                .unwrap()
        });

        let (stream, remote) = listener.accept().await.unwrap();
        assert!(upgrade(stream, remote).await.is_ok());
        client.await.unwrap();
    }
}
