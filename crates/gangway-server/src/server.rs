//! Connection acceptor: wires accepted streams to tunnel sessions.
//!
//! For every accepted connection the acceptor gathers the host records
//! and key material from the configured collaborator shims, starts a
//! session, and runs its relay loops to completion. A failed session
//! start closes the connection; it never takes the server down.

use crate::config::ServerConfig;
use crate::events::SessionEvents;
use crate::session::{Session, SessionOptions};
use crate::transport::websocket::{self, TunnelListener};
use gangway_core::{GangwayError, GangwayResult};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// The gangway server instance.
pub struct GangwayServer {
    config: ServerConfig,
    events: Arc<dyn SessionEvents>,
}

impl GangwayServer {
    pub fn new(config: ServerConfig, events: Arc<dyn SessionEvents>) -> Self {
        Self { config, events }
    }

    /// Accept connections until shut down. Each connection is upgraded
    /// and run on its own task; a failed connection never ends the loop.
    pub async fn run(self) -> GangwayResult<()> {
        let server = Arc::new(self);

        let bind_addr: SocketAddr = format!("0.0.0.0:{}", server.config.port)
            .parse()
            .map_err(|e| GangwayError::Other(format!("invalid address: {e}")))?;
        let listener = TunnelListener::bind(bind_addr).await?;

        info!(port = server.config.port, hosts = server.config.hosts.len(), "gangway-server ready");

        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let srv = server.clone();
            tokio::spawn(async move {
                if let Err(e) = srv.handle_connection(stream, remote).await {
                    warn!(remote = %remote, error = %e, "connection error");
                }
            });
        }
    }

    /// Upgrade an accepted connection and run one tunnel session over it.
    async fn handle_connection(&self, stream: TcpStream, remote: SocketAddr) -> GangwayResult<()> {
        let ws = websocket::upgrade(stream, remote).await?;
        info!(remote = %remote, "starting tunnel session");

        let opts = SessionOptions {
            shell: self.config.shell.clone(),
            term: self.config.term.clone(),
            records: self.config.hosts.clone(),
            key_material: self.load_key_material(),
            ..SessionOptions::default()
        };

        let session = Session::start(opts, self.events.clone())?;
        session.run(ws).await;
        Ok(())
    }

    /// Read key material from the configured identity file, if any.
    ///
    /// Decryption-at-rest is a collaborator concern; by the time material
    /// reaches this process it is plaintext. A missing or unreadable file
    /// degrades to a keyless session rather than failing the connection.
    fn load_key_material(&self) -> Option<String> {
        let path = self.config.identity_file.as_ref()?;
        match std::fs::read_to_string(path) {
            Ok(material) => Some(material),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read identity file, session will be keyless");
                None
            }
        }
    }
}
