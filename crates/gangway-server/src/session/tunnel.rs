//! The session state machine and its relay loops.
//!
//! A session couples one spawned shell on a PTY with one WebSocket
//! stream. Three activities run per session: the outbound pump (PTY →
//! stream, binary frames), the inbound pump (stream → PTY, with text
//! frames parse-attempted as control messages), and an exit watcher that
//! ends the tunnel when the shell terminates. All three converge on
//! `close()`, which is guarded so that exactly one teardown executes no
//! matter how many triggers fire.

use crate::events::SessionEvents;
use crate::session::artifacts::SessionArtifacts;
use crate::session::pty::PtyHandle;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gangway_core::{
    parse_control, validate_geometry, ControlMessage, GangwayError, GangwayResult, HostRecord,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Bytes read from the PTY per outbound frame.
const PTY_CHUNK_SIZE: usize = 4096;

/// Maximum accepted inbound frame (1 MiB).
const MAX_FRAME_SIZE: usize = 1_048_576;

/// Initial terminal geometry; clients resize immediately after connecting.
const INITIAL_ROWS: u16 = 24;
const INITIAL_COLS: u16 = 80;

/// Everything needed to start a session.
pub struct SessionOptions {
    /// Shell to spawn; `None` uses `$SHELL` falling back to `/bin/sh`.
    pub shell: Option<String>,
    /// Value forced into `TERM`.
    pub term: String,
    /// Host records to render into the alias configuration.
    pub records: Vec<HostRecord>,
    /// Decrypted private-key material, supplied by a collaborator.
    pub key_material: Option<String>,
    /// Parent directory for the ephemeral session directory.
    pub scratch_dir: PathBuf,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            shell: None,
            term: "xterm-256color".to_string(),
            records: Vec::new(),
            key_material: None,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// A live terminal tunnel session.
pub struct Session {
    id: String,
    pty: PtyHandle,
    artifacts: SessionArtifacts,
    /// Close-once guard: the first swap executes teardown.
    closing: AtomicBool,
    /// One-shot shutdown signal observed by both pumps.
    shutdown_tx: watch::Sender<bool>,
    events: Arc<dyn SessionEvents>,
}

impl Session {
    /// Prepare session artifacts and spawn the shell.
    ///
    /// On any failure after the ephemeral directory was created, the
    /// directory is removed before the error propagates.
    pub fn start(
        opts: SessionOptions,
        events: Arc<dyn SessionEvents>,
    ) -> GangwayResult<Arc<Self>> {
        let id = generate_session_id();
        let artifacts = SessionArtifacts::prepare(
            &opts.scratch_dir,
            &id,
            &opts.records,
            opts.key_material.as_deref(),
        )?;

        let pty = match PtyHandle::spawn(
            opts.shell.as_deref(),
            &opts.term,
            &artifacts.env,
            INITIAL_ROWS,
            INITIAL_COLS,
        ) {
            Ok(pty) => pty,
            Err(e) => {
                artifacts.remove();
                return Err(e);
            }
        };

        events.session_started(&id);
        info!(session_id = %id, hosts = opts.records.len(), "session started");

        Ok(Arc::new(Self {
            id,
            pty,
            artifacts,
            closing: AtomicBool::new(false),
            shutdown_tx: watch::channel(false).0,
            events,
        }))
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current PTY geometry as (rows, cols).
    pub fn size(&self) -> (u16, u16) {
        self.pty.size()
    }

    /// Whether teardown has been triggered.
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// A receiver that resolves to `true` once the session has closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Validate and apply a geometry change. Rejected geometry leaves the
    /// PTY unchanged; calling after close returns an error, never panics.
    pub fn resize(&self, rows: u64, cols: u64) -> GangwayResult<()> {
        validate_geometry(rows, cols)?;
        if self.is_closed() {
            return Err(GangwayError::Closed);
        }
        self.pty.resize(rows as u16, cols as u16)
    }

    /// Tear the session down: signal both pumps, kill the shell if still
    /// running, and remove the ephemeral directory tree (best effort).
    ///
    /// Idempotent and safe under concurrent triggers: the first caller
    /// executes teardown, later callers return immediately and observe
    /// completion through [`closed_signal`](Self::closed_signal).
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        // send_replace stores the value even when no receiver is
        // subscribed yet, so waiters arriving after close still resolve.
        self.shutdown_tx.send_replace(true);
        if let Err(e) = self.pty.kill() {
            // The shell may already have exited.
            debug!(session_id = %self.id, error = %e, "kill at close");
        }
        self.artifacts.remove();
        self.events.session_closed(&self.id);
        info!(session_id = %self.id, "session closed");
    }

    /// Run the relay loops over the given stream until the session closes.
    ///
    /// Returns after both pumps have observed closure; the exit watcher
    /// ends on its own once the killed shell is reaped.
    pub async fn run(self: &Arc<Self>, ws: WebSocketStream<TcpStream>) {
        let (ws_sink, ws_source) = ws.split();

        let (pty_tx, pty_rx) = mpsc::channel::<ReaderEvent>(64);
        let Some(reader) = self.pty.take_reader() else {
            warn!(session_id = %self.id, "PTY reader already taken, session unusable");
            self.close();
            return;
        };
        if let Err(e) = spawn_reader_thread(reader, pty_tx) {
            warn!(session_id = %self.id, error = %e, "cannot start PTY reader thread");
            self.close();
            return;
        }

        let outbound = tokio::spawn(outbound_pump(self.clone(), pty_rx, ws_sink));
        let inbound = tokio::spawn(inbound_pump(self.clone(), ws_source));

        let watcher = self.clone();
        tokio::spawn(async move {
            match watcher.pty.wait().await {
                Ok(code) => debug!(session_id = %watcher.id, code, "shell exited"),
                Err(e) => warn!(session_id = %watcher.id, error = %e, "wait for shell failed"),
            }
            watcher.close();
        });

        // Final resource release happens exactly once, after both pumps
        // have unblocked; close() itself is not gated on this join.
        let _ = tokio::join!(outbound, inbound);
        self.close();
    }

    /// Write raw bytes to the PTY (blocking write moved off the runtime).
    async fn write_pty(&self, data: Vec<u8>) -> GangwayResult<()> {
        use std::io::Write as _;

        if self.is_closed() {
            return Err(GangwayError::Closed);
        }
        let writer = self.pty.writer();
        tokio::task::spawn_blocking(move || -> GangwayResult<()> {
            let mut writer = writer
                .lock()
                .map_err(|_| GangwayError::Other("PTY writer lock poisoned".into()))?;
            writer.write_all(&data)?;
            writer.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| GangwayError::Other(format!("join error: {e}")))?
    }
}

/// Resolve once the shutdown signal reads closed. The watch read guard
/// stays inside this future, keeping the pump futures `Send`.
async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

/// What the blocking PTY reader thread hands to the outbound pump.
enum ReaderEvent {
    Data(Vec<u8>),
    Eof,
    Failed(std::io::Error),
}

/// Read the PTY on a dedicated thread; blocking reads cannot share the
/// async runtime. The thread exits when the PTY closes or the pump drops
/// its receiver.
fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<ReaderEvent>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("gangway-pty-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; PTY_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.blocking_send(ReaderEvent::Eof);
                        break;
                    }
                    Ok(n) => {
                        if tx.blocking_send(ReaderEvent::Data(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        let _ = tx.blocking_send(ReaderEvent::Failed(e));
                        break;
                    }
                }
            }
        })?;
    Ok(())
}

/// PTY → stream. Preserves terminal output order; end-of-stream closes
/// the session without treating it as an error.
async fn outbound_pump(
    session: Arc<Session>,
    mut pty_rx: mpsc::Receiver<ReaderEvent>,
    mut ws_sink: SplitSink<WebSocketStream<TcpStream>, Message>,
) {
    let mut shutdown_rx = session.closed_signal();
    loop {
        tokio::select! {
            _ = wait_closed(&mut shutdown_rx) => break,
            event = pty_rx.recv() => match event {
                Some(ReaderEvent::Data(chunk)) => {
                    if let Err(e) = ws_sink.send(Message::Binary(chunk)).await {
                        debug!(session_id = %session.id, error = %e, "stream write failed");
                        session.close();
                        break;
                    }
                }
                Some(ReaderEvent::Eof) | None => {
                    debug!(session_id = %session.id, "PTY output ended");
                    session.close();
                    break;
                }
                Some(ReaderEvent::Failed(e)) => {
                    warn!(session_id = %session.id, error = %e, "PTY read failed");
                    session.close();
                    break;
                }
            }
        }
    }
    let _ = ws_sink.send(Message::Close(None)).await;
}

/// Stream → PTY. Binary frames are raw input; text frames are either a
/// recognized control message or literal keystrokes. A text frame that
/// fails to parse as a control message (including truncated near-JSON)
/// is forwarded to the shell verbatim.
async fn inbound_pump(
    session: Arc<Session>,
    mut ws_source: SplitStream<WebSocketStream<TcpStream>>,
) {
    let mut shutdown_rx = session.closed_signal();
    loop {
        tokio::select! {
            _ = wait_closed(&mut shutdown_rx) => break,
            message = ws_source.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    if data.len() > MAX_FRAME_SIZE {
                        warn!(session_id = %session.id, len = data.len(), "inbound frame too large");
                        session.close();
                        break;
                    }
                    if let Err(e) = session.write_pty(data).await {
                        debug!(session_id = %session.id, error = %e, "PTY write failed");
                        session.close();
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) if text.len() > MAX_FRAME_SIZE => {
                    warn!(session_id = %session.id, len = text.len(), "inbound frame too large");
                    session.close();
                    break;
                }
                Some(Ok(Message::Text(text))) => match parse_control(&text) {
                    Some(ControlMessage::Resize { rows, cols }) => {
                        if let Err(e) = session.resize(rows, cols) {
                            debug!(session_id = %session.id, error = %e, "resize rejected");
                        }
                    }
                    None => {
                        if let Err(e) = session.write_pty(text.into_bytes()).await {
                            debug!(session_id = %session.id, error = %e, "PTY write failed");
                            session.close();
                            break;
                        }
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    debug!(session_id = %session.id, "stream closed by peer");
                    session.close();
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong and raw frames are handled by the protocol layer.
                }
                Some(Err(e)) => {
                    debug!(session_id = %session.id, error = %e, "stream read failed");
                    session.close();
                    break;
                }
            }
        }
    }
}

/// Generate a random session ID (hex-encoded, 8 bytes = 16 hex chars).
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..8).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEvents;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct RecordingEvents {
        started: AtomicUsize,
        closed: AtomicUsize,
    }

    impl RecordingEvents {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            })
        }
    }

    impl SessionEvents for RecordingEvents {
        fn session_started(&self, _session_id: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn session_closed(&self, _session_id: &str) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sh_options(scratch: &std::path::Path) -> SessionOptions {
        SessionOptions {
            shell: Some("/bin/sh".to_string()),
            scratch_dir: scratch.to_path_buf(),
            ..SessionOptions::default()
        }
    }

    fn prod_record() -> HostRecord {
        HostRecord {
            name: "prod".into(),
            address: "10.0.0.1".into(),
            port: Some(22),
            user: "deploy".into(),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let scratch = tempfile::tempdir().unwrap();
        let events = RecordingEvents::new();
        let opts = SessionOptions {
            records: vec![prod_record()],
            ..sh_options(scratch.path())
        };
        let session = Session::start(opts, events.clone()).unwrap();
        let dir = session.artifacts.dir.clone().unwrap();
        assert!(dir.exists());

        let mut signal = session.closed_signal();
        session.close();
        session.close();

        assert!(session.is_closed());
        assert!(!dir.exists());
        assert_eq!(events.started.load(Ordering::SeqCst), 1);
        assert_eq!(events.closed.load(Ordering::SeqCst), 1);
        assert!(signal.wait_for(|closed| *closed).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_close_runs_one_teardown() {
        let scratch = tempfile::tempdir().unwrap();
        let events = RecordingEvents::new();
        let session = Session::start(sh_options(scratch.path()), events.clone()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = session.clone();
            handles.push(tokio::spawn(async move { s.close() }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(events.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resize_round_trip_and_validation() {
        let scratch = tempfile::tempdir().unwrap();
        let session = Session::start(sh_options(scratch.path()), RecordingEvents::new()).unwrap();

        assert_eq!(session.size(), (24, 80));
        session.resize(50, 200).unwrap();
        assert_eq!(session.size(), (50, 200));

        // Rejected geometry leaves the PTY unchanged.
        assert!(session.resize(0, 80).is_err());
        assert!(session.resize(24, 501).is_err());
        assert_eq!(session.size(), (50, 200));

        session.close();
        assert!(matches!(session.resize(24, 80), Err(GangwayError::Closed)));
    }

    #[tokio::test]
    async fn late_waiter_observes_close() {
        let scratch = tempfile::tempdir().unwrap();
        let session = Session::start(sh_options(scratch.path()), RecordingEvents::new()).unwrap();

        // Nothing subscribed to the shutdown signal yet.
        session.close();

        let mut signal = session.closed_signal();
        tokio::time::timeout(Duration::from_secs(2), signal.wait_for(|closed| *closed))
            .await
            .expect("waiter subscribing after close must still resolve")
            .unwrap();
    }

    /// Spawn a session over a loopback connection and return the client
    /// half plus the server task.
    async fn spawn_loopback_session() -> (
        tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
        tokio::task::JoinHandle<()>,
        tempfile::TempDir,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let scratch_path = scratch.path().to_path_buf();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let session =
                Session::start(sh_options(&scratch_path), Arc::new(NoopEvents)).unwrap();
            session.run(ws).await;
            assert!(session.is_closed());
        });

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (ws, _) = tokio_tungstenite::client_async(format!("ws://{addr}/"), stream)
            .await
            .unwrap();
        (ws, server, scratch)
    }

    #[tokio::test]
    async fn oversized_binary_frame_ends_session() {
        let (mut ws, server, _scratch) = spawn_loopback_session().await;

        ws.send(Message::Binary(vec![0u8; MAX_FRAME_SIZE + 1]))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("session did not end after oversized frame")
            .unwrap();
    }

    #[tokio::test]
    async fn oversized_text_frame_ends_session() {
        let (mut ws, server, _scratch) = spawn_loopback_session().await;

        ws.send(Message::Text("a".repeat(MAX_FRAME_SIZE + 1)))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("session did not end after oversized frame")
            .unwrap();
    }

    #[tokio::test]
    async fn tunnel_end_to_end() {
        let (mut ws, server, _scratch) = spawn_loopback_session().await;

        // Text that is not a control message is literal keystroke input.
        ws.send(Message::Text("echo tunnel-ok\n".into()))
            .await
            .unwrap();

        let mut seen = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Binary(data) = msg {
                    seen.extend_from_slice(&data);
                    if String::from_utf8_lossy(&seen).contains("tunnel-ok") {
                        break;
                    }
                }
            }
        })
        .await
        .expect("shell output never arrived");

        // A resize control frame must not be echoed as input.
        ws.send(Message::Text(r#"{"type":"resize","rows":50,"cols":200}"#.into()))
            .await
            .unwrap();

        ws.send(Message::Close(None)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("session did not close")
            .unwrap();
    }
}
