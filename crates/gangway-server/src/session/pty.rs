//! PTY wrapper using portable-pty.
//!
//! Spawns the interactive shell attached to a pseudo-terminal and provides
//! read/write handles, resize, kill, and exit waiting.

use gangway_core::{GangwayError, GangwayResult};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// A managed PTY instance.
pub struct PtyHandle {
    /// Reader side of the master; taken once by the outbound pump.
    reader: std::sync::Mutex<Option<Box<dyn Read + Send>>>,
    /// Writer side of the master, shared with the inbound pump.
    writer: Arc<std::sync::Mutex<Box<dyn Write + Send>>>,
    /// The master itself, kept for resize (Mutex because MasterPty is not Sync).
    master: std::sync::Mutex<Box<dyn MasterPty + Send>>,
    /// Child process handle, held by the exit watcher for the whole wait.
    child: Arc<tokio::sync::Mutex<Box<dyn portable_pty::Child + Send>>>,
    /// Kill handle independent of the child lock, usable while a wait is
    /// in progress.
    killer: std::sync::Mutex<Box<dyn ChildKiller + Send + Sync>>,
    /// Current terminal size as (rows, cols).
    size: std::sync::Mutex<(u16, u16)>,
}

impl PtyHandle {
    /// Spawn a new PTY running the given shell at the given size.
    ///
    /// If `shell` is `None`, `$SHELL` is used, falling back to `/bin/sh`.
    /// `env` entries are applied on top of the inherited environment;
    /// `TERM` is always forced to `term`.
    pub fn spawn(
        shell: Option<&str>,
        term: &str,
        env: &[(String, String)],
        rows: u16,
        cols: u16,
    ) -> GangwayResult<Self> {
        let pty_system = native_pty_system();

        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(size)
            .map_err(|e| GangwayError::Spawn(format!("failed to open PTY: {e}")))?;

        let shell = shell
            .map(|s| s.to_string())
            .unwrap_or_else(|| std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()));
        let mut cmd = CommandBuilder::new(&shell);
        cmd.env("TERM", term);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| GangwayError::Spawn(format!("failed to spawn shell: {e}")))?;
        let killer = child.clone_killer();

        info!(shell = %shell, rows, cols, "PTY spawned");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| GangwayError::Spawn(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| GangwayError::Spawn(format!("failed to take PTY writer: {e}")))?;

        Ok(Self {
            reader: std::sync::Mutex::new(Some(reader)),
            writer: Arc::new(std::sync::Mutex::new(writer)),
            master: std::sync::Mutex::new(pair.master),
            child: Arc::new(tokio::sync::Mutex::new(child)),
            killer: std::sync::Mutex::new(killer),
            size: std::sync::Mutex::new((rows, cols)),
        })
    }

    /// Take the blocking reader. Returns `None` after the first call;
    /// exactly one pump owns the read side.
    pub fn take_reader(&self) -> Option<Box<dyn Read + Send>> {
        self.reader.lock().ok()?.take()
    }

    /// Writer handle for the inbound pump (blocking writes, call from a
    /// spawn_blocking context).
    pub fn writer(&self) -> Arc<std::sync::Mutex<Box<dyn Write + Send>>> {
        self.writer.clone()
    }

    /// Resize the PTY. Geometry must already be validated by the caller.
    pub fn resize(&self, rows: u16, cols: u16) -> GangwayResult<()> {
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let master = self
            .master
            .lock()
            .map_err(|_| GangwayError::Other("PTY master lock poisoned".into()))?;
        master
            .resize(size)
            .map_err(|e| GangwayError::Other(format!("PTY resize failed: {e}")))?;
        drop(master);
        if let Ok(mut current) = self.size.lock() {
            *current = (rows, cols);
        }
        debug!(rows, cols, "PTY resized");
        Ok(())
    }

    /// Wait for the child process to exit. Returns the exit code.
    pub async fn wait(&self) -> GangwayResult<i32> {
        let child = self.child.clone();
        let status = tokio::task::spawn_blocking(move || {
            let mut child = child.blocking_lock();
            child.wait()
        })
        .await
        .map_err(|e| GangwayError::Other(format!("join error: {e}")))?
        .map_err(|e| GangwayError::Other(format!("wait error: {e}")))?;

        let code = status.exit_code().try_into().unwrap_or(-1i32);
        debug!(code, "PTY child exited");
        Ok(code)
    }

    /// Kill the child process if still running. Works while a `wait` is
    /// in progress on another task.
    pub fn kill(&self) -> GangwayResult<()> {
        let mut killer = self
            .killer
            .lock()
            .map_err(|_| GangwayError::Other("child killer lock poisoned".into()))?;
        killer
            .kill()
            .map_err(|e| GangwayError::Other(format!("kill failed: {e}")))?;
        Ok(())
    }

    /// Current terminal size as (rows, cols).
    pub fn size(&self) -> (u16, u16) {
        self.size.lock().map(|s| *s).unwrap_or((0, 0))
    }
}
