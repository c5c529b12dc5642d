//! Session lifecycle: PTY spawn, ephemeral artifacts, relay loops.

pub mod artifacts;
pub mod pty;
pub mod tunnel;

pub use tunnel::{Session, SessionOptions};
