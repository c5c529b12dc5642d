//! Host records supplied by the surrounding system.
//!
//! A record describes one remote host the session shell may reach through
//! the generated alias configuration. Records are read-only to this crate
//! and are never persisted here.

use serde::Deserialize;

/// A single remote-host entry for the alias configuration.
///
/// Empty `address` means the alias name doubles as the hostname; `port`
/// of `None` means the client default. Fields are validated at render
/// time, not at construction; an invalid record is skipped, never fatal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostRecord {
    /// Alias name the shell user types.
    pub name: String,
    /// Hostname or address to connect to.
    #[serde(default)]
    pub address: String,
    /// Remote port, if not the client default.
    #[serde(default)]
    pub port: Option<i64>,
    /// Remote account name.
    #[serde(default)]
    pub user: String,
}
