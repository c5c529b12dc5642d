//! Server configuration: TOML file + CLI overrides.
//!
//! The `[[hosts]]` table and `identity_file` stand in for the external
//! collaborators that own host storage and key decryption; the tunnel
//! itself only ever sees the resulting records and key material.

use gangway_core::{GangwayError, GangwayResult, HostRecord};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    /// Host records rendered into each session's alias configuration.
    #[serde(default)]
    pub hosts: Vec<HostRecord>,
    /// Path to private-key material written into key-backed sessions.
    #[serde(default)]
    pub identity_file: Option<String>,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shell to spawn; defaults to `$SHELL` at spawn time.
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default = "default_term")]
    pub term: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            shell: None,
            term: default_term(),
        }
    }
}

fn default_port() -> u16 {
    4420
}
fn default_term() -> String {
    "xterm-256color".to_string()
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub shell: Option<String>,
    pub term: String,
    pub hosts: Vec<HostRecord>,
    pub identity_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_shell: Option<&str>,
    ) -> GangwayResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| GangwayError::Other(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let port = cli_port.unwrap_or(file_config.server.port);
        let shell = cli_shell
            .map(|s| s.to_string())
            .or(file_config.server.shell);

        Ok(Self {
            port,
            shell,
            term: file_config.server.term,
            hosts: file_config.hosts,
            identity_file: file_config.identity_file.as_deref().map(expand_tilde_str),
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
