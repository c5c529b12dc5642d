//! Ephemeral per-session filesystem artifacts.
//!
//! When a session carries host records or private-key material, a
//! uniquely named owner-only directory is created holding the generated
//! alias configuration, the key file, and the launcher script. The
//! directory lives exactly as long as the session and is removed on every
//! exit path, including failed startup.

use gangway_core::alias::{
    render_config, render_launcher, CONFIG_FILE_NAME, IDENTITY_FILE_NAME, LAUNCHER_FILE_NAME,
};
use gangway_core::{GangwayError, GangwayResult, HostRecord};
use std::fs;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable exporting the written key path to the session.
pub const IDENTITY_ENV_VAR: &str = "GANGWAY_IDENTITY";

/// Filesystem state prepared for one session.
pub struct SessionArtifacts {
    /// The ephemeral directory, if one was needed.
    pub dir: Option<PathBuf>,
    /// Path of the written private-key file, if key material was supplied.
    pub key_path: Option<PathBuf>,
    /// Extra environment for the spawned shell (`PATH` prefix, key path).
    pub env: Vec<(String, String)>,
}

impl SessionArtifacts {
    /// Prepare the session directory under `base`.
    ///
    /// With no host records and no key material this is a no-op: no
    /// directory is created and the shell environment is untouched. Any
    /// failure after the directory exists removes it before propagating.
    pub fn prepare(
        base: &Path,
        session_id: &str,
        records: &[HostRecord],
        key_material: Option<&str>,
    ) -> GangwayResult<Self> {
        if records.is_empty() && key_material.is_none() {
            return Ok(Self {
                dir: None,
                key_path: None,
                env: Vec::new(),
            });
        }

        let dir = base.join(format!("gangway-{session_id}"));
        fs::DirBuilder::new()
            .mode(0o700)
            .create(&dir)
            .map_err(|e| {
                GangwayError::Resource(format!("cannot create session dir {}: {e}", dir.display()))
            })?;

        match populate(&dir, records, key_material) {
            Ok((key_path, env)) => {
                debug!(dir = %dir.display(), "session artifacts written");
                Ok(Self {
                    dir: Some(dir),
                    key_path,
                    env,
                })
            }
            Err(e) => {
                // No partial ephemeral state survives a failed startup.
                remove_tree(&dir);
                Err(e)
            }
        }
    }

    /// Remove the ephemeral directory tree, best effort.
    pub fn remove(&self) {
        if let Some(dir) = &self.dir {
            remove_tree(dir);
        }
    }
}

/// Write config, key, and launcher into an existing session dir.
fn populate(
    dir: &Path,
    records: &[HostRecord],
    key_material: Option<&str>,
) -> GangwayResult<(Option<PathBuf>, Vec<(String, String)>)> {
    let mut env = Vec::new();

    if !records.is_empty() {
        let config = render_config(records);
        write_mode(&dir.join(CONFIG_FILE_NAME), config.as_bytes(), 0o600)?;
    }

    let key_path = match key_material {
        Some(material) => {
            let path = dir.join(IDENTITY_FILE_NAME);
            write_mode(&path, normalize_key(material).as_bytes(), 0o600)?;
            env.push((IDENTITY_ENV_VAR.to_string(), path.display().to_string()));
            Some(path)
        }
        None => None,
    };

    let client = resolve_real_client();
    let launcher = render_launcher(&client, dir, key_path.as_deref());
    write_mode(&dir.join(LAUNCHER_FILE_NAME), launcher.as_bytes(), 0o700)?;

    // Prepend the session dir so the launcher shadows the real client for
    // any invocation made from within the session shell.
    let inherited = std::env::var("PATH").unwrap_or_default();
    let path = if inherited.is_empty() {
        dir.display().to_string()
    } else {
        format!("{}:{}", dir.display(), inherited)
    };
    env.push(("PATH".to_string(), path));

    Ok((key_path, env))
}

/// Ensure key material ends with exactly one trailing newline; some key
/// formats refuse to load without it.
fn normalize_key(material: &str) -> String {
    let mut key = material.trim_end_matches('\n').to_string();
    key.push('\n');
    key
}

/// Create a file with the given mode and write its contents.
fn write_mode(path: &Path, contents: &[u8], mode: u32) -> GangwayResult<()> {
    use std::io::Write as _;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)
        .map_err(|e| GangwayError::Resource(format!("cannot create {}: {e}", path.display())))?;
    file.write_all(contents)
        .map_err(|e| GangwayError::Resource(format!("cannot write {}: {e}", path.display())))?;
    Ok(())
}

fn remove_tree(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        // A missing directory at cleanup time is not a session failure.
        debug!(dir = %dir.display(), error = %e, "session dir cleanup skipped");
    }
}

/// Resolve the absolute path of the real secure-shell client from the
/// current `PATH`, before the session dir is prepended to it.
fn resolve_real_client() -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = std::env::var("PATH").unwrap_or_default();
    for entry in path.split(':').filter(|p| !p.is_empty()) {
        let candidate = Path::new(entry).join("ssh");
        if let Ok(meta) = candidate.metadata() {
            if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
                return candidate.display().to_string();
            }
        }
    }
    warn!("no ssh client found on PATH, launcher will use /usr/bin/ssh");
    "/usr/bin/ssh".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn record(name: &str) -> HostRecord {
        HostRecord {
            name: name.into(),
            address: "10.0.0.1".into(),
            port: Some(22),
            user: "deploy".into(),
        }
    }

    #[test]
    fn no_records_no_key_creates_nothing() {
        let base = tempfile::tempdir().unwrap();
        let artifacts = SessionArtifacts::prepare(base.path(), "s1", &[], None).unwrap();
        assert!(artifacts.dir.is_none());
        assert!(artifacts.key_path.is_none());
        assert!(artifacts.env.is_empty());
        assert_eq!(fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn records_produce_config_and_launcher() {
        let base = tempfile::tempdir().unwrap();
        let artifacts =
            SessionArtifacts::prepare(base.path(), "s2", &[record("prod")], None).unwrap();
        let dir = artifacts.dir.clone().unwrap();

        let dir_mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);

        let config = fs::read_to_string(dir.join(CONFIG_FILE_NAME)).unwrap();
        assert!(config.contains("Host prod"));
        let config_mode = fs::metadata(dir.join(CONFIG_FILE_NAME))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(config_mode, 0o600);

        let launcher_mode = fs::metadata(dir.join(LAUNCHER_FILE_NAME))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(launcher_mode, 0o700);

        // PATH gets the session dir prepended; no key, so no identity var.
        let path_entry = artifacts.env.iter().find(|(k, _)| k == "PATH").unwrap();
        assert!(path_entry.1.starts_with(&dir.display().to_string()));
        assert!(!artifacts.env.iter().any(|(k, _)| k == IDENTITY_ENV_VAR));

        artifacts.remove();
        assert!(!dir.exists());
    }

    #[test]
    fn key_material_written_with_single_newline() {
        let base = tempfile::tempdir().unwrap();
        let artifacts = SessionArtifacts::prepare(
            base.path(),
            "s3",
            &[],
            Some("-----BEGIN KEY-----\nabc\n-----END KEY-----\n\n\n"),
        )
        .unwrap();
        let key_path = artifacts.key_path.clone().unwrap();

        let written = fs::read_to_string(&key_path).unwrap();
        assert!(written.ends_with("-----END KEY-----\n"));
        assert!(!written.ends_with("\n\n"));

        let mode = fs::metadata(&key_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        let identity = artifacts
            .env
            .iter()
            .find(|(k, _)| k == IDENTITY_ENV_VAR)
            .unwrap();
        assert_eq!(identity.1, key_path.display().to_string());
    }

    #[test]
    fn key_without_trailing_newline_gains_one() {
        let base = tempfile::tempdir().unwrap();
        let artifacts =
            SessionArtifacts::prepare(base.path(), "s4", &[], Some("raw-key-data")).unwrap();
        let written = fs::read_to_string(artifacts.key_path.clone().unwrap()).unwrap();
        assert_eq!(written, "raw-key-data\n");
    }

    #[test]
    fn remove_is_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let artifacts =
            SessionArtifacts::prepare(base.path(), "s5", &[record("prod")], None).unwrap();
        artifacts.remove();
        artifacts.remove();
        assert!(!artifacts.dir.as_ref().unwrap().exists());
    }
}
