//! Rendering of the per-session alias configuration and launcher script.
//!
//! Generation is append-only and line-structured: every field is passed
//! through the validators before it is written, and a record that fails
//! validation is skipped whole. There is no escaping step: values that
//! could break the line-oriented config format never pass validation.

use crate::record::HostRecord;
use crate::validate::{validate_host_identifier, validate_port, validate_username};
use std::fmt::Write as _;
use std::path::Path;

/// File name of the generated alias configuration inside the session dir.
pub const CONFIG_FILE_NAME: &str = "ssh_config";

/// File name of the written private key inside the session dir.
pub const IDENTITY_FILE_NAME: &str = "identity";

/// File name of the launcher script inside the session dir. Named after
/// the real client so a `PATH` prefix intercepts invocations.
pub const LAUNCHER_FILE_NAME: &str = "ssh";

/// Port omitted from the rendered config because the client defaults to it.
const DEFAULT_PORT: i64 = 22;

/// Render the alias configuration for a list of host records.
///
/// Records with an empty name are skipped silently (an alias needs a
/// name); records with any field failing validation are skipped whole, so
/// a malformed record can neither abort generation for the others nor
/// inject extra directives. Never fails.
pub fn render_config(records: &[HostRecord]) -> String {
    let mut out = String::new();
    for record in records {
        if record.name.is_empty() {
            continue;
        }
        if !record_is_valid(record) {
            continue;
        }
        let address = if record.address.is_empty() {
            &record.name
        } else {
            &record.address
        };
        writeln!(out, "Host {}", record.name).ok();
        writeln!(out, "    HostName {address}").ok();
        if let Some(port) = record.port {
            if port != DEFAULT_PORT {
                writeln!(out, "    Port {port}").ok();
            }
        }
        if !record.user.is_empty() {
            writeln!(out, "    User {}", record.user).ok();
        }
        writeln!(out, "    StrictHostKeyChecking accept-new").ok();
        out.push('\n');
    }
    out
}

fn record_is_valid(record: &HostRecord) -> bool {
    if validate_host_identifier(&record.name).is_err() {
        return false;
    }
    if !record.address.is_empty() && validate_host_identifier(&record.address).is_err() {
        return false;
    }
    if !record.user.is_empty() && validate_username(&record.user).is_err() {
        return false;
    }
    if let Some(port) = record.port {
        if validate_port(port).is_err() {
            return false;
        }
    }
    true
}

/// Render the launcher script that forces the real client onto the
/// generated configuration (and key, when present), forwarding all caller
/// arguments unmodified.
///
/// `client` is the absolute path of the real secure-shell binary; the
/// script must not resolve `ssh` through `PATH` because the session dir
/// shadows that name. All embedded paths are generated by this core, not
/// user input.
pub fn render_launcher(client: &str, session_dir: &Path, key_path: Option<&Path>) -> String {
    let config_path = session_dir.join(CONFIG_FILE_NAME);
    let mut script = String::from("#!/bin/sh\n");
    write!(script, "exec '{}' -F '{}'", client, config_path.display()).ok();
    if let Some(key) = key_path {
        write!(script, " -i '{}'", key.display()).ok();
    }
    script.push_str(" -o StrictHostKeyChecking=accept-new \"$@\"\n");
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, address: &str, port: Option<i64>, user: &str) -> HostRecord {
        HostRecord {
            name: name.into(),
            address: address.into(),
            port,
            user: user.into(),
        }
    }

    #[test]
    fn full_record_renders_all_lines() {
        let out = render_config(&[record("prod", "10.0.0.1", Some(2222), "deploy")]);
        assert_eq!(
            out,
            "Host prod\n    HostName 10.0.0.1\n    Port 2222\n    User deploy\n    StrictHostKeyChecking accept-new\n\n"
        );
    }

    #[test]
    fn default_port_omitted() {
        let out = render_config(&[record("prod", "10.0.0.1", Some(22), "deploy")]);
        assert!(!out.contains("Port"));
    }

    #[test]
    fn address_falls_back_to_alias() {
        let out = render_config(&[record("bastion.internal", "", None, "")]);
        assert!(out.contains("Host bastion.internal\n"));
        assert!(out.contains("    HostName bastion.internal\n"));
        assert!(!out.contains("User"));
    }

    #[test]
    fn invalid_record_skipped_whole() {
        let out = render_config(&[
            record("prod", "10.0.0.1", Some(22), "deploy"),
            record("bad host", "10.0.0.2", None, "deploy"),
        ]);
        assert_eq!(out.matches("Host ").count(), 1);
        assert!(out.contains("Host prod\n"));
        assert!(!out.contains("10.0.0.2"));
    }

    #[test]
    fn empty_name_skipped_silently() {
        let out = render_config(&[record("", "10.0.0.1", None, "deploy")]);
        assert!(out.is_empty());
    }

    #[test]
    fn newline_in_alias_cannot_inject_directives() {
        let out = render_config(&[record("x\nHost evil", "", None, "")]);
        assert!(out.is_empty());
    }

    #[test]
    fn invalid_username_skips_record() {
        let out = render_config(&[record("prod", "10.0.0.1", None, "user\nProxyCommand evil")]);
        assert!(out.is_empty());
    }

    #[test]
    fn out_of_range_port_skips_record() {
        let out = render_config(&[record("prod", "10.0.0.1", Some(65536), "deploy")]);
        assert!(out.is_empty());
    }

    #[test]
    fn launcher_without_key() {
        let script = render_launcher("/usr/bin/ssh", Path::new("/tmp/gangway-abc"), None);
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("exec '/usr/bin/ssh' -F '/tmp/gangway-abc/ssh_config'"));
        assert!(!script.contains(" -i "));
        assert!(script.ends_with("\"$@\"\n"));
    }

    #[test]
    fn launcher_with_key() {
        let dir = Path::new("/tmp/gangway-abc");
        let key = dir.join(IDENTITY_FILE_NAME);
        let script = render_launcher("/usr/bin/ssh", dir, Some(&key));
        assert!(script.contains(" -i '/tmp/gangway-abc/identity'"));
        assert!(script.contains("-o StrictHostKeyChecking=accept-new"));
    }
}
