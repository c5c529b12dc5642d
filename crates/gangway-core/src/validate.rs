//! Pure validators for terminal geometry and alias-configuration fields.
//!
//! The identifier character sets are deliberately restrictive: they exclude
//! whitespace, newlines, and shell/config metacharacters, so a value that
//! passes validation can be written verbatim into a line-oriented
//! configuration file or a shell command line without escaping.

use crate::error::{GangwayError, GangwayResult};

/// Upper bound for terminal rows and columns.
pub const MAX_DIMENSION: u64 = 500;

/// Maximum length of a host alias or hostname (RFC 1035 name limit).
pub const MAX_IDENTIFIER_LEN: usize = 253;

/// Maximum length of a POSIX account name.
pub const MAX_USERNAME_LEN: usize = 32;

/// Check terminal geometry. Rejects zero and anything above [`MAX_DIMENSION`].
pub fn validate_geometry(rows: u64, cols: u64) -> GangwayResult<()> {
    if rows == 0 || cols == 0 {
        return Err(GangwayError::InvalidGeometry(format!(
            "{rows}x{cols}: dimensions must be non-zero"
        )));
    }
    if rows > MAX_DIMENSION || cols > MAX_DIMENSION {
        return Err(GangwayError::InvalidGeometry(format!(
            "{rows}x{cols}: dimensions must be at most {MAX_DIMENSION}"
        )));
    }
    Ok(())
}

/// Check a host alias or hostname: at most 253 characters, only
/// `[A-Za-z0-9._-]`.
pub fn validate_host_identifier(value: &str) -> GangwayResult<()> {
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(GangwayError::InvalidIdentifier(format!(
            "identifier exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(GangwayError::InvalidIdentifier(
            "identifier contains characters outside [A-Za-z0-9._-]".into(),
        ));
    }
    Ok(())
}

/// Check a username against the POSIX account-name grammar
/// `^[a-z_][a-z0-9_-]*$`, at most 32 characters.
pub fn validate_username(value: &str) -> GangwayResult<()> {
    if value.len() > MAX_USERNAME_LEN {
        return Err(GangwayError::InvalidIdentifier(format!(
            "username exceeds {MAX_USERNAME_LEN} characters"
        )));
    }
    let mut chars = value.chars();
    let valid_first = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    if !valid_first {
        return Err(GangwayError::InvalidIdentifier(
            "username must start with [a-z_]".into(),
        ));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(GangwayError::InvalidIdentifier(
            "username contains characters outside [a-z0-9_-]".into(),
        ));
    }
    Ok(())
}

/// Check a port number is within `[0, 65535]`.
pub fn validate_port(port: i64) -> GangwayResult<()> {
    if !(0..=65535).contains(&port) {
        return Err(GangwayError::InvalidPort(port));
    }
    Ok(())
}
