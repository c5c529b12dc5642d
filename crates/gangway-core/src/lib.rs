//! gangway-core: Shared library for the gangway terminal tunnel.
//!
//! Provides the error taxonomy, input validators, the inbound control
//! message model, host records, and rendering of the per-session alias
//! configuration and launcher script. Everything here is pure: no
//! filesystem access, no sockets, no process state.

pub mod alias;
pub mod control;
pub mod error;
pub mod record;
pub mod validate;

// Re-export commonly used items at crate root.
pub use control::{parse_control, ControlMessage};
pub use error::{GangwayError, GangwayResult};
pub use record::HostRecord;
pub use validate::{
    validate_geometry, validate_host_identifier, validate_port, validate_username, MAX_DIMENSION,
};
