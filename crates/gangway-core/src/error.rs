use thiserror::Error;

/// Errors produced by the gangway tunnel core.
#[derive(Debug, Error)]
pub enum GangwayError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid port: {0}")]
    InvalidPort(i64),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("spawn error: {0}")]
    Spawn(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type GangwayResult<T> = Result<T, GangwayError>;
