use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Mirrors the error taxonomy in the design: protocol errors are
/// reported back to the client inline, I/O errors close the affected
/// connection or are retried (AOF), and `Config`/`Internal` cover
/// startup and command-dispatch failures respectively.
#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad config: {0}")]
    Config(String),

    #[error("ERR {0}")]
    User(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn user(msg: impl Into<String>) -> Self {
        Self::User(msg.into())
    }
}
