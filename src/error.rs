//! Error taxonomy for popcore
//!
//! Mirrors the source's `-1`/`-2`/`-3` error-code convention as a proper
//! sum type: transport failures, protocol-level `-ERR` replies,
//! integrity (cache/tempfile) failures, TLS trust decisions, user
//! aborts, and stale-refno reads each get their own variant family.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Socket/read/write failure, or the peer closed the connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server replied `-ERR`; the line is preserved for the caller.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Cache or tempfile write failed; the connection itself is still good.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Certificate chain validation failed or the user rejected a cert.
    #[error("TLS trust error: {0}")]
    Trust(String),

    /// The user interrupted a blocking operation or rejected a prompt.
    #[error("aborted by user")]
    Aborted,

    /// A `HeaderRecord` was addressed with `refno = -1` (stale for this connection).
    #[error("index is incorrect; reopen mailbox")]
    Stale,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// -1 / -2 / -3 surfaces from `query`/`fetch_data` in spec terms.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Transport(_) | Self::Io(_) => -1,
            Self::Protocol(_) => -2,
            Self::Integrity(_) => -3,
            Self::Trust(_) | Self::Aborted | Self::Stale | Self::Config(_) => -4,
        }
    }
}
