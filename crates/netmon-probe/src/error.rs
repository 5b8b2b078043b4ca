//! Error types for probe execution.

use std::io;

use thiserror::Error;

/// Result of one probe invocation against one target.
pub type ProbeOutcome<T> = Result<T, ProbeError>;

/// Why a probe could not classify its target as reachable.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("not an IP address: {0:?}")]
    InvalidAddress(String),

    #[error("raw socket needs elevated privilege: {0}")]
    PermissionDenied(#[source] io::Error),

    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    #[error("could not build packet: {0}")]
    Packet(&'static str),

    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("probe task failed: {0}")]
    Task(String),
}

impl ProbeError {
    /// Classify a socket-level I/O error.
    pub fn socket(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            ProbeError::PermissionDenied(err)
        } else {
            ProbeError::Socket(err)
        }
    }
}
