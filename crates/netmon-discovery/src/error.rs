//! Error types for target discovery.

use thiserror::Error;

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cluster config unavailable: {0}")]
    Config(String),

    #[error("could not build cluster client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("pod list request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("pod list returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode pod list: {0}")]
    Decode(#[from] serde_json::Error),
}
