//! HTTP endpoint reachability probe.
//!
//! Issues a single GET and counts *any* response as reachable, whatever the
//! status code. Only transport-level failures (DNS, refused connection,
//! TLS handshake, timeout) classify the endpoint as unreachable.
//!
//! Certificate verification is disabled on the prober's own client: the
//! probe answers "can this node open a connection", not "is the peer
//! trustworthy".

use std::time::Duration;

use tracing::debug;

use crate::error::{ProbeError, ProbeOutcome};

/// Probes one fixed URL with a dedicated client.
#[derive(Debug, Clone)]
pub struct EndpointProber {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl EndpointProber {
    /// Build a prober with its own client.
    ///
    /// `timeout` bounds the whole request, connect included.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> ProbeOutcome<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .user_agent(concat!("netmon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ProbeError::Client)?;

        Ok(Self::with_client(name, url, client))
    }

    /// Build a prober around an existing client.
    pub fn with_client(
        name: impl Into<String>,
        url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one GET. Returns the status code of whatever response came back.
    pub async fn probe(&self) -> ProbeOutcome<u16> {
        match self.client.get(&self.url).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                debug!(probe = %self.name, url = %self.url, status, "endpoint responded");
                Ok(status)
            }
            Err(e) => {
                debug!(probe = %self.name, url = %self.url, error = %e, "endpoint request failed");
                Err(ProbeError::Http(e))
            }
        }
    }
}
