//! Connection settings for the Kubernetes API.

use std::path::Path;
use std::time::Duration;

use crate::error::{DiscoveryError, DiscoveryResult};

/// Where a pod's service-account credentials are mounted.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved connection settings for one discovery call.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// API server root, e.g. `https://10.96.0.1:443`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// PEM bundle used to verify the API server.
    pub ca_pem: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl ClusterConfig {
    /// Settings for an arbitrary API root, with no credentials.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            ca_pem: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the in-cluster settings from the process environment and the
    /// mounted service account.
    pub fn in_cluster() -> DiscoveryResult<Self> {
        Self::from_parts(
            std::env::var("KUBERNETES_SERVICE_HOST").ok(),
            std::env::var("KUBERNETES_SERVICE_PORT").ok(),
            Path::new(SERVICE_ACCOUNT_DIR),
        )
    }

    /// In-cluster resolution with the inputs spelled out.
    pub fn from_parts(
        host: Option<String>,
        port: Option<String>,
        service_account_dir: &Path,
    ) -> DiscoveryResult<Self> {
        let (host, port) = match (host, port) {
            (Some(h), Some(p)) if !h.is_empty() && !p.is_empty() => (h, p),
            _ => {
                return Err(DiscoveryError::Config(
                    "KUBERNETES_SERVICE_HOST and KUBERNETES_SERVICE_PORT must be set".to_string(),
                ));
            }
        };

        let token_path = service_account_dir.join("token");
        let token = std::fs::read_to_string(&token_path).map_err(|e| {
            DiscoveryError::Config(format!("reading {}: {e}", token_path.display()))
        })?;

        let ca_path = service_account_dir.join("ca.crt");
        let ca_pem = std::fs::read(&ca_path)
            .map_err(|e| DiscoveryError::Config(format!("reading {}: {e}", ca_path.display())))?;

        // IPv6 service hosts need brackets in a URL.
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };

        Ok(Self {
            base_url: format!("https://{host}:{port}"),
            token: Some(token.trim().to_string()),
            ca_pem: Some(ca_pem),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Build an HTTP client that trusts the configured CA.
    pub fn client(&self) -> DiscoveryResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let Some(pem) = &self.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem).map_err(DiscoveryError::Client)?;
            builder = builder.add_root_certificate(cert);
        }
        builder.build().map_err(DiscoveryError::Client)
    }
}
