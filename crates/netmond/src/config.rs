//! Daemon configuration: command-line flags, each backed by an environment
//! variable, validated into a [`Config`] before anything starts.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use netmon_probe::IcmpConfig;
use thiserror::Error;

/// Well-known in-cluster address of the Kubernetes API.
pub const DEFAULT_API_URL: &str = "https://kubernetes.default.svc";

#[derive(Debug, Clone, Parser)]
#[command(name = "netmond", about = "Cluster network probe daemon", version)]
pub struct Cli {
    /// Identity label attached to endpoint probe results.
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// URL probed by the external reachability check.
    #[arg(long, env = "EXTERNAL_URL")]
    pub external_url: Option<String>,

    /// Namespace whose pods are pinged.
    #[arg(long, env = "NETMON_NAMESPACE", default_value = "netmon")]
    pub namespace: String,

    /// Address the metrics endpoint listens on.
    #[arg(long, env = "NETMON_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Pause between probe cycles, in seconds.
    #[arg(long, env = "NETMON_INTERVAL_SECS", default_value = "60")]
    pub interval_secs: u64,

    /// Echo requests per ping run.
    #[arg(long, env = "NETMON_PING_COUNT", default_value = "5")]
    pub ping_count: u32,

    /// Deadline for one ping run, in milliseconds.
    #[arg(long, env = "NETMON_PING_TIMEOUT_MS", default_value = "1000")]
    pub ping_timeout_ms: u64,

    /// Deadline for one HTTP probe, in seconds.
    #[arg(long, env = "NETMON_HTTP_TIMEOUT_SECS", default_value = "10")]
    pub http_timeout_secs: u64,

    /// Control-plane URL probed by the API reachability check.
    #[arg(long, env = "NETMON_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

/// Fatal startup configuration problems.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("{name} is not a valid http(s) URL: {value:?}")]
    InvalidUrl { name: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Validated daemon settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub node_name: String,
    pub external_url: String,
    pub namespace: String,
    pub listen: SocketAddr,
    pub interval: Duration,
    pub icmp: IcmpConfig,
    pub http_timeout: Duration,
    pub api_url: String,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let node_name = required(cli.node_name, "NODE_NAME")?;
        let external_url = required(cli.external_url, "EXTERNAL_URL")?;
        check_url("EXTERNAL_URL", &external_url)?;
        check_url("NETMON_API_URL", &cli.api_url)?;

        let namespace = cli.namespace.trim();
        if !is_dns_label(namespace) {
            return Err(ConfigError::Invalid(format!(
                "namespace {namespace:?} is not a valid DNS label"
            )));
        }
        if cli.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval must be at least 1s".to_string()));
        }
        if cli.ping_count == 0 {
            return Err(ConfigError::Invalid("ping count must be at least 1".to_string()));
        }
        if cli.ping_count > u32::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "ping count must be at most {}",
                u16::MAX
            )));
        }
        if cli.ping_timeout_ms == 0 || cli.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }

        Ok(Self {
            node_name,
            external_url,
            namespace: namespace.to_string(),
            listen: cli.listen,
            interval: Duration::from_secs(cli.interval_secs),
            icmp: IcmpConfig {
                count: cli.ping_count,
                timeout: Duration::from_millis(cli.ping_timeout_ms),
            },
            http_timeout: Duration::from_secs(cli.http_timeout_secs),
            api_url: cli.api_url,
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// RFC 1123 label: 1-63 lowercase alphanumerics or `-`, alphanumeric at
/// both ends. Kubernetes namespace names follow the same rule.
fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    let edge_ok = |b: Option<&u8>| b.is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    (1..=63).contains(&bytes.len())
        && edge_ok(bytes.first())
        && edge_ok(bytes.last())
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    match reqwest::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
        }),
    }
}
