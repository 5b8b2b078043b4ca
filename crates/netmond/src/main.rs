//! netmond: cluster network probe daemon.
//!
//! # Usage
//!
//! ```text
//! NODE_NAME=node-a EXTERNAL_URL=https://example.com netmond
//! ```
//!
//! Every interval the daemon pings each pod in the watched namespace,
//! checks the Kubernetes API and the external URL, and publishes the
//! results at `GET /metrics`.

use anyhow::Context;
use clap::Parser;
use netmon_discovery::KubeDiscovery;
use netmon_metrics::MetricRegistry;
use netmon_probe::{EndpointProber, IcmpProber};
use tracing::info;

use netmond::{Cli, Config, CycleSettings, Orchestrator, Probes, schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,netmond=debug,netmon=debug")),
        )
        .init();

    let config = Config::from_cli(Cli::parse()).context("invalid configuration")?;
    info!(
        node = %config.node_name,
        namespace = %config.namespace,
        external_url = %config.external_url,
        "netmond starting"
    );

    // ── Initialize subsystems ──────────────────────────────────

    let registry = MetricRegistry::new();
    schema::describe_all(&registry).await?;

    let probes = Probes {
        echo: IcmpProber::new(config.icmp.clone()),
        api: EndpointProber::new("k8s-api", &config.api_url, config.http_timeout)?,
        external: EndpointProber::new("external", &config.external_url, config.http_timeout)?,
    };

    let orchestrator = Orchestrator::new(
        CycleSettings {
            namespace: config.namespace.clone(),
            node_name: config.node_name.clone(),
            interval: config.interval,
        },
        KubeDiscovery::in_cluster().timeout(config.http_timeout),
        probes,
        registry.clone(),
    );

    // ── Start metrics server ───────────────────────────────────

    let server = tokio::spawn(netmon_api::serve(config.listen, registry));

    tokio::select! {
        served = server => {
            served
                .context("metrics server task failed")?
                .context("metrics server failed")?;
            anyhow::bail!("metrics server stopped unexpectedly")
        }
        () = orchestrator.run() => Ok(()),
    }
}
