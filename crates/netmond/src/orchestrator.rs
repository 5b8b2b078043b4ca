//! Probe orchestration: the daemon's main loop.
//!
//! Each cycle walks `Discovering → Dispatching → Joining → Sleeping`:
//!
//! 1. ask the [`TargetSource`] for this cycle's addresses,
//! 2. spawn one ping task per address plus one task per endpoint probe,
//! 3. wait for every task to finish,
//! 4. sleep the configured interval.
//!
//! Cycles never overlap. There is no cycle deadline: a probe that hangs
//! past its own timeout holds the whole cycle until it returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use netmon_discovery::TargetSource;
use netmon_metrics::{Labels, MetricRegistry, MetricResult};
use netmon_probe::icmp::parse_target;
use netmon_probe::{EchoProber, EndpointProber};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::schema::*;

/// Fixed per-deployment settings of the loop.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub namespace: String,
    /// Identity label for endpoint results.
    pub node_name: String,
    pub interval: Duration,
}

/// The probers a cycle fans out to.
pub struct Probes<E> {
    pub echo: E,
    /// Control-plane endpoint check.
    pub api: EndpointProber,
    /// Externally configured endpoint check.
    pub external: EndpointProber,
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub targets: usize,
    pub ping_ok: usize,
    pub ping_failed: usize,
    /// `None` if the task did not report (panicked).
    pub api_reachable: Option<bool>,
    pub external_reachable: Option<bool>,
    /// Tasks that panicked instead of reporting.
    pub lost_tasks: usize,
    pub duration: Duration,
}

enum EndpointKind {
    Api,
    External,
}

enum TaskReport {
    Ping { reachable: bool },
    Endpoint { kind: EndpointKind, reachable: bool },
}

pub struct Orchestrator<D, E> {
    settings: CycleSettings,
    discovery: D,
    echo: Arc<E>,
    api: Arc<EndpointProber>,
    external: Arc<EndpointProber>,
    registry: MetricRegistry,
}

impl<D, E> Orchestrator<D, E>
where
    D: TargetSource,
    E: EchoProber,
{
    pub fn new(
        settings: CycleSettings,
        discovery: D,
        probes: Probes<E>,
        registry: MetricRegistry,
    ) -> Self {
        Self {
            settings,
            discovery,
            echo: Arc::new(probes.echo),
            api: Arc::new(probes.api),
            external: Arc::new(probes.external),
            registry,
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Run cycles forever.
    pub async fn run(&self) {
        info!(
            namespace = %self.settings.namespace,
            node = %self.settings.node_name,
            interval_secs = self.settings.interval.as_secs(),
            "probe loop started"
        );

        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.settings.interval).await;
        }
    }

    /// Run one discover/dispatch/join round and return its summary.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let node = Labels::new().with(LABEL_NODE, &self.settings.node_name);

        // ── Discovering ────────────────────────────────────────────
        let targets = self.discovery.list_targets(&self.settings.namespace).await;
        log_write(
            TARGETS_DISCOVERED,
            self.registry
                .set(TARGETS_DISCOVERED, &node, targets.len() as f64)
                .await,
        );

        let mut report = CycleReport {
            targets: targets.len(),
            ..CycleReport::default()
        };

        // ── Dispatching ────────────────────────────────────────────
        let mut tasks = JoinSet::new();
        for address in targets {
            tasks.spawn(ping_task(
                self.echo.clone(),
                self.registry.clone(),
                address,
            ));
        }
        tasks.spawn(endpoint_task(
            self.api.clone(),
            self.registry.clone(),
            EndpointKind::Api,
            node.clone(),
        ));
        tasks.spawn(endpoint_task(
            self.external.clone(),
            self.registry.clone(),
            EndpointKind::External,
            node.clone(),
        ));
        debug!(tasks = tasks.len(), "probe tasks dispatched");

        // ── Joining ────────────────────────────────────────────────
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskReport::Ping { reachable: true }) => report.ping_ok += 1,
                Ok(TaskReport::Ping { reachable: false }) => report.ping_failed += 1,
                Ok(TaskReport::Endpoint {
                    kind: EndpointKind::Api,
                    reachable,
                }) => report.api_reachable = Some(reachable),
                Ok(TaskReport::Endpoint {
                    kind: EndpointKind::External,
                    reachable,
                }) => report.external_reachable = Some(reachable),
                Err(e) => {
                    error!(error = %e, "probe task did not complete");
                    report.lost_tasks += 1;
                }
            }
        }

        report.duration = started.elapsed();
        log_write(
            CYCLE_DURATION_SECONDS,
            self.registry
                .set(CYCLE_DURATION_SECONDS, &node, report.duration.as_secs_f64())
                .await,
        );

        info!(
            targets = report.targets,
            ping_ok = report.ping_ok,
            ping_failed = report.ping_failed,
            api = ?report.api_reachable,
            external = ?report.external_reachable,
            duration_ms = report.duration.as_millis() as u64,
            "probe cycle complete"
        );
        report
    }
}

/// Ping one address and record the result under its `ip` label.
async fn ping_task<E: EchoProber>(
    echo: Arc<E>,
    registry: MetricRegistry,
    address: String,
) -> TaskReport {
    let labels = Labels::new().with(LABEL_IP, &address);

    let outcome = match parse_target(&address) {
        Ok(ip) => echo.probe(ip).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(stats) => {
            let loss = stats.packet_loss_percent();
            let rtt = stats.avg_rtt().as_secs_f64();
            info!(
                ip = %address,
                sent = stats.sent,
                received = stats.received,
                loss_percent = loss,
                avg_rtt_ms = rtt * 1000.0,
                "successfully pinged IP"
            );

            log_write(PING_STATUS, registry.set(PING_STATUS, &labels, 1.0).await);
            log_write(
                PING_AVG_RTT_SECONDS,
                registry.set(PING_AVG_RTT_SECONDS, &labels, rtt).await,
            );
            log_write(
                PING_PACKET_LOSS_PERCENT,
                registry.set(PING_PACKET_LOSS_PERCENT, &labels, loss).await,
            );
            log_write(
                PING_COUNT_TOTAL,
                registry
                    .add(PING_COUNT_TOTAL, &labels, f64::from(echo.count()))
                    .await,
            );
            TaskReport::Ping { reachable: true }
        }
        Err(e) => {
            warn!(ip = %address, error = %e, "failed to ping IP");
            log_write(PING_STATUS, registry.set(PING_STATUS, &labels, 0.0).await);
            TaskReport::Ping { reachable: false }
        }
    }
}

/// Probe one endpoint and record the result under the `node` label.
async fn endpoint_task(
    prober: Arc<EndpointProber>,
    registry: MetricRegistry,
    kind: EndpointKind,
    node: Labels,
) -> TaskReport {
    let metric = match kind {
        EndpointKind::Api => K8S_API_STATUS,
        EndpointKind::External => EXTERNAL_HTTP_STATUS,
    };

    let reachable = match prober.probe().await {
        Ok(status) => {
            info!(probe = %prober.name(), url = %prober.url(), status, "successfully connected to endpoint");
            true
        }
        Err(e) => {
            warn!(probe = %prober.name(), url = %prober.url(), error = %e, "could not connect to endpoint");
            false
        }
    };

    let value = if reachable { 1.0 } else { 0.0 };
    log_write(metric, registry.set(metric, &node, value).await);
    TaskReport::Endpoint { kind, reachable }
}

fn log_write<T>(metric: &str, result: MetricResult<T>) {
    if let Err(e) = result {
        error!(%metric, error = %e, "metric write rejected");
    }
}
