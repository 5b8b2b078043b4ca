//! Metric families published by the daemon.
//!
//! Ping results are keyed by the pinged address (`ip`); endpoint results
//! and cycle bookkeeping are keyed by this instance's identity (`node`).

use netmon_metrics::{MetricKind, MetricRegistry, MetricResult};

pub const PING_STATUS: &str = "ping_status";
pub const PING_AVG_RTT_SECONDS: &str = "ping_avg_rtt_seconds";
pub const PING_PACKET_LOSS_PERCENT: &str = "ping_packet_loss_percent";
pub const PING_COUNT_TOTAL: &str = "ping_count_total";
pub const K8S_API_STATUS: &str = "k8s_api_status";
pub const EXTERNAL_HTTP_STATUS: &str = "external_http_status";
pub const TARGETS_DISCOVERED: &str = "netmon_targets_discovered";
pub const CYCLE_DURATION_SECONDS: &str = "netmon_cycle_duration_seconds";

pub const LABEL_IP: &str = "ip";
pub const LABEL_NODE: &str = "node";

const FAMILIES: &[(&str, &str, MetricKind)] = &[
    (
        PING_STATUS,
        "Ping test status (1 = success, 0 = failure).",
        MetricKind::Gauge,
    ),
    (
        PING_AVG_RTT_SECONDS,
        "Average echo round-trip time of the last successful run.",
        MetricKind::Gauge,
    ),
    (
        PING_PACKET_LOSS_PERCENT,
        "Echo requests without a reply in the last successful run (0-100).",
        MetricKind::Gauge,
    ),
    (
        PING_COUNT_TOTAL,
        "Echo requests sent by successful runs.",
        MetricKind::Counter,
    ),
    (
        K8S_API_STATUS,
        "Kubernetes API test status (1 = success, 0 = failure).",
        MetricKind::Gauge,
    ),
    (
        EXTERNAL_HTTP_STATUS,
        "External HTTP test status (1 = success, 0 = failure).",
        MetricKind::Gauge,
    ),
    (
        TARGETS_DISCOVERED,
        "Pod addresses discovered in the last cycle.",
        MetricKind::Gauge,
    ),
    (
        CYCLE_DURATION_SECONDS,
        "Wall-clock time of the last probe cycle, sleep excluded.",
        MetricKind::Gauge,
    ),
];

/// Declare every family so the scrape output lists them from the start.
pub async fn describe_all(registry: &MetricRegistry) -> MetricResult<()> {
    for (name, help, kind) in FAMILIES {
        registry.describe(name, help, *kind).await?;
    }
    Ok(())
}
