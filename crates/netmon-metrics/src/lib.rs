//! netmon-metrics: the latest-value metric store for netmon.
//!
//! Probe tasks write gauges and counters keyed by `(name, labels)`; the
//! scrape handler takes a point-in-time snapshot and renders it in the
//! Prometheus text exposition format.
//!
//! # Architecture
//!
//! ```text
//! MetricRegistry (Clone, shared by every probe task)
//!   ├── describe() ← called once per family at startup
//!   ├── set()      ← gauge, last write wins
//!   ├── add()      ← counter, monotonic accumulation
//!   └── snapshot() → Vec<FamilySnapshot>
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```
//!
//! Entries are never evicted: a label set that stops being written keeps
//! its last value until the process exits.

pub mod error;
pub mod labels;
pub mod prometheus;
pub mod registry;

pub use error::{MetricError, MetricResult};
pub use labels::Labels;
pub use prometheus::render_prometheus;
pub use registry::{FamilySnapshot, MetricKind, MetricRegistry};
