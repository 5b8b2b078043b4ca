//! netmond: the netmon daemon.
//!
//! Wires the probe crates into a single process:
//! - Metric registry, shared with the scrape endpoint
//! - Pod discovery against the Kubernetes API
//! - ICMP and HTTP endpoint probers
//! - The probe orchestrator (discover, fan out, join, sleep)
//! - The `/metrics` HTTP listener

pub mod config;
pub mod orchestrator;
pub mod schema;

pub use config::{Cli, Config, ConfigError};
pub use orchestrator::{CycleReport, CycleSettings, Orchestrator, Probes};
