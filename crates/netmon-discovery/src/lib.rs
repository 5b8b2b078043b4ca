//! netmon-discovery: finds the addresses to probe each cycle.
//!
//! ```text
//! TargetSource (trait)
//!   └── KubeDiscovery
//!         ├── ClusterConfig   (service-account token + CA, or explicit)
//!         ├── GET /api/v1/namespaces/{ns}/pods   (paged)
//!         └── pod_addresses() → Vec<String>, pods without an IP skipped
//! ```
//!
//! Discovery never fails its caller. Errors are logged and the addresses
//! gathered so far (possibly none) are returned, so a control-plane outage
//! empties one cycle's probe set instead of stopping the daemon.

pub mod config;
pub mod error;
pub mod kube;

use std::future::Future;

pub use config::ClusterConfig;
pub use error::{DiscoveryError, DiscoveryResult};
pub use kube::{KubeDiscovery, PodList, pod_addresses};

/// Source of probe targets for one cycle.
pub trait TargetSource: Send + Sync + 'static {
    /// Addresses of the workloads currently running in `namespace`.
    ///
    /// Never contains an empty string.
    fn list_targets(&self, namespace: &str) -> impl Future<Output = Vec<String>> + Send;
}
