//! Metric registry: the store shared by probe tasks and the scrape handler.
//!
//! A single `RwLock` guards every family. Writers hold the write lock for
//! exactly one entry update, so a reader always sees each `(name, labels)`
//! pair either before or after a write, never halfway.
//!
//! Each family's series live behind an `Arc`. `snapshot()` only bumps one
//! refcount per family under the read lock and copies the series after
//! releasing it; a writer that lands while a snapshot still holds a family
//! clones that family's map once (`Arc::make_mut`) instead of waiting.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{MetricError, MetricResult};
use crate::labels::Labels;

/// How new samples combine with the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Overwritten on every update.
    Gauge,
    /// Accumulates; never decreases.
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Family {
    help: String,
    kind: MetricKind,
    series: Arc<BTreeMap<Labels, f64>>,
}

impl Family {
    fn new(kind: MetricKind) -> Self {
        Self {
            help: String::new(),
            kind,
            series: Arc::default(),
        }
    }
}

/// Point-in-time copy of one metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilySnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    /// Series sorted by label set.
    pub series: Vec<(Labels, f64)>,
}

/// Concurrency-safe `(name, labels) → value` store.
///
/// Cheap to clone; every clone shares the same underlying map.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    families: Arc<RwLock<BTreeMap<String, Family>>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a family with its help text so it is exposed before the
    /// first sample arrives. Re-declaring with the same kind updates the help.
    pub async fn describe(&self, name: &str, help: &str, kind: MetricKind) -> MetricResult<()> {
        validate_metric_name(name)?;
        let mut families = self.families.write().await;
        let family = families
            .entry(name.to_string())
            .or_insert_with(|| Family::new(kind));
        check_kind(name, family.kind, kind)?;
        family.help = help.to_string();
        Ok(())
    }

    /// Overwrite a gauge value.
    pub async fn set(&self, name: &str, labels: &Labels, value: f64) -> MetricResult<()> {
        validate_metric_name(name)?;
        validate_labels(labels)?;

        let mut families = self.families.write().await;
        let family = families
            .entry(name.to_string())
            .or_insert_with(|| Family::new(MetricKind::Gauge));
        check_kind(name, family.kind, MetricKind::Gauge)?;
        Arc::make_mut(&mut family.series).insert(labels.clone(), value);

        debug!(metric = %name, %labels, value, "gauge set");
        Ok(())
    }

    /// Add `delta` to a counter and return the new total.
    pub async fn add(&self, name: &str, labels: &Labels, delta: f64) -> MetricResult<f64> {
        validate_metric_name(name)?;
        validate_labels(labels)?;
        if !delta.is_finite() || delta < 0.0 {
            return Err(MetricError::InvalidIncrement {
                name: name.to_string(),
                delta,
            });
        }

        let mut families = self.families.write().await;
        let family = families
            .entry(name.to_string())
            .or_insert_with(|| Family::new(MetricKind::Counter));
        check_kind(name, family.kind, MetricKind::Counter)?;
        let total = Arc::make_mut(&mut family.series)
            .entry(labels.clone())
            .or_insert(0.0);
        *total += delta;

        debug!(metric = %name, %labels, delta, total = *total, "counter incremented");
        Ok(*total)
    }

    /// Read a single value.
    pub async fn get(&self, name: &str, labels: &Labels) -> Option<f64> {
        let families = self.families.read().await;
        families.get(name)?.series.get(labels).copied()
    }

    /// Number of label sets recorded under a family.
    pub async fn series_count(&self, name: &str) -> usize {
        let families = self.families.read().await;
        families.get(name).map(|f| f.series.len()).unwrap_or(0)
    }

    /// Consistent copy of every family, sorted by name.
    pub async fn snapshot(&self) -> Vec<FamilySnapshot> {
        let held: Vec<_> = {
            let families = self.families.read().await;
            families
                .iter()
                .map(|(name, family)| {
                    (
                        name.clone(),
                        family.help.clone(),
                        family.kind,
                        Arc::clone(&family.series),
                    )
                })
                .collect()
        };

        held.into_iter()
            .map(|(name, help, kind, series)| FamilySnapshot {
                name,
                help,
                kind,
                series: series
                    .iter()
                    .map(|(labels, value)| (labels.clone(), *value))
                    .collect(),
            })
            .collect()
    }
}

fn check_kind(name: &str, existing: MetricKind, requested: MetricKind) -> MetricResult<()> {
    if existing != requested {
        return Err(MetricError::KindMismatch {
            name: name.to_string(),
            existing,
            requested,
        });
    }
    Ok(())
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn validate_metric_name(name: &str) -> MetricResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MetricError::InvalidName(name.to_string()))
    }
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`, and not the reserved `__` prefix.
fn validate_labels(labels: &Labels) -> MetricResult<()> {
    for (key, _) in labels.iter() {
        let mut chars = key.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if !valid || key.starts_with("__") {
            return Err(MetricError::InvalidLabel(key.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(addr: &str) -> Labels {
        Labels::new().with("ip", addr)
    }

    #[tokio::test]
    async fn gauge_last_write_wins() {
        let registry = MetricRegistry::new();
        registry.set("ping_status", &ip("10.0.0.5"), 1.0).await.unwrap();
        registry.set("ping_status", &ip("10.0.0.5"), 0.0).await.unwrap();

        assert_eq!(registry.get("ping_status", &ip("10.0.0.5")).await, Some(0.0));
        assert_eq!(registry.series_count("ping_status").await, 1);
    }

    #[tokio::test]
    async fn counter_accumulates() {
        let registry = MetricRegistry::new();
        assert_eq!(registry.add("ping_count_total", &ip("10.0.0.5"), 5.0).await.unwrap(), 5.0);
        assert_eq!(registry.add("ping_count_total", &ip("10.0.0.5"), 5.0).await.unwrap(), 10.0);
        assert_eq!(registry.add("ping_count_total", &ip("10.0.0.9"), 5.0).await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn counter_rejects_negative_and_nan() {
        let registry = MetricRegistry::new();
        let err = registry.add("c_total", &Labels::new(), -1.0).await.unwrap_err();
        assert!(matches!(err, MetricError::InvalidIncrement { .. }));
        assert!(registry.add("c_total", &Labels::new(), f64::NAN).await.is_err());
        assert_eq!(registry.get("c_total", &Labels::new()).await, None);
    }

    #[tokio::test]
    async fn kind_mismatch_is_rejected() {
        let registry = MetricRegistry::new();
        registry
            .describe("ping_count_total", "Echo requests sent.", MetricKind::Counter)
            .await
            .unwrap();

        let err = registry
            .set("ping_count_total", &ip("10.0.0.5"), 3.0)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MetricError::KindMismatch {
                name: "ping_count_total".to_string(),
                existing: MetricKind::Counter,
                requested: MetricKind::Gauge,
            }
        );
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let registry = MetricRegistry::new();
        assert!(matches!(
            registry.set("1bad", &Labels::new(), 1.0).await,
            Err(MetricError::InvalidName(_))
        ));
        assert!(matches!(
            registry.set("ok", &Labels::new().with("bad-key", "x"), 1.0).await,
            Err(MetricError::InvalidLabel(_))
        ));
        assert!(matches!(
            registry.set("ok", &Labels::new().with("__name__", "x"), 1.0).await,
            Err(MetricError::InvalidLabel(_))
        ));
    }

    #[tokio::test]
    async fn describe_exposes_empty_family() {
        let registry = MetricRegistry::new();
        registry
            .describe("k8s_api_status", "Kubernetes API reachability.", MetricKind::Gauge)
            .await
            .unwrap();

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].help, "Kubernetes API reachability.");
        assert!(snapshot[0].series.is_empty());
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_writes() {
        let registry = MetricRegistry::new();
        registry.set("g", &ip("a"), 1.0).await.unwrap();
        let snapshot = registry.snapshot().await;
        registry.set("g", &ip("a"), 2.0).await.unwrap();

        assert_eq!(snapshot[0].series, vec![(ip("a"), 1.0)]);
    }

    #[tokio::test]
    async fn write_to_shared_series_copies_instead_of_mutating() {
        let registry = MetricRegistry::new();
        registry.set("g", &ip("a"), 1.0).await.unwrap();

        // Stand-in for a snapshot that has left the lock but not yet copied.
        let held = {
            let families = registry.families.read().await;
            Arc::clone(&families["g"].series)
        };
        registry.set("g", &ip("a"), 2.0).await.unwrap();

        assert_eq!(held.get(&ip("a")), Some(&1.0));
        assert_eq!(registry.get("g", &ip("a")).await, Some(2.0));

        // A finished snapshot keeps no reference into the registry.
        registry.snapshot().await;
        let families = registry.families.read().await;
        assert!(families.values().all(|f| Arc::strong_count(&f.series) == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_lose_no_updates() {
        let registry = MetricRegistry::new();
        let mut handles = Vec::new();
        for t in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let labels = ip(&format!("10.0.1.{t}"));
                for _ in 0..50 {
                    registry.add("ping_count_total", &labels, 1.0).await.unwrap();
                    registry.set("ping_status", &labels, 1.0).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(registry.series_count("ping_status").await, 16);
        for t in 0..16 {
            let total = registry
                .get("ping_count_total", &ip(&format!("10.0.1.{t}")))
                .await;
            assert_eq!(total, Some(50.0));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn snapshot_never_sees_torn_entries() {
        let registry = MetricRegistry::new();

        // Each writer only ever stores its own index under its own label,
        // so any mismatch in a snapshot would be a torn read.
        let mut writers = Vec::new();
        for t in 0..8u32 {
            let registry = registry.clone();
            writers.push(tokio::spawn(async move {
                let labels = Labels::new().with("writer", t.to_string());
                for _ in 0..200 {
                    registry.set("owner", &labels, f64::from(t)).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }

        let reader = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    for family in registry.snapshot().await {
                        for (labels, value) in family.series {
                            let owner: f64 = labels.get("writer").unwrap().parse().unwrap();
                            assert_eq!(owner, value);
                        }
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for w in writers {
            w.await.unwrap();
        }
        reader.await.unwrap();
        assert_eq!(registry.series_count("owner").await, 8);
    }
}
