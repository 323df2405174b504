//! In-memory registry store.
//!
//! # Responsibilities
//! - Upsert / remove service records
//! - Serve lookups and whole-registry snapshots
//! - Apply probe outcomes
//!
//! Readers load an `Arc` snapshot through `ArcSwap` and never take a lock.
//! Writers hold `write_lock`, copy the current map, mutate the copy and
//! publish it, so every mutation is all-or-nothing from a reader's view.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::Utc;

use crate::registry::record::{Metadata, RegistryError, ServiceRecord, ServiceStatus};

/// Point-in-time view of every record, keyed by service name.
pub type RegistrySnapshot = Arc<HashMap<String, ServiceRecord>>;

/// Directory of backend name → address / health / metadata.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    records: ArcSwap<HashMap<String, ServiceRecord>>,
    write_lock: Mutex<()>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a backend.
    ///
    /// The record is marked healthy with a fresh heartbeat. A re-registration
    /// keeps the original `registered_at`.
    pub fn register(&self, name: &str, url: &str, metadata: Metadata) -> ServiceRecord {
        let record = self.mutate(|records| {
            let now = Utc::now();
            let registered_at = records
                .get(name)
                .map(|existing| existing.registered_at)
                .unwrap_or(now);
            let record = ServiceRecord {
                url: url.to_string(),
                status: ServiceStatus::Healthy,
                last_heartbeat: now,
                metadata,
                registered_at,
            };
            records.insert(name.to_string(), record.clone());
            record
        });

        tracing::info!(service = %name, url = %url, "Service registered");
        record
    }

    /// Remove a backend. Returns whether a record existed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.mutate(|records| records.remove(name).is_some());
        if removed {
            tracing::info!(service = %name, "Service unregistered");
        }
        removed
    }

    /// Resolve a backend that is currently able to take traffic.
    pub fn lookup(&self, name: &str) -> Result<ServiceRecord, RegistryError> {
        let snapshot = self.records.load();
        match snapshot.get(name) {
            None => Err(RegistryError::NotFound(name.to_string())),
            Some(record) if !record.status.is_healthy() => {
                Err(RegistryError::Unhealthy(name.to_string()))
            }
            Some(record) => Ok(record.clone()),
        }
    }

    /// Snapshot of all records, healthy or not.
    pub fn list_all(&self) -> RegistrySnapshot {
        self.records.load_full()
    }

    /// Apply the outcome of a completed probe attempt.
    ///
    /// Refreshes the heartbeat either way. Returns the previous status, or
    /// `None` when the service was unregistered while the probe was in flight.
    pub fn record_probe(&self, name: &str, healthy: bool) -> Option<ServiceStatus> {
        let previous = self.mutate(|records| {
            let record = records.get_mut(name)?;
            let previous = record.status;
            record.status = ServiceStatus::from_probe(healthy);
            record.last_heartbeat = Utc::now();
            Some(previous)
        });

        if let Some(previous) = previous {
            let current = ServiceStatus::from_probe(healthy);
            if previous != current {
                tracing::info!(
                    service = %name,
                    from = previous.as_str(),
                    to = current.as_str(),
                    "Service status changed"
                );
            }
        }
        previous
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.records.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut HashMap<String, ServiceRecord>) -> R) -> R {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = HashMap::clone(&self.records.load());
        let result = f(&mut next);
        self.records.store(Arc::new(next));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(version: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("version".into(), json!(version));
        m
    }

    #[test]
    fn test_register_then_lookup() {
        let registry = ServiceRegistry::new();
        registry.register("svc", "http://host:1", Metadata::new());

        let record = registry.lookup("svc").unwrap();
        assert_eq!(record.status, ServiceStatus::Healthy);
        assert_eq!(record.url, "http://host:1");
    }

    #[test]
    fn test_unregister_then_lookup_fails() {
        let registry = ServiceRegistry::new();
        registry.register("svc", "http://host:1", Metadata::new());
        assert!(registry.unregister("svc"));

        assert_eq!(
            registry.lookup("svc").unwrap_err(),
            RegistryError::NotFound("svc".into())
        );
        // Unregistering again is a no-op.
        assert!(!registry.unregister("svc"));
    }

    #[test]
    fn test_reregister_preserves_registered_at() {
        let registry = ServiceRegistry::new();
        let first = registry.register("svc", "http://host:1", meta("1.0.0"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = registry.register("svc", "http://host:2", meta("1.1.0"));

        assert_eq!(first.registered_at, second.registered_at);
        assert!(second.last_heartbeat > first.last_heartbeat);
        assert_eq!(registry.lookup("svc").unwrap().url, "http://host:2");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unhealthy_lookup() {
        let registry = ServiceRegistry::new();
        registry.register("svc", "http://host:1", Metadata::new());
        assert_eq!(registry.record_probe("svc", false), Some(ServiceStatus::Healthy));

        assert_eq!(
            registry.lookup("svc").unwrap_err(),
            RegistryError::Unhealthy("svc".into())
        );
        // Still visible in the snapshot.
        assert_eq!(registry.list_all()["svc"].status, ServiceStatus::Unhealthy);
    }

    #[test]
    fn test_probe_refreshes_heartbeat_and_recovers() {
        let registry = ServiceRegistry::new();
        let registered = registry.register("svc", "http://host:1", Metadata::new());

        for _ in 0..3 {
            registry.record_probe("svc", false);
        }
        let failed = registry.list_all()["svc"].clone();
        assert_eq!(failed.status, ServiceStatus::Unhealthy);
        assert!(failed.last_heartbeat >= registered.last_heartbeat);

        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.record_probe("svc", true);
        let recovered = registry.lookup("svc").unwrap();
        assert!(recovered.last_heartbeat > failed.last_heartbeat);
    }

    #[test]
    fn test_probe_for_removed_service_is_ignored() {
        let registry = ServiceRegistry::new();
        assert_eq!(registry.record_probe("ghost", true), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_stable_across_writes() {
        let registry = ServiceRegistry::new();
        registry.register("a", "http://a:1", Metadata::new());
        let before = registry.list_all();

        registry.register("b", "http://b:1", Metadata::new());
        registry.unregister("a");

        assert_eq!(before.len(), 1);
        assert!(before.contains_key("a"));
        let after = registry.list_all();
        assert!(after.contains_key("b") && !after.contains_key("a"));
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let registry = Arc::new(ServiceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        registry.register(&format!("svc-{}-{}", i, j), "http://h:1", Metadata::new());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let registry = ServiceRegistry::new();
        let record = registry.register("svc", "http://host:1", meta("1.0.0"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["metadata"]["version"], "1.0.0");
        assert!(value.get("lastHeartbeat").is_some());
        assert!(value.get("registeredAt").is_some());
    }
}
