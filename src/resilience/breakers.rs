//! Per-backend breaker set.
//!
//! # Responsibilities
//! - Hold exactly one breaker per service name for the process lifetime
//! - Create breakers on first use for services registered after startup
//!
//! # Design Decisions
//! - Breakers never share state: failures against one backend cannot
//!   affect routing to another
//! - State lives only in this process's memory

use std::sync::Arc;

use dashmap::DashMap;

use crate::resilience::circuit_breaker::{BreakerSettings, BreakerSnapshot, CircuitBreaker};

/// All breakers known to the gateway, keyed by service name.
#[derive(Debug)]
pub struct BreakerSet {
    settings: BreakerSettings,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerSet {
    /// Create a set, pre-populating breakers for `services`.
    pub fn new<I, S>(settings: BreakerSettings, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let breakers = DashMap::new();
        for name in services {
            let name = name.into();
            breakers.insert(name.clone(), Arc::new(CircuitBreaker::new(name, settings)));
        }
        Self { settings, breakers }
    }

    /// Breaker for `service`, created closed if it does not exist yet.
    pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service) {
            return existing.clone();
        }
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(service, self.settings)))
            .clone()
    }

    /// State of every breaker, sorted by service name.
    pub fn snapshot(&self) -> Vec<(String, BreakerSnapshot)> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
