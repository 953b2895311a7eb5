//! Named circuit breaker registry
//!
//! One registry is built at startup and handed to every component that talks
//! to a remote dependency. Components asking for the same name share one
//! breaker, so failures seen by one caller gate admission for all of them.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::config::CircuitBreakerConfig;

/// Registry of circuit breakers keyed by dependency name
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry; `defaults` applies to breakers created by [`get`](Self::get)
    #[must_use]
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            breakers: DashMap::new(),
        }
    }

    /// Get or create the breaker for `name` with the registry defaults
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_with(name, &self.defaults)
    }

    /// Get or create the breaker for `name`
    ///
    /// `config` is only used when the breaker does not exist yet.
    pub fn get_with(&self, name: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }

        Arc::clone(
            self.breakers
                .entry(name.to_string())
                .or_insert_with(|| {
                    debug!(breaker = name, "Creating circuit breaker");
                    Arc::new(CircuitBreaker::new(name, config))
                })
                .value(),
        )
    }

    /// Reset one breaker; returns `false` if the name is unknown
    pub fn reset(&self, name: &str) -> bool {
        self.breakers.get(name).is_some_and(|cb| {
            cb.reset();
            true
        })
    }

    /// Reset every breaker
    pub fn reset_all(&self) {
        for cb in &self.breakers {
            cb.reset();
        }
    }

    /// Stats of every breaker, ordered by name
    pub fn stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breaker has been created yet
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Drop every breaker; outstanding `Arc`s keep working but are no longer shared
    pub fn dispose(&self) {
        self.breakers.clear();
    }
}
