//! User-facing configuration for a reconciliation runtime instance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::generation_cache::CacheConfig;

/// What a [`Dispatcher`](crate::dispatcher::Dispatcher) does when a new unit of work
/// arrives for a UID that is already being reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Drop the new unit of work. The in-flight reconciliation is left to finish on its own.
    Discard,
    /// Put the new unit of work back on the timed queue, to be retried after `delay`.
    RequeueAfterDelay {
        /// How long to wait before the conflicting entry is attempted again.
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// Block the new unit of work until the in-flight reconciliation for this UID completes.
    WaitForCompletion,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::RequeueAfterDelay {
            delay: Duration::from_secs(5),
        }
    }
}

/// Replaces every run of characters that are not ASCII alphanumerics or `_` with a single `-`,
/// and lowercases the result, per the `name` config option's normalization rule.
fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut last_was_separator = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            normalized.push(ch.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator {
            normalized.push('-');
            last_was_separator = true;
        }
    }
    normalized.trim_matches('-').to_owned()
}

/// Tunables for a single watched kind's reconciliation loop.
///
/// Constructed once per kind and handed to [`Manager::register`](crate::manager::Manager::register).
/// Deserializable so an operator binary can layer it over a config file or environment, the way
/// most of this stack's other settings types are.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Display name for this operator process, normalized to lowercase with non-word runs
    /// collapsed to a single `-`. Used as a default leader-election identity and in log/span
    /// fields; has no bearing on reconciliation behavior.
    pub name: String,

    /// Upper bound on reconciliations running at once, across all UIDs of this kind.
    ///
    /// Enforced by a global semaphore in front of the dispatcher; see
    /// [`Dispatcher`](crate::dispatcher::Dispatcher).
    pub max_parallel_reconciles: usize,

    /// What to do when a second unit of work arrives for a UID already being reconciled.
    pub conflict_policy: ConflictPolicy,

    /// Eviction policy for the UID -> generation cache that filters stale `Modified` events.
    ///
    /// See [`GenerationCache`](crate::generation_cache::GenerationCache).
    pub cache_config: CacheConfig,

    /// How long a leader lease is valid for before it must be renewed.
    ///
    /// Only meaningful when the manager is configured with [`LeaderGate`](crate::lease::LeaderGate).
    #[serde(with = "humantime_serde")]
    pub lease_duration: Duration,

    /// How often the current leader attempts to renew its lease.
    #[serde(with = "humantime_serde")]
    pub lease_renew_period: Duration,

    /// How often a non-leader checks whether the lease has become available.
    #[serde(with = "humantime_serde")]
    pub lease_retry_period: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            name: "kubernetesoperator".to_owned(),
            max_parallel_reconciles: 10,
            conflict_policy: ConflictPolicy::default(),
            cache_config: CacheConfig::Unbounded,
            lease_duration: Duration::from_secs(15),
            lease_renew_period: Duration::from_secs(10),
            lease_retry_period: Duration::from_secs(2),
        }
    }
}

impl OperatorConfig {
    /// An `OperatorConfig` with every field left at its documented default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets [`name`](Self::name), normalizing it first.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = normalize_name(name);
        self
    }

    /// Sets [`max_parallel_reconciles`](Self::max_parallel_reconciles).
    ///
    /// # Panics
    /// Panics if `max` is zero; a dispatcher with no permits can never make progress.
    #[must_use]
    pub fn with_max_parallel_reconciles(mut self, max: usize) -> Self {
        assert!(max > 0, "max_parallel_reconciles must be positive");
        self.max_parallel_reconciles = max;
        self
    }

    /// Sets [`conflict_policy`](Self::conflict_policy).
    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets [`cache_config`](Self::cache_config).
    #[must_use]
    pub fn with_cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.cache_config = cache_config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_lowercased_and_non_word_runs_collapse() {
        let config = OperatorConfig::new().with_name("My Cool Operator!!");
        assert_eq!(config.name, "my-cool-operator");
    }

    #[test]
    fn default_name_matches_the_documented_default() {
        assert_eq!(OperatorConfig::new().name, "kubernetesoperator");
    }

    #[test]
    fn default_lease_durations_match_leader_election_defaults() {
        let config = OperatorConfig::new();
        assert_eq!(config.lease_duration, Duration::from_secs(15));
        assert_eq!(config.lease_renew_period, Duration::from_secs(10));
        assert_eq!(config.lease_retry_period, Duration::from_secs(2));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = OperatorConfig::new().with_conflict_policy(ConflictPolicy::RequeueAfterDelay {
            delay: Duration::from_secs(7),
        });
        let json = serde_json::to_string(&config).unwrap();
        let restored: OperatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.max_parallel_reconciles, config.max_parallel_reconciles);
        assert_eq!(restored.conflict_policy, config.conflict_policy);
    }
}
