//! Shared vocabulary for talking about a watched object independently of its Kubernetes kind.
//!
//! Every other module in this crate is generic over `K: Resource + ResourceExt`, and needs the
//! same handful of primitives: a stable per-object key for coalescing, a reason a reconciliation
//! is happening, and the outcome a reconciler hands back. They live here instead of being
//! repeated in `queue`, `dispatcher` and `reconciler`.

use std::fmt;
use std::time::Duration;

use kube_core::Resource;

/// Why a unit of work was placed on the timed queue.
///
/// Carried alongside the coalescing key so the dispatcher and reconciler can tell an
/// API-server-observed change from a self-scheduled retry, without it affecting how entries
/// are deduplicated (see [`QueueKey`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationType {
    /// The object was newly observed (either truly new, or first seen after a watch restart).
    Add,
    /// The object's spec or metadata changed (its `generation` advanced).
    Modify,
    /// The object is marked for deletion (`deletionTimestamp` is set).
    Delete,
}

/// Where a reconciliation request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Emitted by the generation-filtered watcher in response to an API server event.
    Watch,
    /// Self-scheduled: a reconciler asked to be called again after a delay.
    Requeue,
    /// Scheduled by the finalizer registry to continue a multi-finalizer cleanup.
    Finalizer,
}

/// A stable, `Eq + Hash` identity for an object, used to coalesce queue entries and to key the
/// per-UID exclusion lock.
///
/// Two enqueues for the same `namespace/name` (or bare `name` for cluster-scoped kinds) collapse
/// into one queue entry; see the [`queue`](crate::queue) module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey(String);

impl QueueKey {
    /// Derives the key for `entity` from its namespace and name.
    ///
    /// # Errors
    /// Returns [`MissingName`](EntityError::MissingName) if the object has no
    /// `metadata.name`, which should not happen for anything that came off a real watch stream
    /// but can occur for hand-built test fixtures.
    pub fn for_entity<K: Resource>(entity: &K) -> Result<Self, EntityError> {
        let meta = entity.meta();
        let name = meta.name.as_deref().ok_or(EntityError::MissingName)?;
        Ok(match meta.namespace.as_deref() {
            Some(ns) => QueueKey(format!("{ns}/{name}")),
            None => QueueKey(name.to_owned()),
        })
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur while deriving identity from an object.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    /// The object has no `metadata.name`, so no stable key can be derived for it.
    #[error("object has no metadata.name")]
    MissingName,
}

/// The outcome of a single reconciliation pass.
///
/// Mirrors the two things a reconciler can ask the runtime for: "call me back after a delay"
/// or "leave me alone until something changes". There is deliberately no `Ok(())`-without-requeue
/// variant: a reconciler that observed no error but also specified no requeue is relying entirely
/// on the next watch event, which is the same thing [`ReconciliationResult::await_change`] says
/// explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationResult {
    requeue_after: Option<Duration>,
}

impl ReconciliationResult {
    /// Ask to be reconciled again after `delay`, regardless of whether a watch event arrives first.
    #[must_use]
    pub fn requeue(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay),
        }
    }

    /// Do nothing further until the next watch-observed change.
    #[must_use]
    pub fn await_change() -> Self {
        Self { requeue_after: None }
    }

    /// The requested requeue delay, if any.
    #[must_use]
    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Pod;
    use kube_core::ObjectMeta;

    fn pod(name: Option<&str>, namespace: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: name.map(str::to_owned),
                namespace: namespace.map(str::to_owned),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn namespaced_key_is_namespace_slash_name() {
        let key = QueueKey::for_entity(&pod(Some("a"), Some("default"))).unwrap();
        assert_eq!(key.to_string(), "default/a");
    }

    #[test]
    fn cluster_scoped_key_is_bare_name() {
        let key = QueueKey::for_entity(&pod(Some("a"), None)).unwrap();
        assert_eq!(key.to_string(), "a");
    }

    #[test]
    fn nameless_entity_cannot_be_keyed() {
        assert!(matches!(
            QueueKey::for_entity(&pod(None, Some("default"))),
            Err(EntityError::MissingName)
        ));
    }

    #[test]
    fn await_change_carries_no_requeue() {
        assert_eq!(ReconciliationResult::await_change().requeue_after(), None);
    }

    #[test]
    fn requeue_carries_the_given_delay() {
        let delay = Duration::from_secs(30);
        assert_eq!(ReconciliationResult::requeue(delay).requeue_after(), Some(delay));
    }
}
