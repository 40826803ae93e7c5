//! Registration and identifier derivation for user finalizers.
//!
//! A finalizer is registered once per entity kind under a name the user chooses; the registry
//! turns that name into a [`FinalizerIdentifier`] written to `metadata.finalizers`, and later
//! looks the finalizer back up by that same identifier when an object carrying it is being
//! deleted. Nothing here talks to the API server directly — see [`reconciler`](crate::reconciler)
//! for the attach/detach protocol that uses this registry.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;

use kube_core::Resource;

/// Kubernetes name fields are capped at 63 characters.
const MAX_IDENTIFIER_LEN: usize = 63;

/// User cleanup logic run once an entity is marked for deletion and this finalizer's identifier
/// is the first one remaining on it.
///
/// `finalize` must be idempotent: it may be invoked again after a previous call's result was
/// never durably recorded, for example if the process was restarted between cleanup succeeding
/// and the identifier being removed from `metadata.finalizers`.
#[async_trait::async_trait]
pub trait Finalizer<K>: Send + Sync {
    /// Performs cleanup for `entity`, which is already known to be marked for deletion.
    async fn finalize(&self, entity: Arc<K>) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

/// Derives the deterministic identifier for a finalizer named `name` registered against kind
/// `K`: `<group>/<name>`, lowercased, `name` suffixed with `finalizer` if it doesn't already end
/// in that word, the whole thing truncated to 63 characters.
///
/// Two calls with the same `name` and the same `K` always produce the same identifier; this is
/// what lets [`FinalizerRegistry::get`] look a finalizer back up from an identifier string that
/// was previously written to an object and read back off a fresh watch event.
#[must_use]
pub fn finalizer_identifier<K>(name: &str) -> String
where
    K: Resource,
    K::DynamicType: Default,
{
    let dt = K::DynamicType::default();
    let group = K::group(&dt);

    let mut suffixed = name.to_lowercase();
    if !suffixed.ends_with("finalizer") {
        suffixed.push_str("finalizer");
    }

    let mut identifier = if group.is_empty() {
        suffixed
    } else {
        format!("{}/{suffixed}", group.to_lowercase())
    };

    if identifier.len() > MAX_IDENTIFIER_LEN {
        let mut end = MAX_IDENTIFIER_LEN;
        while !identifier.is_char_boundary(end) {
            end -= 1;
        }
        identifier.truncate(end);
    }
    identifier
}

/// A kind's set of registered finalizers, keyed by their derived identifier.
///
/// One registry exists per entity kind, shared by every reconciliation of that kind; it is built
/// once at startup and never mutated afterwards.
pub struct FinalizerRegistry<K> {
    entries: HashMap<String, Arc<dyn Finalizer<K> + Send + Sync>>,
}

impl<K> Default for FinalizerRegistry<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K> FinalizerRegistry<K>
where
    K: Resource,
    K::DynamicType: Default,
{
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `finalizer` under the identifier derived from `name`, returning that
    /// identifier so the caller can, for instance, log it.
    pub fn register<F>(&mut self, name: &str, finalizer: F) -> String
    where
        F: Finalizer<K> + 'static,
    {
        let identifier = finalizer_identifier::<K>(name);
        self.entries.insert(identifier.clone(), Arc::new(finalizer));
        identifier
    }

    /// Looks up a registered finalizer by its identifier, as found on `metadata.finalizers`.
    ///
    /// Returns `None` if no finalizer is registered under this identifier, which is expected
    /// and benign when another operator owns it.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<Arc<dyn Finalizer<K> + Send + Sync>> {
        self.entries.get(identifier).cloned()
    }

    /// Every identifier this registry would attach to an entity. Order is not guaranteed
    /// (backed by a hash map); callers that need a stable attach order should sort.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Pod;

    #[test]
    fn identifier_is_lowercased_and_namespaced_by_group() {
        let id = finalizer_identifier::<Pod>("Cleanup");
        assert_eq!(id, "cleanupfinalizer");
    }

    #[test]
    fn identifier_is_not_double_suffixed() {
        let id = finalizer_identifier::<Pod>("cleanup-finalizer");
        assert_eq!(id, "cleanup-finalizer");
    }

    #[test]
    fn identifier_longer_than_63_chars_is_truncated() {
        let long_name = "a".repeat(100);
        let id = finalizer_identifier::<Pod>(&long_name);
        assert_eq!(id.len(), 63);
        assert!(id.starts_with(&"a".repeat(54)));
    }

    #[test]
    fn identifier_derivation_is_deterministic() {
        assert_eq!(finalizer_identifier::<Pod>("cleanup"), finalizer_identifier::<Pod>("cleanup"));
    }
}
