//! Wires a [`GenerationCache`], [`TimedQueue`], [`Dispatcher`] and [`reconciler`] together for
//! one entity kind, and lets a process run several such kinds side by side.
//!
//! This is the only module that knows about every other one; everything above it (user code)
//! only ever touches [`KindRuntime`] and [`Manager`].

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use k8s_openapi::api::coordination::v1::Lease;
use kube_client::api::ListParams;
use kube_client::{Api, ResourceExt};
use kube_core::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::dispatcher::Dispatcher;
use crate::finalizer::{Finalizer, FinalizerRegistry};
use crate::generation_cache::GenerationCache;
use crate::lease::{LeaderGate, LeaseConfig};
use crate::queue::timed_queue;
use crate::reconciler::{self, Controller, FinalizerPolicy};
use crate::watcher::WatchError;

/// Bounds required of every entity kind this crate operates on.
///
/// Spelled out once here so every other module can write `K: KindBounds` instead of repeating
/// the same six-trait list.
pub trait KindBounds:
    Resource + ResourceExt + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static
where
    Self::DynamicType: Default,
{
}

impl<K> KindBounds for K
where
    K: Resource + ResourceExt + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
}

/// Everything needed to run the reconciliation loop for one entity kind, assembled via its
/// fluent `with_*` methods and handed to [`Manager::register`].
pub struct KindRuntime<K>
where
    K: KindBounds,
    K::DynamicType: Default,
{
    api: Api<K>,
    config: OperatorConfig,
    list_params: ListParams,
    controller: Arc<dyn Controller<K> + Send + Sync>,
    finalizers: FinalizerRegistry<K>,
    finalizer_policy: FinalizerPolicy,
    leader: Option<LeaderGate>,
}

impl<K> KindRuntime<K>
where
    K: KindBounds,
    K::DynamicType: Default,
{
    /// Starts building a kind's runtime. `controller` is mandatory up front: a kind with nothing
    /// to reconcile is a configuration mistake, not a degraded-but-valid state, so there is no
    /// path that lets it be omitted and discovered missing later at startup.
    #[must_use]
    pub fn new(api: Api<K>, config: OperatorConfig, controller: impl Controller<K> + 'static) -> Self {
        Self {
            api,
            config,
            list_params: ListParams::default(),
            controller: Arc::new(controller),
            finalizers: FinalizerRegistry::new(),
            finalizer_policy: FinalizerPolicy::default(),
            leader: None,
        }
    }

    /// Scopes the watch to a namespace, label selector, or field selector.
    #[must_use]
    pub fn with_list_params(mut self, list_params: ListParams) -> Self {
        self.list_params = list_params;
        self
    }

    /// Registers a finalizer under the identifier derived from `name`. See
    /// [`finalizer_identifier`](crate::finalizer::finalizer_identifier) for the derivation rule.
    #[must_use]
    pub fn with_finalizer(mut self, name: &str, finalizer: impl Finalizer<K> + 'static) -> Self {
        self.finalizers.register(name, finalizer);
        self
    }

    /// Overrides whether finalizer identifiers are attached/detached automatically.
    /// Both default to `true`; see [`FinalizerPolicy`].
    #[must_use]
    pub fn with_finalizer_policy(mut self, policy: FinalizerPolicy) -> Self {
        self.finalizer_policy = policy;
        self
    }

    /// Gates this kind's watcher on holding `lease_name`, contending under `identity`.
    ///
    /// The lease's duration/renew/retry periods come from the [`OperatorConfig`] passed to
    /// [`new`](Self::new).
    #[must_use]
    pub fn with_leader_gate(mut self, leases: Api<Lease>, lease_name: impl Into<String>, identity: impl Into<String>) -> Self {
        self.leader = Some(LeaderGate::new(
            leases,
            LeaseConfig {
                lease_name: lease_name.into(),
                identity: identity.into(),
                lease_duration: self.config.lease_duration,
                renew_period: self.config.lease_renew_period,
                retry_period: self.config.lease_retry_period,
            },
        ));
        self
    }

    /// Runs the watcher, timed queue and dispatcher for this kind until `shutdown` is
    /// cancelled or the watch loop ends on its own. Returns once every in-flight reconciliation
    /// and the watch loop have wound down.
    ///
    /// The watcher and the dispatcher run under a shared child of `shutdown`: if the watch loop
    /// ends early (a fatal [`WatchError`], or a lost lease with no gate configured to restart
    /// it), that child token is cancelled too, so the dispatcher drains its in-flight work and
    /// stops rather than waiting forever for a queue nothing will ever feed again.
    ///
    /// # Errors
    /// Returns the watcher's [`WatchError`] if it ended with a fatal error rather than being
    /// cancelled by `shutdown`.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), WatchError> {
        let cache = Arc::new(GenerationCache::new(self.config.cache_config));
        let (queue_handle, queue) = timed_queue::<K>();
        let dispatcher = Dispatcher::new(self.config.max_parallel_reconciles, self.config.conflict_policy, queue_handle.clone())
            .expect("max_parallel_reconciles must be positive; fix the OperatorConfig passed to KindRuntime::new");

        let finalizers = Arc::new(self.finalizers);
        let policy = self.finalizer_policy;
        let controller = self.controller;
        let reconcile_api = self.api.clone();
        let reconcile_cache = cache.clone();
        let reconcile_queue = queue_handle.clone();

        let kind_shutdown = shutdown.child_token();

        let dispatch = dispatcher.run(queue, kind_shutdown.clone(), move |message| {
            let api = reconcile_api.clone();
            let controller = controller.clone();
            let finalizers = finalizers.clone();
            let cache = reconcile_cache.clone();
            let queue_handle = reconcile_queue.clone();
            async move {
                reconciler::reconcile_one(&api, controller.as_ref(), &finalizers, policy, &cache, &queue_handle, message).await;
            }
        });

        let watch_api = self.api;
        let list_params = self.list_params;

        let watch: Pin<Box<dyn Future<Output = Result<(), WatchError>> + Send>> = match self.leader {
            Some(gate) => {
                let watch_cache = cache;
                let watch_queue = queue_handle;
                Box::pin(gate.run(kind_shutdown.clone(), move |term| {
                    crate::watcher::run(watch_api.clone(), list_params.clone(), watch_cache.clone(), watch_queue.clone(), term)
                }))
            }
            None => Box::pin(crate::watcher::run(watch_api, list_params, cache, queue_handle, kind_shutdown.clone())),
        };

        futures::pin_mut!(dispatch);
        futures::pin_mut!(watch);

        tokio::select! {
            result = &mut watch => {
                kind_shutdown.cancel();
                (&mut dispatch).await;
                result
            }
            () = &mut dispatch => {
                kind_shutdown.cancel();
                watch.await
            }
        }
    }
}

type KindFuture = Pin<Box<dyn Future<Output = Result<(), WatchError>> + Send>>;

/// Runs several kinds' reconciliation loops side by side under one shutdown signal.
///
/// Each kind registered here has its own watcher, generation cache, timed queue and dispatcher;
/// the only thing they share is the process and, if the caller chooses, the same
/// [`CancellationToken`] passed to [`run`](Self::run).
#[derive(Default)]
pub struct Manager {
    kinds: Vec<Box<dyn FnOnce(CancellationToken) -> KindFuture + Send>>,
}

impl Manager {
    /// A manager with no kinds registered yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a kind's fully configured runtime. Registration order has no bearing on run order:
    /// every registered kind runs concurrently once [`run`](Self::run) is called.
    #[must_use]
    pub fn register<K>(mut self, kind: KindRuntime<K>) -> Self
    where
        K: KindBounds,
        K::DynamicType: Default,
    {
        self.kinds.push(Box::new(move |shutdown| Box::pin(kind.run(shutdown))));
        self
    }

    /// Runs every registered kind until `shutdown` is cancelled, then waits for all of them to
    /// finish winding down.
    ///
    /// Every kind is waited on, even after one returns a fatal error: a misbehaving API server
    /// for one kind is not a reason to abandon the others mid-reconciliation. Once all of them
    /// have finished, the first fatal [`WatchError`] encountered (in registration order) is
    /// returned to the caller, which is expected to treat it as fatal to the whole process.
    ///
    /// # Errors
    /// Returns the first registered kind's fatal [`WatchError`], if any kind's watcher ended
    /// with one.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), WatchError> {
        let running = self.kinds.into_iter().map(|build| build(shutdown.clone()));
        let results = futures::future::join_all(running).await;
        for result in results {
            result?;
        }
        Ok(())
    }
}
