//! Translates a dequeued [`QueueMessage`] into user callbacks: the add/modify/delete routing
//! matrix, the finalizer attach/detach protocol, and result-driven requeue.
//!
//! This is the one module that talks to both user code ([`Controller`], [`Finalizer`]) and the
//! API server (`Api<K>::get_opt`/`replace`) in the same breath. Everything upstream of here
//! (watcher, queue, dispatcher) is oblivious to what a reconciliation actually does; everything
//! downstream (the user's own code) is oblivious to queues, locks and generations.

use std::error::Error as StdError;
use std::sync::Arc;

use kube_client::api::{Patch, PatchParams, PostParams};
use kube_client::{Api, ResourceExt};
use kube_core::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entity::{ReconciliationResult, ReconciliationType, TriggerSource};
use crate::finalizer::FinalizerRegistry;
use crate::generation_cache::GenerationCache;
use crate::queue::{QueueMessage, TimedQueueHandle};

/// User-supplied reconcile/delete logic for one entity kind.
///
/// `reconcile` is invoked for `Added`/`Modified` events on an object that is not being deleted
/// (or is being deleted but has no finalizers left for this runtime to run). `delete` is invoked
/// once Kubernetes has actually removed the object.
#[async_trait::async_trait]
pub trait Controller<K>: Send + Sync {
    /// Brings real-world state in line with `entity`'s spec.
    async fn reconcile(
        &self,
        entity: Arc<K>,
    ) -> Result<ReconciliationResult, Box<dyn StdError + Send + Sync>>;

    /// Reacts to `entity` having already been removed from the API server.
    ///
    /// The default implementation does nothing; most controllers only need finalizers (which
    /// run before deletion completes) and have nothing left to do once the object is gone.
    async fn delete(
        &self,
        entity: Arc<K>,
    ) -> Result<ReconciliationResult, Box<dyn StdError + Send + Sync>> {
        let _ = entity;
        Ok(ReconciliationResult::await_change())
    }

    /// Decides whether an error from [`reconcile`](Self::reconcile), [`delete`](Self::delete), or
    /// the finalizer protocol's own client calls should trigger a delayed retry.
    ///
    /// Called with the most recent known copy of `entity` and the error that escaped the call.
    /// The default never retries automatically, matching a reconciler that returned
    /// [`ReconciliationResult::await_change`] on success: the next watch event is relied on
    /// instead. Override this to requeue after a backoff, e.g. by inspecting `error` for a
    /// transient-vs-permanent distinction.
    fn error_policy(&self, entity: &K, error: &(dyn StdError + Send + Sync)) -> ReconciliationResult {
        let _ = (entity, error);
        ReconciliationResult::await_change()
    }
}

/// Governs the finalizer attach step of [`ReconcileEntity`](reconcile_one).
#[derive(Debug, Clone, Copy)]
pub struct FinalizerPolicy {
    /// Union every registered finalizer identifier onto an entity the first time it is seen.
    pub auto_attach: bool,
    /// Remove a finalizer's identifier once its `finalize` call succeeds.
    pub auto_detach: bool,
}

impl Default for FinalizerPolicy {
    fn default() -> Self {
        Self {
            auto_attach: true,
            auto_detach: true,
        }
    }
}

/// Runs one queue entry through the routing matrix, invoking `controller`/the matching
/// registered finalizer as appropriate, and re-enqueueing via `queue` if the result asks for it.
///
/// This is the body a [`Dispatcher`](crate::dispatcher::Dispatcher)'s `handle` closure delegates
/// to for one kind.
pub async fn reconcile_one<K>(
    api: &Api<K>,
    controller: &(dyn Controller<K> + Send + Sync),
    finalizers: &FinalizerRegistry<K>,
    policy: FinalizerPolicy,
    cache: &GenerationCache,
    queue: &TimedQueueHandle<K>,
    message: QueueMessage<K>,
) where
    K: Resource + ResourceExt + Clone + DeserializeOwned + Serialize + Send + Sync + 'static,
    K::DynamicType: Default,
{
    use tracing::Instrument;

    let span = tracing::info_span!(
        "reconcile",
        reconciliation_type = ?message.reconciliation_type,
        kind = %K::kind(&Default::default()),
        name = %message.entity.name(),
        uid = %message.entity.uid().unwrap_or_default(),
        resource_version = %message.entity.resource_version().unwrap_or_default(),
        trigger_source = ?message.trigger_source,
    );
    reconcile_one_inner(api, controller, finalizers, policy, cache, queue, message)
        .instrument(span)
        .await;
}

async fn reconcile_one_inner<K>(
    api: &Api<K>,
    controller: &(dyn Controller<K> + Send + Sync),
    finalizers: &FinalizerRegistry<K>,
    policy: FinalizerPolicy,
    cache: &GenerationCache,
    queue: &TimedQueueHandle<K>,
    message: QueueMessage<K>,
) where
    K: Resource + ResourceExt + Clone + DeserializeOwned + Serialize + Send + Sync + 'static,
    K::DynamicType: Default,
{
    queue.remove(&message.entity);

    let (active_entity, outcome) = match message.reconciliation_type {
        ReconciliationType::Delete => {
            let outcome = delete_path(controller, cache, &message.entity).await;
            (message.entity.clone(), outcome)
        }
        ReconciliationType::Add | ReconciliationType::Modify => {
            match refetch(api, &message.entity).await {
                Refetch::Gone => {
                    tracing::debug!(key = %message.key(), "entity gone before reconciliation ran");
                    return;
                }
                Refetch::Err(err) => (message.entity.clone(), Err(err)),
                Refetch::Found(current) => {
                    let outcome = if current.meta().deletion_timestamp.is_some() {
                        if current.finalizers().is_empty() {
                            Ok(ReconciliationResult::await_change())
                        } else {
                            finalize_path(api, finalizers, policy, current.clone()).await
                        }
                    } else {
                        reconcile_path(api, controller, finalizers, policy, current.clone()).await
                    };
                    (current, outcome)
                }
            }
        }
    };

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(key = %message.key(), error = %err, "reconciliation failed");
            controller.error_policy(&active_entity, err.as_ref())
        }
    };
    if let Some(delay) = result.requeue_after() {
        let _ = queue.enqueue(active_entity, message.reconciliation_type, TriggerSource::Requeue, delay);
    }
}

enum Refetch<K> {
    Found(Arc<K>),
    Gone,
    Err(Box<dyn StdError + Send + Sync>),
}

/// Re-fetches `entity` to get the freshest known copy before routing it.
///
/// `Ok(None)` (taxonomy entry 3, "not-found on refetch") is distinguished from every other
/// client error in the type system rather than by matching a status code: it is the one case
/// that is not actually a failure, just a race with the object's own deletion. Every other error
/// (taxonomy entry 1, "transient API errors") is [`Refetch::Err`], routed through
/// `controller.error_policy` by the caller rather than silently reconciling against stale data.
async fn refetch<K>(api: &Api<K>, entity: &K) -> Refetch<K>
where
    K: Resource + ResourceExt + Clone + DeserializeOwned,
{
    match api.get_opt(&entity.name()).await {
        Ok(Some(current)) => Refetch::Found(Arc::new(current)),
        Ok(None) => Refetch::Gone,
        Err(err) => Refetch::Err(Box::new(err)),
    }
}

async fn reconcile_path<K>(
    api: &Api<K>,
    controller: &(dyn Controller<K> + Send + Sync),
    finalizers: &FinalizerRegistry<K>,
    policy: FinalizerPolicy,
    entity: Arc<K>,
) -> Result<ReconciliationResult, Box<dyn StdError + Send + Sync>>
where
    K: Resource + ResourceExt + Clone + DeserializeOwned + Serialize,
    K::DynamicType: Default,
{
    let entity = if policy.auto_attach {
        attach_missing_finalizers(api, finalizers, entity).await?
    } else {
        entity
    };
    controller.reconcile(entity).await
}

/// Unions every identifier this kind has registered onto `entity.metadata.finalizers`, issuing
/// at most one `replace` call (and only if something was actually missing).
async fn attach_missing_finalizers<K>(
    api: &Api<K>,
    finalizers: &FinalizerRegistry<K>,
    entity: Arc<K>,
) -> Result<Arc<K>, Box<dyn StdError + Send + Sync>>
where
    K: Resource + ResourceExt + Clone + DeserializeOwned + Serialize,
    K::DynamicType: Default,
{
    let missing: Vec<&str> = finalizers
        .identifiers()
        .filter(|id| !entity.finalizers().iter().any(|existing| existing == *id))
        .collect();
    if missing.is_empty() {
        return Ok(entity);
    }

    let mut updated = (*entity).clone();
    let list = updated.finalizers_mut();
    for id in missing {
        list.push(id.to_owned());
    }
    let name = entity.name();
    let replaced = api.replace(&name, &PostParams::default(), &updated).await?;
    Ok(Arc::new(replaced))
}

/// Runs exactly the first remaining finalizer's cleanup, removing its identifier on success.
///
/// Deliberately single-shot: if `entity` has several finalizers left, this call handles only the
/// first and returns `await_change`, relying on the `Update` this produces to trigger the next
/// `Modified` event (and hence the next call, which then sees the next finalizer first).
async fn finalize_path<K>(
    api: &Api<K>,
    finalizers: &FinalizerRegistry<K>,
    policy: FinalizerPolicy,
    entity: Arc<K>,
) -> Result<ReconciliationResult, Box<dyn StdError + Send + Sync>>
where
    K: Resource + ResourceExt + Clone + DeserializeOwned + Serialize,
{
    let identifier = entity.finalizers()[0].clone();
    let Some(finalizer) = finalizers.get(&identifier) else {
        tracing::debug!(%identifier, "no finalizer registered under this identifier, leaving it for its owner");
        return Ok(ReconciliationResult::await_change());
    };

    finalizer.finalize(entity.clone()).await?;

    if policy.auto_detach {
        detach_finalizer(api, &entity, &identifier).await?;
    }
    Ok(ReconciliationResult::await_change())
}

async fn detach_finalizer<K>(
    api: &Api<K>,
    entity: &K,
    identifier: &str,
) -> Result<(), Box<dyn StdError + Send + Sync>>
where
    K: Resource + ResourceExt + Clone + DeserializeOwned + Serialize,
{
    use json_patch::{PatchOperation, RemoveOperation, TestOperation};
    use jsonptr::Pointer;
    use std::str::FromStr;

    let Some(index) = entity.finalizers().iter().position(|f| f == identifier) else {
        return Ok(());
    };
    let finalizer_path = format!("/metadata/finalizers/{index}");
    let patch = json_patch::Patch(vec![
        // `Test` fails (rather than removing the wrong entry) if another finalizer's
        // concurrent update shifted this index out from under us.
        PatchOperation::Test(TestOperation {
            path: Pointer::from_str(&finalizer_path).map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?,
            value: identifier.into(),
        }),
        PatchOperation::Remove(RemoveOperation {
            path: Pointer::from_str(&finalizer_path).map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?,
        }),
    ]);
    api.patch::<K>(&entity.name(), &PatchParams::default(), &Patch::Json(patch))
        .await?;
    Ok(())
}

async fn delete_path<K>(
    controller: &(dyn Controller<K> + Send + Sync),
    cache: &GenerationCache,
    entity: &Arc<K>,
) -> Result<ReconciliationResult, Box<dyn StdError + Send + Sync>>
where
    K: Resource + ResourceExt,
{
    let result = controller.delete(entity.clone()).await?;
    if let Some(uid) = entity.uid() {
        cache.remove(&uid);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TriggerSource;
    use crate::finalizer::Finalizer;
    use crate::queue::{timed_queue, QueueMessage, TimedQueueHandle};
    use futures::pin_mut;
    use futures::StreamExt;
    use http::{Request, Response};
    use hyper::Body;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use k8s_openapi::chrono::Utc;
    use kube_client::{Api, Client};
    use kube_core::ObjectMeta;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tower_test::mock;

    /// Round-trips `entity` through a fresh queue to obtain a real [`QueueMessage`]: this
    /// module has no public constructor for one (only [`TimedQueue`](crate::queue::TimedQueue)
    /// produces them), so tests borrow the same plumbing `Dispatcher` uses.
    async fn message_for(
        queue_handle: &TimedQueueHandle<Pod>,
        queue: &mut (impl futures::Stream<Item = QueueMessage<Pod>> + Unpin),
        entity: Pod,
        reconciliation_type: ReconciliationType,
    ) -> QueueMessage<Pod> {
        queue_handle
            .enqueue(Arc::new(entity), reconciliation_type, TriggerSource::Watch, Duration::ZERO)
            .unwrap();
        queue.next().await.unwrap()
    }

    fn pod(finalizers: &[&str], deleting: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("a".to_owned()),
                namespace: Some("default".to_owned()),
                uid: Some("uid-1".to_owned()),
                generation: Some(1),
                finalizers: (!finalizers.is_empty())
                    .then(|| finalizers.iter().map(|s| (*s).to_owned()).collect()),
                deletion_timestamp: deleting.then(|| Time(Utc::now())),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn to_body(value: &Pod) -> Body {
        Body::from(serde_json::to_vec(value).unwrap())
    }

    struct RecordingController {
        calls: AtomicUsize,
        result: fn() -> Result<ReconciliationResult, Box<dyn StdError + Send + Sync>>,
    }

    #[async_trait::async_trait]
    impl Controller<Pod> for RecordingController {
        async fn reconcile(&self, _entity: Arc<Pod>) -> Result<ReconciliationResult, Box<dyn StdError + Send + Sync>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    struct RecordingFinalizer {
        calls: StdMutex<usize>,
    }

    #[async_trait::async_trait]
    impl Finalizer<Pod> for RecordingFinalizer {
        async fn finalize(&self, _entity: Arc<Pod>) -> Result<(), Box<dyn StdError + Send + Sync>> {
            *self.calls.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn reconcile_path_attaches_missing_finalizers_before_calling_the_controller() {
        let (mock_service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        let fetched = pod(&[], false);
        let server = tokio::spawn(async move {
            pin_mut!(handle);

            let (request, send) = handle.next_request().await.unwrap();
            assert_eq!(request.method(), http::Method::GET);
            send.send_response(Response::builder().body(to_body(&fetched)).unwrap());

            let (request, send) = handle.next_request().await.unwrap();
            assert_eq!(request.method(), http::Method::PUT);
            let body = hyper::body::to_bytes(request.into_body()).await.unwrap();
            let replaced: Pod = serde_json::from_slice(&body).unwrap();
            assert_eq!(replaced.finalizers(), &["demo.kubeops.dev/testfinalizer".to_owned()]);
            send.send_response(Response::builder().body(to_body(&replaced)).unwrap());
        });

        let api: Api<Pod> = Api::default_namespaced(Client::new(mock_service, "default"));
        let mut finalizers = FinalizerRegistry::<Pod>::new();
        finalizers.register("test", RecordingFinalizer { calls: StdMutex::new(0) });
        let cache = GenerationCache::default();
        let (queue_handle, mut queue) = timed_queue::<Pod>();
        let controller = RecordingController {
            calls: AtomicUsize::new(0),
            result: || Ok(ReconciliationResult::await_change()),
        };

        let message = message_for(&queue_handle, &mut queue, pod(&[], false), ReconciliationType::Add).await;
        reconcile_one(&api, &controller, &finalizers, FinalizerPolicy::default(), &cache, &queue_handle, message).await;

        server.await.unwrap();
        assert_eq!(controller.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finalize_path_runs_the_first_finalizer_and_detaches_it_on_success() {
        let (mock_service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        let identifier = "demo.kubeops.dev/testfinalizer";
        let fetched = pod(&[identifier], true);
        let after_detach = pod(&[], true);
        let server = tokio::spawn(async move {
            pin_mut!(handle);

            let (request, send) = handle.next_request().await.unwrap();
            assert_eq!(request.method(), http::Method::GET);
            send.send_response(Response::builder().body(to_body(&fetched)).unwrap());

            let (request, send) = handle.next_request().await.unwrap();
            assert_eq!(request.method(), http::Method::PATCH);
            send.send_response(Response::builder().body(to_body(&after_detach)).unwrap());
        });

        let api: Api<Pod> = Api::default_namespaced(Client::new(mock_service, "default"));
        let mut finalizers = FinalizerRegistry::<Pod>::new();
        let registered_id = finalizers.register("test", RecordingFinalizer { calls: StdMutex::new(0) });
        assert_eq!(registered_id, identifier);
        let cache = GenerationCache::default();
        let (queue_handle, mut queue) = timed_queue::<Pod>();
        let controller = RecordingController {
            calls: AtomicUsize::new(0),
            result: || Ok(ReconciliationResult::await_change()),
        };

        let message = message_for(&queue_handle, &mut queue, pod(&[identifier], true), ReconciliationType::Modify).await;
        reconcile_one(&api, &controller, &finalizers, FinalizerPolicy::default(), &cache, &queue_handle, message).await;

        server.await.unwrap();
        assert_eq!(controller.calls.load(Ordering::SeqCst), 0, "a being-deleted entity must never reach reconcile");
    }

    #[tokio::test]
    async fn delete_event_evicts_the_generation_cache_without_touching_the_api() {
        let (mock_service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        drop(handle); // the delete path must issue zero requests

        let api: Api<Pod> = Api::default_namespaced(Client::new(mock_service, "default"));
        let finalizers = FinalizerRegistry::<Pod>::new();
        let cache = GenerationCache::default();
        cache.observe("uid-1", 1);
        let (queue_handle, mut queue) = timed_queue::<Pod>();
        let controller = RecordingController {
            calls: AtomicUsize::new(0),
            result: || Ok(ReconciliationResult::await_change()),
        };

        let message = message_for(&queue_handle, &mut queue, pod(&[], false), ReconciliationType::Delete).await;
        reconcile_one(&api, &controller, &finalizers, FinalizerPolicy::default(), &cache, &queue_handle, message).await;

        assert_eq!(cache.get("uid-1"), None);
    }

    #[tokio::test]
    async fn a_failed_reconcile_requeues_per_the_error_policy() {
        let (mock_service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        let fetched = pod(&[], false);
        let server = tokio::spawn(async move {
            pin_mut!(handle);
            let (request, send) = handle.next_request().await.unwrap();
            assert_eq!(request.method(), http::Method::GET);
            send.send_response(Response::builder().body(to_body(&fetched)).unwrap());
        });

        struct FailingController;
        #[async_trait::async_trait]
        impl Controller<Pod> for FailingController {
            async fn reconcile(&self, _entity: Arc<Pod>) -> Result<ReconciliationResult, Box<dyn StdError + Send + Sync>> {
                Err("boom".into())
            }
            fn error_policy(&self, _entity: &Pod, _error: &(dyn StdError + Send + Sync)) -> ReconciliationResult {
                ReconciliationResult::requeue(Duration::from_secs(10))
            }
        }

        let api: Api<Pod> = Api::default_namespaced(Client::new(mock_service, "default"));
        let finalizers = FinalizerRegistry::<Pod>::new();
        let cache = GenerationCache::default();
        let (queue_handle, mut queue) = timed_queue::<Pod>();
        let controller = FailingController;

        let message = message_for(&queue_handle, &mut queue, pod(&[], false), ReconciliationType::Modify).await;
        reconcile_one(&api, &controller, &finalizers, FinalizerPolicy::default(), &cache, &queue_handle, message).await;

        server.await.unwrap();
        drop(queue_handle);
        let requeued = queue.next().await.expect("the failed result must requeue");
        assert_eq!(requeued.trigger_source, TriggerSource::Requeue);
    }

    #[tokio::test]
    async fn a_refetch_error_routes_through_error_policy_instead_of_reconciling_stale_data() {
        let (mock_service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        let server = tokio::spawn(async move {
            pin_mut!(handle);
            let (request, send) = handle.next_request().await.unwrap();
            assert_eq!(request.method(), http::Method::GET);
            send.send_response(Response::builder().status(500).body(Body::from("boom")).unwrap());
        });

        let api: Api<Pod> = Api::default_namespaced(Client::new(mock_service, "default"));
        let finalizers = FinalizerRegistry::<Pod>::new();
        let cache = GenerationCache::default();
        let (queue_handle, mut queue) = timed_queue::<Pod>();
        let controller = RecordingController {
            calls: AtomicUsize::new(0),
            result: || Ok(ReconciliationResult::await_change()),
        };

        let message = message_for(&queue_handle, &mut queue, pod(&[], false), ReconciliationType::Modify).await;
        reconcile_one(&api, &controller, &finalizers, FinalizerPolicy::default(), &cache, &queue_handle, message).await;

        server.await.unwrap();
        assert_eq!(controller.calls.load(Ordering::SeqCst), 0, "a failed re-fetch must never reach reconcile");
    }
}
