//! Watches a single kind, filters out status-only updates, and feeds the survivors onto a
//! [`TimedQueue`](crate::queue::TimedQueue).
//!
//! Internally this is the same trampolined state machine kube-rs has always used for watch
//! recovery (list, then watch from the listed resource version, re-listing on `410 Gone`), built
//! on [`futures::stream::unfold`]. What is new here is the [`GenerationCache`] check sitting
//! between "the API server sent us an event" and "enqueue a reconciliation": a `Modified` event
//! whose `.metadata.generation` has already been observed is dropped rather than queued.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use kube_client::api::{ListParams, WatchEvent, WatchParams};
use kube_client::{Api, ResourceExt};
use kube_core::Resource;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::entity::{ReconciliationType, TriggerSource};
use crate::generation_cache::GenerationCache;
use crate::queue::TimedQueueHandle;

/// Errors surfaced while driving a watch.
///
/// Most of these are logged and retried: the state machine falls back to relisting, since a
/// watch that gives up on every transient hiccup would silently stop a controller from ever
/// reconciling again. The exception is [`is_fatal`](Self::is_fatal) errors — authorization
/// failures and a missing resource type — which no amount of retrying will resolve; those stop
/// [`run`] and are returned to the caller instead of looping forever.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The initial LIST used to seed a resource version failed.
    #[error("initial list failed: {0}")]
    InitialList(#[source] kube_client::Error),
    /// Starting the watch stream itself failed.
    #[error("failed to start watch: {0}")]
    WatchStart(#[source] kube_client::Error),
    /// The server returned an `Error` watch event.
    #[error("watch stream returned an error event: {0:?}")]
    WatchEvent(kube_core::ErrorResponse),
    /// The watch stream ended with a transport-level error.
    #[error("watch stream failed: {0}")]
    WatchStream(#[source] kube_client::Error),
}

impl WatchError {
    /// True for errors retrying will never resolve: the API server rejected our credentials
    /// (`401`/`403`), or the watched resource type does not exist (`404`). A `410 Gone` (a stale
    /// `resourceVersion`) is deliberately not fatal — `step` already handles it by relisting.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        let code = match self {
            WatchError::InitialList(err) | WatchError::WatchStart(err) | WatchError::WatchStream(err) => api_error_code(err),
            WatchError::WatchEvent(response) => Some(response.code),
        };
        matches!(code, Some(401) | Some(403) | Some(404))
    }
}

fn api_error_code(err: &kube_client::Error) -> Option<u16> {
    match err {
        kube_client::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

/// A single observed change, not yet filtered by generation.
enum Observed<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

enum State<K> {
    Empty,
    Listed {
        resource_version: String,
    },
    Watching {
        resource_version: String,
        stream: BoxStream<'static, kube_client::Result<WatchEvent<K>>>,
    },
}

/// Advances the state machine by exactly one step, trampolining through states that produce no
/// externally visible event (the initial LIST, starting the watch, bookmarks).
async fn step<K>(
    api: &Api<K>,
    list_params: &ListParams,
    mut state: State<K>,
) -> (Result<Observed<K>, WatchError>, State<K>)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    loop {
        state = match state {
            State::Empty => match api.list(list_params).await {
                Ok(list) => State::Listed {
                    resource_version: list.metadata.resource_version.unwrap_or_default(),
                },
                Err(err) => return (Err(WatchError::InitialList(err)), State::Empty),
            },
            State::Listed { resource_version } => {
                let wp = WatchParams {
                    label_selector: list_params.label_selector.clone(),
                    field_selector: list_params.field_selector.clone(),
                    timeout: list_params.timeout,
                    bookmarks: list_params.bookmarks,
                };
                match api.watch(&wp, &resource_version).await {
                    Ok(stream) => State::Watching {
                        resource_version,
                        stream: stream.boxed(),
                    },
                    Err(err) => {
                        return (
                            Err(WatchError::WatchStart(err)),
                            State::Listed { resource_version },
                        )
                    }
                }
            }
            State::Watching {
                resource_version,
                mut stream,
            } => match stream.next().await {
                None => State::Listed { resource_version },
                Some(Ok(WatchEvent::Bookmark(_))) => State::Watching { resource_version, stream },
                Some(Ok(WatchEvent::Added(obj))) => {
                    return (
                        Ok(Observed::Added(obj)),
                        State::Watching { resource_version, stream },
                    )
                }
                Some(Ok(WatchEvent::Modified(obj))) => {
                    return (
                        Ok(Observed::Modified(obj)),
                        State::Watching { resource_version, stream },
                    )
                }
                Some(Ok(WatchEvent::Deleted(obj))) => {
                    return (
                        Ok(Observed::Deleted(obj)),
                        State::Watching { resource_version, stream },
                    )
                }
                Some(Ok(WatchEvent::Error(err))) => {
                    let next_state = if err.code == 410 {
                        State::Empty
                    } else {
                        State::Watching { resource_version, stream }
                    };
                    return (Err(WatchError::WatchEvent(err)), next_state);
                }
                Some(Err(err)) => {
                    return (
                        Err(WatchError::WatchStream(err)),
                        State::Watching { resource_version, stream },
                    )
                }
            },
        }
    }
}

/// Drives a single kind's watch loop, enqueueing an entry on the queue for every `Added`,
/// non-stale `Modified`, and `Deleted` event, until `shutdown` is cancelled or a fatal error
/// occurs.
///
/// `shutdown` is checked between events, not in the middle of an in-flight HTTP call; the watch
/// connection itself is dropped (ending the loop) once cancellation fires. Restartable: a fresh
/// call with a fresh token opens a new watch, picking up where the passed-in `cache` left off —
/// this is what lets [`LeaderGate`](crate::lease::LeaderGate) stop and restart the watcher across
/// lease transitions without losing generation-filtering state.
///
/// # Errors
/// Returns the first [`WatchError`] for which [`is_fatal`](WatchError::is_fatal) is true. The
/// caller is expected to treat this as fatal to the whole process, per this runtime's error
/// taxonomy: retrying a rejected credential or a resource type the API server doesn't recognize
/// will never succeed.
pub async fn run<K>(
    api: Api<K>,
    list_params: ListParams,
    cache: Arc<GenerationCache>,
    queue: TimedQueueHandle<K>,
    shutdown: CancellationToken,
) -> Result<(), WatchError>
where
    K: Resource + ResourceExt + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let mut state = State::Empty;
    loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }

        let (result, next_state) = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(()),
            step_result = step(&api, &list_params, state) => step_result,
        };
        state = next_state;

        let observed = match result {
            Ok(observed) => observed,
            Err(err) if err.is_fatal() => {
                tracing::error!(error = %err, "fatal watch error, stopping watcher");
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(error = %err, "watch recovering after error");
                continue;
            }
        };

        apply(&observed, &cache, &queue);
    }
}

/// Watch-observed events are always enqueued for immediate processing; only a reconciler's own
/// requeue request or a conflict-policy retry carries a nonzero delay.
fn apply<K>(observed: &Observed<K>, cache: &GenerationCache, queue: &TimedQueueHandle<K>)
where
    K: Resource + ResourceExt + Clone,
{
    let (entity, reconciliation_type) = match observed {
        Observed::Added(obj) => (obj, ReconciliationType::Add),
        Observed::Modified(obj) => (obj, ReconciliationType::Modify),
        Observed::Deleted(obj) => (obj, ReconciliationType::Delete),
    };

    let uid = entity.uid().unwrap_or_default();
    match reconciliation_type {
        ReconciliationType::Add | ReconciliationType::Modify => {
            let generation = entity.meta().generation.unwrap_or(0);
            if !cache.observe(&uid, generation) {
                tracing::trace!(%uid, generation, "dropping status-only update");
                return;
            }
        }
        ReconciliationType::Delete => {
            cache.remove(&uid);
        }
    }

    if let Err(err) = queue.enqueue(Arc::new(entity.clone()), reconciliation_type, TriggerSource::Watch, Duration::ZERO) {
        tracing::warn!(error = %err, "dropping watch event for unnamed object");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation_cache::CacheConfig;
    use crate::queue::timed_queue;
    use futures::pin_mut;
    use futures::StreamExt;
    use http::{Request, Response};
    use hyper::Body;
    use k8s_openapi::api::core::v1::Pod;
    use kube_client::Client;
    use kube_core::ObjectMeta;
    use tower_test::mock;

    fn api_error(code: u16) -> kube_client::Error {
        kube_client::Error::Api(kube_core::ErrorResponse {
            status: "Failure".to_owned(),
            message: "boom".to_owned(),
            reason: "boom".to_owned(),
            code,
        })
    }

    #[test]
    fn a_401_or_403_or_404_api_error_is_fatal_regardless_of_which_request_hit_it() {
        assert!(WatchError::InitialList(api_error(401)).is_fatal());
        assert!(WatchError::WatchStart(api_error(403)).is_fatal());
        assert!(WatchError::WatchStream(api_error(404)).is_fatal());
    }

    #[test]
    fn a_410_gone_is_not_fatal_because_step_handles_it_by_relisting() {
        assert!(!WatchError::InitialList(api_error(410)).is_fatal());
        assert!(!WatchError::WatchStream(api_error(410)).is_fatal());
    }

    #[test]
    fn a_non_api_transport_error_is_not_fatal() {
        assert!(!WatchError::WatchStream(kube_client::Error::LinesCodecMaxLineLengthExceeded).is_fatal());
    }

    #[test]
    fn a_watch_event_error_is_fatal_by_its_own_code_not_the_stream_error() {
        assert!(WatchError::WatchEvent(kube_core::ErrorResponse {
            status: "Failure".to_owned(),
            message: "forbidden".to_owned(),
            reason: "Forbidden".to_owned(),
            code: 403,
        })
        .is_fatal());
        assert!(!WatchError::WatchEvent(kube_core::ErrorResponse {
            status: "Failure".to_owned(),
            message: "gone".to_owned(),
            reason: "Gone".to_owned(),
            code: 410,
        })
        .is_fatal());
    }

    #[tokio::test]
    async fn run_returns_the_fatal_error_instead_of_retrying_forever() {
        let (mock_service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        let server = tokio::spawn(async move {
            pin_mut!(handle);
            let (request, send) = handle.next_request().await.unwrap();
            assert_eq!(request.method(), http::Method::GET);
            let body = serde_json::json!({
                "status": "Failure",
                "message": "forbidden",
                "reason": "Forbidden",
                "code": 403,
            });
            send.send_response(Response::builder().status(403).body(Body::from(body.to_string())).unwrap());
        });

        let api: Api<Pod> = Api::default_namespaced(Client::new(mock_service, "default"));
        let cache = Arc::new(GenerationCache::new(CacheConfig::Unbounded));
        let (queue_handle, _queue) = timed_queue::<Pod>();
        let shutdown = CancellationToken::new();

        let result = run(api, ListParams::default(), cache, queue_handle, shutdown).await;
        server.await.unwrap();
        assert!(matches!(&result, Err(err) if err.is_fatal()), "got {result:?}");
    }

    fn pod(uid: &str, generation: i64) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("a".to_owned()),
                namespace: Some("default".to_owned()),
                uid: Some(uid.to_owned()),
                generation: Some(generation),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn modified_with_unchanged_generation_is_dropped() {
        let cache = GenerationCache::new(CacheConfig::Unbounded);
        let (handle, mut queue) = timed_queue::<Pod>();

        apply(&Observed::Modified(pod("u1", 5)), &cache, &handle);
        apply(&Observed::Modified(pod("u1", 5)), &cache, &handle);
        drop(handle);

        assert!(queue.next().await.is_some(), "the first observation must enqueue");
        assert!(queue.next().await.is_none(), "the repeat at the same generation must not");
    }

    #[tokio::test]
    async fn modified_with_advanced_generation_enqueues() {
        let cache = GenerationCache::new(CacheConfig::Unbounded);
        let (handle, mut queue) = timed_queue::<Pod>();

        apply(&Observed::Modified(pod("u1", 5)), &cache, &handle);
        apply(&Observed::Modified(pod("u1", 6)), &cache, &handle);
        drop(handle);

        let first = queue.next().await.unwrap();
        assert_eq!(first.reconciliation_type, ReconciliationType::Modify);
        assert!(queue.next().await.is_some(), "the generation bump must enqueue again");
    }

    #[tokio::test]
    async fn added_event_seeds_the_cache() {
        let cache = GenerationCache::new(CacheConfig::Unbounded);
        let (handle, mut queue) = timed_queue::<Pod>();

        apply(&Observed::Added(pod("u1", 1)), &cache, &handle);
        apply(&Observed::Modified(pod("u1", 1)), &cache, &handle);
        drop(handle);

        assert!(queue.next().await.is_some(), "the Add must enqueue");
        assert!(
            queue.next().await.is_none(),
            "a Modify at the same generation the Add already recorded must not"
        );
    }

    #[tokio::test]
    async fn deleted_event_always_enqueues_and_evicts_the_cache() {
        let cache = GenerationCache::new(CacheConfig::Unbounded);
        let (handle, mut queue) = timed_queue::<Pod>();

        apply(&Observed::Added(pod("u1", 1)), &cache, &handle);
        apply(&Observed::Deleted(pod("u1", 1)), &cache, &handle);
        drop(handle);

        assert_eq!(cache.get("u1"), None);
        let first = queue.next().await.unwrap();
        assert_eq!(first.reconciliation_type, ReconciliationType::Add);
        let second = queue.next().await.unwrap();
        assert_eq!(second.reconciliation_type, ReconciliationType::Delete);
    }
}
