//! Back-pressured dispatch: pulls ready entries off a [`TimedQueue`] and runs them, bounding
//! both total concurrency and per-object concurrency.
//!
//! Two independent limits apply to every entry before its handler runs:
//!
//! - a global [`Semaphore`] permit, capping how many reconciliations of this kind run at once
//!   regardless of which objects they touch;
//! - a per-UID [`UidLockTable`] guard, so two entries for the same object are never handled
//!   concurrently.
//!
//! A permit is acquired *before* the next queue entry is even pulled, so a dispatcher that is
//! already at capacity leaves later entries queued rather than buffering them in memory.

use std::future::Future;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use kube_core::{Resource, ResourceExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::ConflictPolicy;
use crate::lock_table::UidLockTable;
use crate::queue::{QueueMessage, TimedQueueHandle};

/// Dispatches entries from a queue to a handler, enforcing the concurrency bounds in
/// [`OperatorConfig`](crate::config::OperatorConfig).
pub struct Dispatcher<K> {
    max_parallel: usize,
    policy: ConflictPolicy,
    queue_handle: TimedQueueHandle<K>,
}

/// The dispatcher was misconfigured.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherConfigError {
    /// A dispatcher with zero permits could never hand out work.
    #[error("max_parallel_reconciles must be positive")]
    MaxParallelMustBePositive,
}

impl<K> Dispatcher<K>
where
    K: Resource + ResourceExt + Send + Sync + 'static,
{
    /// Builds a dispatcher that admits at most `max_parallel` concurrent handler invocations and
    /// resolves same-UID conflicts per `policy`.
    pub fn new(
        max_parallel: usize,
        policy: ConflictPolicy,
        queue_handle: TimedQueueHandle<K>,
    ) -> Result<Self, DispatcherConfigError> {
        if max_parallel == 0 {
            return Err(DispatcherConfigError::MaxParallelMustBePositive);
        }
        Ok(Self {
            max_parallel,
            policy,
            queue_handle,
        })
    }

    /// Runs the dispatch loop until `shutdown` is cancelled or `queue` ends.
    ///
    /// `handle` is invoked once per admitted entry, under that entry's per-UID lock; it must not
    /// itself re-acquire the UID's lock (e.g. by calling back into this dispatcher), or it will
    /// deadlock against itself.
    pub async fn run<Q, F, Fut>(self, queue: Q, shutdown: CancellationToken, handle: F)
    where
        Q: Stream<Item = QueueMessage<K>> + Send + 'static,
        F: Fn(QueueMessage<K>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let lock_table = Arc::new(UidLockTable::<String>::new());
        let policy = self.policy;
        let queue_handle = self.queue_handle;
        futures::pin_mut!(queue);

        loop {
            let permit = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => permit.expect("dispatcher semaphore is never closed"),
            };

            let message = tokio::select! {
                biased;
                () = shutdown.cancelled() => { drop(permit); break; }
                next = queue.next() => match next {
                    Some(message) => message,
                    None => { drop(permit); break; }
                },
            };

            let uid = message.entity.uid().unwrap_or_default();
            let lock_table = lock_table.clone();
            let queue_handle = queue_handle.clone();
            let handle = handle.clone();

            tokio::spawn(async move {
                let _permit = permit;
                match acquire_for_policy(&policy, &lock_table, uid, &message, &queue_handle).await {
                    Admission::Acquired(guard) => {
                        handle(message).await;
                        drop(guard);
                    }
                    Admission::Discarded => {
                        tracing::debug!(key = %message.key(), "discarded: reconciliation already in flight for this object");
                    }
                    Admission::Requeued => {
                        tracing::debug!(key = %message.key(), "requeued: reconciliation already in flight for this object");
                    }
                }
            });
        }
    }
}

enum Admission<U: std::hash::Hash + Eq + Clone> {
    Acquired(crate::lock_table::UidLockGuard<U>),
    Discarded,
    Requeued,
}

async fn acquire_for_policy<K>(
    policy: &ConflictPolicy,
    table: &Arc<UidLockTable<String>>,
    uid: String,
    message: &QueueMessage<K>,
    queue_handle: &TimedQueueHandle<K>,
) -> Admission<String>
where
    K: Resource,
{
    match *policy {
        ConflictPolicy::WaitForCompletion => Admission::Acquired(table.lock(uid).await),
        ConflictPolicy::Discard => match table.try_lock(uid) {
            Some(guard) => Admission::Acquired(guard),
            None => Admission::Discarded,
        },
        ConflictPolicy::RequeueAfterDelay { delay } => match table.try_lock(uid) {
            Some(guard) => Admission::Acquired(guard),
            None => {
                let _ = queue_handle.enqueue(
                    message.entity.clone(),
                    message.reconciliation_type,
                    message.trigger_source,
                    delay,
                );
                Admission::Requeued
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ReconciliationType, TriggerSource};
    use crate::queue::timed_queue;
    use k8s_openapi::api::core::v1::Pod;
    use kube_core::ObjectMeta;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pod(name: &str, uid: &str) -> Arc<Pod> {
        Arc::new(Pod {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                uid: Some(uid.to_owned()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn zero_permits_is_rejected() {
        let (handle, _queue) = timed_queue::<Pod>();
        assert!(Dispatcher::new(0, ConflictPolicy::Discard, handle).is_err());
    }

    #[tokio::test]
    async fn dispatches_distinct_objects_concurrently() {
        let (queue_handle, queue) = timed_queue::<Pod>();
        let dispatcher = Dispatcher::new(4, ConflictPolicy::WaitForCompletion, queue_handle.clone()).unwrap();
        let inflight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();

        queue_handle
            .enqueue(pod("a", "uid-a"), ReconciliationType::Add, TriggerSource::Watch, Duration::ZERO)
            .unwrap();
        queue_handle
            .enqueue(pod("b", "uid-b"), ReconciliationType::Add, TriggerSource::Watch, Duration::ZERO)
            .unwrap();

        let inflight2 = inflight.clone();
        let max_seen2 = max_seen.clone();
        let shutdown2 = shutdown.clone();
        let run = tokio::spawn(dispatcher.run(queue, shutdown.clone(), move |_msg| {
            let inflight = inflight2.clone();
            let max_seen = max_seen2.clone();
            let shutdown = shutdown2.clone();
            async move {
                let now = inflight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                inflight.fetch_sub(1, Ordering::SeqCst);
                if max_seen.load(Ordering::SeqCst) >= 2 {
                    shutdown.cancel();
                }
            }
        }));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        let _ = run.await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 2);
    }
}
