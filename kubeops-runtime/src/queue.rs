//! A delay-scheduled, per-key-coalesced work queue.
//!
//! Producers (the watcher, a reconciler asking for a requeue, the finalizer registry continuing
//! a cleanup) never touch the queue directly; they hold a cheaply-cloneable [`TimedQueueHandle`]
//! and send commands through it. The queue itself is driven purely by polling it as a
//! [`Stream`], which is what [`Dispatcher`](crate::dispatcher::Dispatcher) does.
//!
//! Per-UID mutual exclusion is the dispatcher's job (see [`lock_table`](crate::lock_table)), not
//! the queue's, so there is no filtered view here that withholds ready items pending a lock.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::mpsc;
use futures::Stream;
use pin_project::pin_project;
use tokio::time::Instant;
use tokio_util::time::{delay_queue, DelayQueue};

use crate::entity::{EntityError, QueueKey, ReconciliationType, TriggerSource};

/// A unit of queued work: the object that needs reconciling, plus why.
///
/// Equality, ordering and coalescing are all keyed on [`QueueMessage::key`] alone;
/// `reconciliation_type` and `trigger_source` are carried along for the dispatcher and
/// reconciler to act on, but a later enqueue for the same key always replaces an earlier one
/// outright, taking over its reason too.
pub struct QueueMessage<K> {
    key: QueueKey,
    /// The object as observed when this entry was queued.
    pub entity: Arc<K>,
    /// Why `entity` needs reconciling.
    pub reconciliation_type: ReconciliationType,
    /// Who asked for it.
    pub trigger_source: TriggerSource,
}

impl<K> QueueMessage<K> {
    /// The coalescing key this entry was queued under.
    #[must_use]
    pub fn key(&self) -> &QueueKey {
        &self.key
    }
}

enum QueueCommand<K> {
    Enqueue {
        entity: Arc<K>,
        reconciliation_type: ReconciliationType,
        trigger_source: TriggerSource,
        delay: Duration,
    },
    Remove {
        key: QueueKey,
    },
}

/// A cloneable front-end for a [`TimedQueue`].
///
/// Dropping every handle closes the queue: once all commands already in flight are drained and
/// the queue itself is empty, the queue's `Stream` impl ends.
#[derive(Clone)]
pub struct TimedQueueHandle<K> {
    tx: mpsc::UnboundedSender<QueueCommand<K>>,
}

impl<K> TimedQueueHandle<K> {
    /// Schedules `entity` to be emitted by the queue after `delay`.
    ///
    /// If an entry already exists for this object's key, it is replaced: the new
    /// `reconciliation_type`, `trigger_source` and `delay` win, and the object's previous
    /// scheduled time is discarded.
    ///
    /// # Errors
    /// Returns [`EntityError::MissingName`] if `entity` has no `metadata.name`. Delivery to the
    /// queue's background task is otherwise best-effort: if the queue has already been dropped,
    /// the command is silently discarded, since there is nothing left to observe it.
    pub fn enqueue(
        &self,
        entity: Arc<K>,
        reconciliation_type: ReconciliationType,
        trigger_source: TriggerSource,
        delay: Duration,
    ) -> Result<(), EntityError>
    where
        K: kube_core::Resource,
    {
        QueueKey::for_entity(&*entity)?;
        let _ = self.tx.unbounded_send(QueueCommand::Enqueue {
            entity,
            reconciliation_type,
            trigger_source,
            delay,
        });
        Ok(())
    }

    /// Cancels any pending scheduled entry for `entity`. A no-op if none exists.
    ///
    /// Used before starting finalizer or delete processing, so a stale delayed retry for an
    /// object does not race with the path actively handling it.
    pub fn remove(&self, entity: &K)
    where
        K: kube_core::Resource,
    {
        if let Ok(key) = QueueKey::for_entity(entity) {
            let _ = self.tx.unbounded_send(QueueCommand::Remove { key });
        }
    }
}

/// A delay-scheduled queue of [`QueueMessage`]s, coalesced by object key.
///
/// Constructed with [`timed_queue`]. Polling it as a [`Stream`] yields entries once their delay
/// has elapsed, in expiry order; it never terminates on its own while at least one
/// [`TimedQueueHandle`] is still alive, even while momentarily empty.
#[pin_project]
pub struct TimedQueue<K> {
    queue: DelayQueue<QueueMessage<K>>,
    scheduled: HashMap<QueueKey, delay_queue::Key>,
    #[pin]
    commands: mpsc::UnboundedReceiver<QueueCommand<K>>,
    commands_closed: bool,
}

/// Builds a [`TimedQueue`] and a [`TimedQueueHandle`] that feeds it.
#[must_use]
pub fn timed_queue<K>() -> (TimedQueueHandle<K>, TimedQueue<K>) {
    let (tx, rx) = mpsc::unbounded();
    (
        TimedQueueHandle { tx },
        TimedQueue {
            queue: DelayQueue::new(),
            scheduled: HashMap::new(),
            commands: rx,
            commands_closed: false,
        },
    )
}

impl<K> Stream for TimedQueue<K> {
    type Item = QueueMessage<K>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.commands_closed {
                break;
            }
            match this.commands.as_mut().poll_next(cx) {
                Poll::Ready(Some(QueueCommand::Enqueue {
                    entity,
                    reconciliation_type,
                    trigger_source,
                    delay,
                })) => {
                    let key = match QueueKey::for_entity(&*entity) {
                        Ok(key) => key,
                        Err(_) => continue,
                    };
                    if let Some(old) = this.scheduled.remove(&key) {
                        this.queue.remove(&old);
                    }
                    let dq_key = this.queue.insert(
                        QueueMessage {
                            key: key.clone(),
                            entity,
                            reconciliation_type,
                            trigger_source,
                        },
                        delay,
                    );
                    this.scheduled.insert(key, dq_key);
                }
                Poll::Ready(Some(QueueCommand::Remove { key })) => {
                    if let Some(dq_key) = this.scheduled.remove(&key) {
                        this.queue.remove(&dq_key);
                    }
                }
                Poll::Ready(None) => {
                    *this.commands_closed = true;
                }
                Poll::Pending => break,
            }
        }

        match this.queue.poll_expired(cx) {
            Poll::Ready(Some(expired)) => {
                let message = expired.into_inner();
                this.scheduled.remove(&message.key);
                Poll::Ready(Some(message))
            }
            Poll::Ready(None) => {
                if *this.commands_closed && this.queue.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Pending
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Converts a delay relative to now into an [`Instant`] suitable for logging or tests.
#[must_use]
pub fn deadline_from_now(delay: Duration) -> Instant {
    Instant::now() + delay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ReconciliationType, TriggerSource};
    use futures::StreamExt;
    use k8s_openapi::api::core::v1::Pod;
    use kube_core::ObjectMeta;

    fn pod(name: &str) -> Arc<Pod> {
        Arc::new(Pod {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn enqueued_entry_is_emitted_after_its_delay() {
        let (handle, mut queue) = timed_queue::<Pod>();
        handle
            .enqueue(pod("a"), ReconciliationType::Add, TriggerSource::Watch, Duration::from_secs(1))
            .unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(futures::poll!(queue.next()).is_pending());

        tokio::time::advance(Duration::from_secs(1)).await;
        let message = queue.next().await.unwrap();
        assert_eq!(message.key().to_string(), "default/a");
    }

    #[tokio::test(start_paused = true)]
    async fn second_enqueue_for_same_key_replaces_the_first() {
        let (handle, mut queue) = timed_queue::<Pod>();
        handle
            .enqueue(pod("a"), ReconciliationType::Add, TriggerSource::Watch, Duration::from_secs(10))
            .unwrap();
        handle
            .enqueue(pod("a"), ReconciliationType::Modify, TriggerSource::Watch, Duration::from_millis(100))
            .unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        let message = queue.next().await.unwrap();
        assert_eq!(message.reconciliation_type, ReconciliationType::Modify);

        // the first (longer) schedule must have been cancelled, not merely superseded
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(futures::poll!(queue.next()).is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_cancels_a_pending_entry() {
        let (handle, mut queue) = timed_queue::<Pod>();
        handle
            .enqueue(pod("a"), ReconciliationType::Add, TriggerSource::Watch, Duration::from_secs(1))
            .unwrap();
        handle.remove(&*pod("a"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(futures::poll!(queue.next()).is_pending());
    }

    #[tokio::test]
    async fn dropping_every_handle_ends_the_stream_once_drained() {
        let (handle, mut queue) = timed_queue::<Pod>();
        handle
            .enqueue(pod("a"), ReconciliationType::Add, TriggerSource::Watch, Duration::ZERO)
            .unwrap();
        drop(handle);

        assert!(queue.next().await.is_some());
        assert!(queue.next().await.is_none());
    }
}
