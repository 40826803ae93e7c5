//! Gates a watcher's start/stop on holding a `coordination.k8s.io/v1` `Lease`.
//!
//! One [`LeaderGate`] drives one lease. While this process holds it, `spawn` is called to start
//! a watcher under a fresh, per-term [`CancellationToken`]; the moment the lease is lost (or its
//! renewal fails), that token is cancelled and the gate waits for the watcher to finish before
//! going back to polling for the lease to free up. The [`GenerationCache`](crate::generation_cache::GenerationCache)
//! and [`TimedQueue`](crate::queue::TimedQueue) live above this layer and are untouched by any of
//! it, which is what makes transitions lossless: losing and reacquiring the lease only restarts
//! the watch, not the whole reconciliation pipeline.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::coordination::v1::Lease;
use k8s_openapi::chrono::Utc;
use kube_client::Api;
use tokio_util::sync::CancellationToken;

use crate::lock::raw::{LockSettings, RawLock};
use crate::watcher::WatchError;

/// Leader-election tunables, mirroring [`OperatorConfig`](crate::config::OperatorConfig)'s
/// `lease_*` fields.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Name of the `Lease` object actors compete for.
    pub lease_name: String,
    /// This process's identity, unique among every actor contending for the same lease.
    pub identity: String,
    /// How long a held lease is valid for before it must be renewed.
    pub lease_duration: Duration,
    /// How often the current holder attempts to renew.
    pub renew_period: Duration,
    /// How often a non-holder checks whether the lease has become available.
    pub retry_period: Duration,
}

/// Gates a watcher's lifecycle on holding a lease.
///
/// Constructed once per gated kind and driven to completion with [`run`](Self::run), which only
/// returns once `shutdown` is cancelled.
pub struct LeaderGate {
    lock: RawLock,
    config: LeaseConfig,
}

impl LeaderGate {
    /// Builds a gate contending for `config.lease_name` via `leases`.
    #[must_use]
    pub fn new(leases: Api<Lease>, config: LeaseConfig) -> Self {
        let settings = LockSettings {
            lease_name: config.lease_name.clone(),
            identity: config.identity.clone(),
            expiration_timeout_secs: config.lease_duration.as_secs().try_into().unwrap_or(i32::MAX),
        };
        Self {
            lock: RawLock::new(leases, settings),
            config,
        }
    }

    /// Drives leadership acquisition/renewal until `shutdown` is cancelled or the watcher it
    /// holds leadership for returns a fatal error.
    ///
    /// `spawn` is called exactly once per continuous stretch of held leadership, with a token
    /// that is cancelled as soon as this gate notices the lease was lost; `spawn`'s returned
    /// future is awaited to completion before the gate resumes polling for the lease, so the
    /// watcher it started is guaranteed to have wound down before a competing actor could start
    /// its own.
    ///
    /// # Errors
    /// Returns the [`WatchError`] the held watcher returned, if it ended on its own rather than
    /// being cancelled by a lost lease or shutdown.
    pub async fn run<F, Fut>(mut self, shutdown: CancellationToken, spawn: F) -> Result<(), WatchError>
    where
        F: Fn(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), WatchError>>,
    {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let acquired = tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(()),
                result = self.lock.try_acquire(Utc::now()) => result,
            };
            match acquired {
                Ok(true) => {
                    tracing::info!(lease = %self.config.lease_name, identity = %self.config.identity, "acquired leader lease");
                    self.hold_while_leader(&shutdown, &spawn).await?;
                }
                Ok(false) => {
                    tracing::trace!(lease = %self.config.lease_name, "lease held by another actor");
                }
                Err(err) => {
                    tracing::warn!(lease = %self.config.lease_name, error = %err, "lease acquisition failed, retrying");
                }
            }

            if shutdown.is_cancelled() {
                return Ok(());
            }
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.config.retry_period) => {}
            }
        }
    }

    /// Runs `spawn` under a term token, renewing the lease on a fixed period until renewal
    /// fails, the term's own watcher task ends on its own, or `shutdown` fires.
    async fn hold_while_leader<F, Fut>(&mut self, shutdown: &CancellationToken, spawn: &F) -> Result<(), WatchError>
    where
        F: Fn(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), WatchError>>,
    {
        let term = shutdown.child_token();
        let watcher = spawn(term.clone());
        futures::pin_mut!(watcher);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    term.cancel();
                    let _ = watcher.await;
                    return Ok(());
                }
                result = &mut watcher => {
                    // the watcher ended on its own (a fatal error); give up leadership rather
                    // than renewing a lease for a watch that is no longer running.
                    let _ = self.lock.try_release().await;
                    return result;
                }
                () = tokio::time::sleep(self.config.renew_period) => {
                    match self.lock.try_acquire(Utc::now()).await {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::info!(lease = %self.config.lease_name, "lost leader lease, stopping watcher");
                            term.cancel();
                            return watcher.await;
                        }
                        Err(err) => {
                            tracing::warn!(lease = %self.config.lease_name, error = %err, "lease renewal failed, stopping watcher");
                            term.cancel();
                            return watcher.await;
                        }
                    }
                }
            }
        }
    }
}
