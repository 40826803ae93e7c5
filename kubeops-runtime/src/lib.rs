//! Reconciliation runtime for Kubernetes operators.
//!
//! This crate is the machinery that sits between a typed Kubernetes client and your own
//! `Reconcile`/`Finalize` logic: it watches objects of a given kind, filters out status-only
//! updates, schedules and coalesces reconciliation work, bounds how much of it runs at once, and
//! drives the finalizer attach/detach protocol correctly. You bring an [`Api`](kube_client::Api)
//! and an implementation of [`reconciler::Controller`]; [`manager::KindRuntime`] wires the rest.
//!
//! # Example
//!
//! ```no_run
//! use kube_client::Api;
//! use kubeops_runtime::config::OperatorConfig;
//! use kubeops_runtime::entity::ReconciliationResult;
//! use kubeops_runtime::manager::{KindRuntime, Manager};
//! use kubeops_runtime::reconciler::Controller;
//! use k8s_openapi::api::core::v1::Pod;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct PrintController;
//!
//! #[async_trait::async_trait]
//! impl Controller<Pod> for PrintController {
//!     async fn reconcile(&self, pod: Arc<Pod>) -> Result<ReconciliationResult, Box<dyn std::error::Error + Send + Sync>> {
//!         println!("reconciling {}", pod.metadata.name.as_deref().unwrap_or("<unnamed>"));
//!         Ok(ReconciliationResult::await_change())
//!     }
//! }
//!
//! # async fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube_client::Client::try_default().await?;
//! let pods: Api<Pod> = Api::default_namespaced(client);
//! let kind = KindRuntime::new(pods, OperatorConfig::new(), PrintController);
//! let manager = Manager::new().register(kind);
//! manager.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod finalizer;
pub mod generation_cache;
pub mod lease;
pub(crate) mod lock;
pub mod lock_table;
pub mod manager;
pub mod queue;
pub mod reconciler;
pub mod watcher;

pub use config::{ConflictPolicy, OperatorConfig};
pub use entity::{EntityError, QueueKey, ReconciliationResult, ReconciliationType, TriggerSource};
pub use manager::{KindRuntime, Manager};
pub use reconciler::Controller;
