//! Batteries-included facade for building Kubernetes operators.
//!
//! This crate exists so a binary only needs one dependency: it re-exports the typed client
//! ([`kube_client`]), the shared API machinery ([`kube_core`]), and, with the `runtime` feature
//! (on by default), the reconciliation runtime ([`kubeops_runtime`]).
//!
//! # Example
//!
//! ```no_run
//! use kubeops::{Api, Client};
//! use kubeops::runtime::config::OperatorConfig;
//! use kubeops::runtime::entity::ReconciliationResult;
//! use kubeops::runtime::manager::{KindRuntime, Manager};
//! use kubeops::runtime::reconciler::Controller;
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
//! let client = Client::try_default().await?;
//! let pods: Api<Pod> = Api::default_namespaced(client);
//! let kind = KindRuntime::new(pods, OperatorConfig::new(), PrintController);
//! let manager = Manager::new().register(kind);
//! manager.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]

#[cfg(feature = "runtime")]
pub use kubeops_runtime as runtime;

pub use kube_client::*;
