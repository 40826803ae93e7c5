//! Kube shared types, traits and client-less behavior
//!
//! This crate collects the pieces that describe "a Kubernetes resource" and how to
//! talk *about* one (URLs, list/watch parameters, patches, dynamic typing) without
//! pulling in an HTTP client. [`kube-client`](https://docs.rs/kube-client) builds the
//! actual client on top of these types.

pub mod api_resource;
pub use api_resource::ApiResource;
pub mod dynamic;
pub use dynamic::DynamicObject;

pub mod gvk;
pub use gvk::{GroupVersionKind, GroupVersionResource};

pub mod metadata;

pub mod object;
pub use object::WatchEvent;

pub mod params;

pub mod request;
pub use request::Request;

mod resource;
pub use resource::{Resource, ResourceExt};

pub mod response;

pub mod subresource;

pub mod labels;

pub mod scope;

pub mod watch;

pub mod duration;
pub use duration::Duration;

pub mod util;

pub mod k8s;

mod error_boundary;
pub use error_boundary::DeserializeGuard;

mod error;
pub use error::{Error, ErrorResponse};
pub type Result<T, E = Error> = std::result::Result<T, E>;
