//! kubeql kubehub: dynamic backend access for the resolver layer.
//!
//! [`DynamicClient`] is the only seam between the resolvers and the cluster. Clients are
//! built per caller identity by a [`ClientFactory`] and shared through [`ClientCache`].

#![forbid(unsafe_code)]

use std::sync::Arc;

use kubeql_core::{BackendError, ClientOptions, DynObject, Identity, ResourceReference};
use serde::{Deserialize, Serialize};

pub mod cache;
pub mod context;
pub mod kubeclient;
pub mod mock;

pub use cache::{CacheConfig, ClientCache};
pub use context::RequestContext;
pub use kubeclient::{KubeClient, KubeClientFactory};

/// A list call against one dynamic kind, optionally scoped to a namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListRequest {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// List type name (`<Kind>List` unless overridden).
    ///
    /// Informational. kube-rs lists through the kind's resource path and decodes the
    /// response as a generic list, so the backend never sends or checks this name. It is
    /// carried for logs and for recording backends.
    pub list_kind: String,
    pub plural: Option<String>,
    pub namespace: Option<String>,
}

impl ListRequest {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }
}

/// Backend operations against the dynamic object store.
#[async_trait::async_trait]
pub trait DynamicClient: Send + Sync {
    async fn list(&self, req: &ListRequest) -> Result<Vec<DynObject>, BackendError>;

    async fn get(&self, reference: &ResourceReference) -> Result<DynObject, BackendError>;

    async fn create(&self, obj: &DynObject) -> Result<DynObject, BackendError>;

    async fn update(&self, reference: &ResourceReference, obj: &DynObject) -> Result<DynObject, BackendError>;

    async fn delete(&self, reference: &ResourceReference) -> Result<(), BackendError>;
}

/// Builds a client scoped to one identity and option set.
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync {
    async fn build(&self, identity: &Identity, options: &ClientOptions) -> Result<Arc<dyn DynamicClient>, BackendError>;
}

/// Source of per-identity clients for the resolvers (normally a [`ClientCache`]).
#[async_trait::async_trait]
pub trait ClientProvider: Send + Sync {
    async fn client(&self, identity: &Identity, options: &ClientOptions) -> Result<Arc<dyn DynamicClient>, BackendError>;
}
