//! kubeql api: GraphQL resolvers over dynamic custom resources.
//!
//! A [`Bridge`] holds the per-identity client provider and runtime limits. Each request
//! carries its own [`RequestContext`]; resolvers pull the caller's client from the
//! provider, never from a shared client.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use kubeql_core::{BackendError, BridgeError, ClientOptions, ErrorKind, Identity, ResourceReference};
use kubeql_kubehub::{ClientCache, ClientProvider, DynamicClient, KubeClientFactory};
use tracing::info;

pub mod config;
pub mod connection;
pub mod mutation;
pub mod schema;
pub mod types;

pub use config::BridgeConfig;
pub use connection::{list_request, ConnectionBuilder};
pub use kubeql_kubehub::RequestContext;
pub use mutation::MutationExecutor;
pub use schema::{build_schema, field_error, BridgeSchema, MutationRoot, QueryRoot};
pub use types::{CrdConnection, CrdVersion, CustomResourceDefinition, PatchInput, Resource, ResourceConnection, ResourceReferenceInput};

/// Shared resolver state.
#[derive(Clone)]
pub struct Bridge {
    provider: Arc<dyn ClientProvider>,
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(provider: Arc<dyn ClientProvider>, config: BridgeConfig) -> Self { Self { provider, config } }

    /// Bridge over the ambient kube configuration with a per-identity client cache.
    pub async fn from_kube(config: BridgeConfig) -> Result<Self, BackendError> {
        let factory = KubeClientFactory::infer().await?;
        Ok(Self::new(Arc::new(ClientCache::new(factory, config.cache)), config))
    }

    pub fn config(&self) -> &BridgeConfig { &self.config }

    /// Request context for `identity` bounded by the configured request timeout.
    pub fn request_context(&self, identity: Identity, options: ClientOptions) -> RequestContext {
        RequestContext::new(identity).with_options(options).with_timeout(self.config.request_timeout)
    }

    /// Client for the caller in `rc`, bounded like a backend call.
    pub async fn client(&self, rc: &RequestContext) -> Result<Arc<dyn DynamicClient>, BridgeError> {
        rc.bounded(self.config.call_timeout, "client", self.provider.client(&rc.identity, &rc.options))
            .await
            .map_err(|e| BridgeError::new(ErrorKind::ClientAcquisition, e))
    }

    pub fn connections(&self) -> ConnectionBuilder<'_> { ConnectionBuilder::new(self) }

    pub fn mutations(&self) -> MutationExecutor<'_> { MutationExecutor::new(self) }

    pub async fn get(&self, rc: &RequestContext, reference: &ResourceReference) -> Result<Resource, BridgeError> {
        let client = self.client(rc).await?;
        let t0 = Instant::now();
        let obj = rc
            .bounded(self.config.call_timeout, "get", client.get(reference))
            .await
            .map_err(|e| BridgeError::new(ErrorKind::Get, e))?;
        info!(reference = %reference, took_ms = t0.elapsed().as_millis() as u64, "api: get");
        Resource::remodel(&obj)
    }

    /// One custom resource definition by name.
    pub async fn definition(&self, rc: &RequestContext, name: &str) -> Result<CustomResourceDefinition, BridgeError> {
        let client = self.client(rc).await?;
        let reference = CustomResourceDefinition::reference(name);
        let obj = rc
            .bounded(self.config.call_timeout, "get", client.get(&reference))
            .await
            .map_err(|e| BridgeError::new(ErrorKind::Get, e))?;
        CustomResourceDefinition::remodel(&obj)
    }
}

/// Execute `request` against `schema` as the caller described by `rc`.
pub async fn execute(schema: &BridgeSchema, rc: RequestContext, request: impl Into<async_graphql::Request>) -> async_graphql::Response {
    let t0 = Instant::now();
    let resp = schema.execute(request.into().data(rc)).await;
    info!(errors = resp.errors.len(), took_ms = t0.elapsed().as_millis() as u64, "api: request");
    resp
}
