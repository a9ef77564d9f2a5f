//! List-backed connections: one backend list per connection, nodes in stable order.

use std::time::Instant;

use kubeql_core::{list_kind_name, resolve_version, BridgeError, Connection, DynObject, ErrorKind, NodeOrder, ResourceKindDescriptor};
use kubeql_kubehub::{ListRequest, RequestContext};
use tracing::info;

use crate::types::{CustomResourceDefinition, Resource};
use crate::Bridge;

/// Build the list call for `descriptor` at `version`.
///
/// A blank namespace means all namespaces.
pub fn list_request(descriptor: &ResourceKindDescriptor, version: &str, namespace: Option<&str>) -> ListRequest {
    ListRequest {
        group: descriptor.group.clone(),
        version: version.to_string(),
        kind: descriptor.kind.clone(),
        list_kind: list_kind_name(&descriptor.kind, descriptor.list_kind.as_deref()),
        plural: descriptor.plural.clone(),
        namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
    }
}

pub struct ConnectionBuilder<'a> {
    bridge: &'a Bridge,
}

impl<'a> ConnectionBuilder<'a> {
    pub(crate) fn new(bridge: &'a Bridge) -> Self { Self { bridge } }

    /// List `req`, remodel every item and order the result.
    ///
    /// Any remodel failure fails the whole connection.
    pub async fn list<T, R>(&self, rc: &RequestContext, req: ListRequest, remodel: R) -> Result<Connection<T>, BridgeError>
    where
        T: NodeOrder,
        R: Fn(&DynObject) -> Result<T, BridgeError>,
    {
        let client = self.bridge.client(rc).await?;
        let t0 = Instant::now();
        let items = rc
            .bounded(self.bridge.config().call_timeout, "list", client.list(&req))
            .await
            .map_err(|e| BridgeError::new(ErrorKind::List, e))?;
        let nodes = items.iter().map(remodel).collect::<Result<Vec<T>, _>>()?;
        let took = t0.elapsed().as_millis() as u64;
        info!(kind = %req.kind, list_kind = %req.list_kind, version = %req.version, count = nodes.len(), took_ms = took, "connection: listed");
        Ok(Connection::ordered(nodes))
    }

    /// Objects of a dynamic kind; `version` overrides the picked one verbatim.
    pub async fn resources(
        &self,
        rc: &RequestContext,
        descriptor: &ResourceKindDescriptor,
        version: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<Connection<Resource>, BridgeError> {
        let version = resolve_version(version, &descriptor.versions);
        self.list(rc, list_request(descriptor, &version, namespace), Resource::remodel).await
    }

    /// Every custom resource definition visible to the caller.
    pub async fn definitions(&self, rc: &RequestContext) -> Result<Connection<CustomResourceDefinition>, BridgeError> {
        let descriptor = CustomResourceDefinition::meta_descriptor();
        let version = resolve_version(None, &descriptor.versions);
        self.list(rc, list_request(&descriptor, &version, None), CustomResourceDefinition::remodel).await
    }
}
