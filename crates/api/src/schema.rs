//! GraphQL roots and the error surface.
//!
//! Every field is nullable. A failing resolver records exactly one error and resolves
//! to `null`; sibling fields still resolve.

use async_graphql::{Context, EmptySubscription, ErrorExtensions, Object, Schema};
use kubeql_core::{BridgeError, ErrorKind, Patch, ResourceReference};
use kubeql_kubehub::RequestContext;
use metrics::counter;
use tracing::warn;

use crate::types::{CrdConnection, CustomResourceDefinition, PatchInput, Resource, ResourceReferenceInput};
use crate::Bridge;

pub type BridgeSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(bridge: Bridge) -> BridgeSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription).data(bridge).finish()
}

/// Convert a resolver failure into a field error with `code`, `retriable` and `patchIndex` extensions.
pub fn field_error(field: &'static str, e: BridgeError) -> async_graphql::Error {
    counter!("kubeql_field_errors", 1u64, "code" => e.kind.code());
    warn!(field, code = e.kind.code(), retriable = e.is_retriable(), error = %e, "resolver: field failed");
    async_graphql::Error::new(e.to_string()).extend_with(|_, ext| {
        ext.set("code", e.kind.code());
        ext.set("retriable", e.is_retriable());
        if let Some(i) = e.patch_index {
            ext.set("patchIndex", i as i32);
        }
    })
}

/// Record `e` against the current field and resolve it to `null`.
pub(crate) fn report<T>(ctx: &Context<'_>, field: &'static str, e: BridgeError) -> Option<T> {
    let err = field_error(field, e).into_server_error(ctx.item.pos);
    ctx.add_error(ctx.set_error_path(err));
    None
}

/// Bridge and request context attached to the executing request.
pub(crate) fn scope<'c>(ctx: &Context<'c>) -> Result<(&'c Bridge, &'c RequestContext), BridgeError> {
    let bridge = ctx.data::<Bridge>().map_err(|_| BridgeError::other(ErrorKind::ClientAcquisition, "bridge not attached to schema"))?;
    let rc = ctx
        .data::<RequestContext>()
        .map_err(|_| BridgeError::other(ErrorKind::ClientAcquisition, "request carries no caller identity"))?;
    Ok((bridge, rc))
}

fn to_patches(input: Vec<PatchInput>) -> Vec<Patch> { input.into_iter().map(Patch::from).collect() }

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn custom_resource_definitions(&self, ctx: &Context<'_>) -> Option<CrdConnection> {
        const FIELD: &str = "customResourceDefinitions";
        let (bridge, rc) = match scope(ctx) {
            Ok(s) => s,
            Err(e) => return report(ctx, FIELD, e),
        };
        match bridge.connections().definitions(rc).await {
            Ok(c) => Some(c.into()),
            Err(e) => report(ctx, FIELD, e),
        }
    }

    async fn custom_resource_definition(&self, ctx: &Context<'_>, name: String) -> Option<CustomResourceDefinition> {
        const FIELD: &str = "customResourceDefinition";
        let (bridge, rc) = match scope(ctx) {
            Ok(s) => s,
            Err(e) => return report(ctx, FIELD, e),
        };
        match bridge.definition(rc, &name).await {
            Ok(d) => Some(d),
            Err(e) => report(ctx, FIELD, e),
        }
    }

    async fn resource(&self, ctx: &Context<'_>, reference: ResourceReferenceInput) -> Option<Resource> {
        const FIELD: &str = "resource";
        let (bridge, rc) = match scope(ctx) {
            Ok(s) => s,
            Err(e) => return report(ctx, FIELD, e),
        };
        match bridge.get(rc, &ResourceReference::from(reference)).await {
            Ok(r) => Some(r),
            Err(e) => report(ctx, FIELD, e),
        }
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Create from a raw JSON document after applying `patches`.
    async fn create_resource(&self, ctx: &Context<'_>, document: String, #[graphql(default)] patches: Vec<PatchInput>) -> Option<Resource> {
        const FIELD: &str = "createResource";
        let (bridge, rc) = match scope(ctx) {
            Ok(s) => s,
            Err(e) => return report(ctx, FIELD, e),
        };
        match bridge.mutations().create(rc, &document, &to_patches(patches)).await {
            Ok(r) => Some(r),
            Err(e) => report(ctx, FIELD, e),
        }
    }

    async fn update_resource(
        &self,
        ctx: &Context<'_>,
        reference: ResourceReferenceInput,
        document: String,
        #[graphql(default)] patches: Vec<PatchInput>,
    ) -> Option<Resource> {
        const FIELD: &str = "updateResource";
        let (bridge, rc) = match scope(ctx) {
            Ok(s) => s,
            Err(e) => return report(ctx, FIELD, e),
        };
        let reference = ResourceReference::from(reference);
        match bridge.mutations().update(rc, &reference, &document, &to_patches(patches)).await {
            Ok(r) => Some(r),
            Err(e) => report(ctx, FIELD, e),
        }
    }

    /// Returns a snapshot built from `reference`; the object itself is gone.
    async fn delete_resource(&self, ctx: &Context<'_>, reference: ResourceReferenceInput) -> Option<Resource> {
        const FIELD: &str = "deleteResource";
        let (bridge, rc) = match scope(ctx) {
            Ok(s) => s,
            Err(e) => return report(ctx, FIELD, e),
        };
        match bridge.mutations().delete(rc, &ResourceReference::from(reference)).await {
            Ok(r) => Some(r),
            Err(e) => report(ctx, FIELD, e),
        }
    }
}
