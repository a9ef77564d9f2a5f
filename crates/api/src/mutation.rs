//! Create, update and delete of dynamic objects.
//!
//! Documents are decoded and patched before a client is acquired, so a bad document
//! or patch never reaches the backend.

use std::time::Instant;

use kubeql_apply::apply_patches;
use kubeql_core::{BridgeError, DynObject, ErrorKind, Patch, ResourceReference};
use kubeql_kubehub::RequestContext;
use tracing::info;

use crate::types::Resource;
use crate::Bridge;

/// Decode `raw` and apply `patches` in order.
pub fn prepare(raw: &str, patches: &[Patch]) -> Result<DynObject, BridgeError> {
    let doc = DynObject::from_slice(raw.as_bytes()).map_err(|e| BridgeError::new(ErrorKind::Unmarshal, e))?;
    apply_patches(doc, patches)
}

pub struct MutationExecutor<'a> {
    bridge: &'a Bridge,
}

impl<'a> MutationExecutor<'a> {
    pub(crate) fn new(bridge: &'a Bridge) -> Self { Self { bridge } }

    pub async fn create(&self, rc: &RequestContext, raw: &str, patches: &[Patch]) -> Result<Resource, BridgeError> {
        let doc = prepare(raw, patches)?;
        let client = self.bridge.client(rc).await?;
        let t0 = Instant::now();
        let created = rc
            .bounded(self.bridge.config().call_timeout, "create", client.create(&doc))
            .await
            .map_err(|e| BridgeError::new(ErrorKind::Create, e))?;
        info!(kind = %created.kind(), name = created.name().unwrap_or_default(), patches = patches.len(), took_ms = t0.elapsed().as_millis() as u64, "mutation: created");
        Resource::remodel(&created)
    }

    /// Replace the object at `reference` with the patched document.
    pub async fn update(&self, rc: &RequestContext, reference: &ResourceReference, raw: &str, patches: &[Patch]) -> Result<Resource, BridgeError> {
        let doc = prepare(raw, patches)?;
        let client = self.bridge.client(rc).await?;
        let t0 = Instant::now();
        let updated = rc
            .bounded(self.bridge.config().call_timeout, "update", client.update(reference, &doc))
            .await
            .map_err(|e| BridgeError::new(ErrorKind::Update, e))?;
        info!(reference = %reference, patches = patches.len(), took_ms = t0.elapsed().as_millis() as u64, "mutation: updated");
        Resource::remodel(&updated)
    }

    /// Delete the object at `reference` and return a snapshot built from the reference.
    pub async fn delete(&self, rc: &RequestContext, reference: &ResourceReference) -> Result<Resource, BridgeError> {
        let client = self.bridge.client(rc).await?;
        let snapshot = Resource::remodel(&DynObject::from_reference(reference))?;
        let t0 = Instant::now();
        rc.bounded(self.bridge.config().call_timeout, "delete", client.delete(reference))
            .await
            .map_err(|e| BridgeError::new(ErrorKind::Delete, e))?;
        info!(reference = %reference, took_ms = t0.elapsed().as_millis() as u64, "mutation: deleted");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prepare_rejects_non_documents() {
        assert_eq!(prepare("[1, 2]", &[]).unwrap_err().kind, ErrorKind::Unmarshal);
        assert_eq!(prepare("{not json", &[]).unwrap_err().kind, ErrorKind::Unmarshal);
    }

    #[test]
    fn prepare_applies_patches_in_order() {
        let raw = r#"{"apiVersion":"example.io/v1","kind":"Widget","metadata":{"name":"w"}}"#;
        let doc = prepare(raw, &[Patch::new("spec.size", "1"), Patch::new("spec.size", "5")]).unwrap();
        assert_eq!(doc.spec(), Some(&json!({"size": 5})));
    }

    #[test]
    fn prepare_reports_failing_patch() {
        let raw = r#"{"apiVersion":"example.io/v1","kind":"Widget","metadata":{"name":"w"}}"#;
        let err = prepare(raw, &[Patch::new("spec.size", "1"), Patch::new("metadata.name", "7")]).unwrap_err();
        assert_eq!((err.kind, err.patch_index), (ErrorKind::Unmarshal, Some(1)));
    }
}
