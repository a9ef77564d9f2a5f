//! kubeql apply: in-memory field-path patching of dynamic documents.
//!
//! Patches are resolved fully before anything reaches the backend. The first failing
//! patch aborts the whole batch and the partially patched document is dropped.

#![forbid(unsafe_code)]

use kubeql_core::{BridgeError, DecodeError, DynObject, ErrorKind, Patch};
use metrics::counter;
use serde_json::Value as Json;
use tracing::debug;

pub mod path;

pub use path::{FieldPath, Target};

/// Decode a raw patch payload into the shape its target field expects.
pub fn decode_value(raw: &str, target: Target) -> Result<Json, DecodeError> {
    let v: Json = serde_json::from_str(raw)?;
    match target {
        Target::Any => Ok(v),
        Target::Str => match v {
            Json::String(_) => Ok(v),
            _ => Err(DecodeError::WrongType { field: "value".into(), expected: "string" }),
        },
        Target::StrMap => match &v {
            Json::Object(map) if map.values().all(|x| x.is_string()) => Ok(v),
            _ => Err(DecodeError::WrongType { field: "value".into(), expected: "map of strings" }),
        },
    }
}

/// Apply `patches` to `doc` in caller order; a later patch on the same path wins.
///
/// Errors carry the 0-based index of the failing patch: `Unmarshal` for payloads and for
/// patches that break the document shape, `PatchPath` for paths that are invalid or cannot
/// be set on this document.
pub fn apply_patches(mut doc: DynObject, patches: &[Patch]) -> Result<DynObject, BridgeError> {
    for (i, p) in patches.iter().enumerate() {
        let path = FieldPath::parse(&p.field_path).map_err(|e| {
            counter!("kubeql_patch_failures", 1u64);
            BridgeError::patch(ErrorKind::PatchPath, i, e)
        })?;
        let value = decode_value(&p.value, path.target()).map_err(|e| {
            counter!("kubeql_patch_failures", 1u64);
            BridgeError::patch(ErrorKind::Unmarshal, i, e)
        })?;
        doc.set_at(path.segments(), value).map_err(|e| BridgeError::patch(ErrorKind::PatchPath, i, e))?;
        doc.validate().map_err(|e| {
            counter!("kubeql_patch_failures", 1u64);
            BridgeError::patch(ErrorKind::Unmarshal, i, e)
        })?;
        debug!(index = i, path = %p.field_path, "patch applied");
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeql_core::{Cause, PathError};
    use serde_json::json;

    fn doc() -> DynObject {
        DynObject::from_value(json!({
            "apiVersion": "example.io/v1",
            "kind": "Widget",
            "metadata": {"name": "w", "labels": {"app": "x"}},
            "spec": {"size": 1, "items": ["a"]}
        }))
        .unwrap()
    }

    #[test]
    fn last_writer_wins() {
        let out = apply_patches(doc(), &[Patch::new("a", "1"), Patch::new("a", "2")]).unwrap();
        assert_eq!(out.get("a"), Some(&json!(2)));
    }

    #[test]
    fn nested_and_indexed_patches() {
        let out = apply_patches(
            doc(),
            &[
                Patch::new("spec.size", "3"),
                Patch::new("spec.items[1]", "\"b\""),
                Patch::new("spec.template.replicas", "{\"min\": 1}"),
                Patch::new("metadata.labels.tier", "\"web\""),
            ],
        )
        .unwrap();
        assert_eq!(out.spec(), Some(&json!({"size": 3, "items": ["a", "b"], "template": {"replicas": {"min": 1}}})));
        assert_eq!(out.get("metadata").and_then(|m| m.get("labels")), Some(&json!({"app": "x", "tier": "web"})));
    }

    #[test]
    fn invalid_path_reports_patch_index() {
        let err = apply_patches(doc(), &[Patch::new("spec.size", "2"), Patch::new("spec..size", "3")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PatchPath);
        assert_eq!(err.patch_index, Some(1));
        assert!(matches!(err.cause, Cause::Path(PathError::EmptySegment { position: 1 })));
        assert!(err.to_string().contains("patch 1"));
    }

    #[test]
    fn undecodable_payload_reports_unmarshal() {
        let err = apply_patches(doc(), &[Patch::new("spec.size", "{oops")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unmarshal);
        assert_eq!(err.patch_index, Some(0));
    }

    #[test]
    fn known_typed_fields_require_strings() {
        let err = apply_patches(doc(), &[Patch::new("metadata.name", "42")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unmarshal);
        let err = apply_patches(doc(), &[Patch::new("metadata.labels", "{\"a\": 1}")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unmarshal);
        let out = apply_patches(doc(), &[Patch::new("metadata.labels", "{\"a\": \"1\"}")]).unwrap();
        assert_eq!(out.get("metadata").and_then(|m| m.get("labels")), Some(&json!({"a": "1"})));
    }

    #[test]
    fn setting_through_scalar_fails_and_stops() {
        let err = apply_patches(doc(), &[Patch::new("spec.size.inner", "1"), Patch::new("spec..x", "1")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PatchPath);
        assert_eq!(err.patch_index, Some(0));
    }

    #[test]
    fn shape_breaking_patch_reports_its_index() {
        for (path, value) in [("metadata", "\"oops\""), ("metadata", "null"), ("metadata", "[1]")] {
            let err = apply_patches(doc(), &[Patch::new("spec.x", "1"), Patch::new(path, value), Patch::new("spec.y", "2")]).unwrap_err();
            assert_eq!((err.kind, err.patch_index), (ErrorKind::Unmarshal, Some(1)), "{path} = {value}");
            assert!(matches!(err.cause, Cause::Decode(DecodeError::WrongType { .. })), "{path} = {value}");
        }
    }

    #[test]
    fn no_patches_is_identity() {
        assert_eq!(apply_patches(doc(), &[]).unwrap(), doc());
    }
}
