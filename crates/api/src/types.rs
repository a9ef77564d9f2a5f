//! Public GraphQL types and remodelling of backend objects into them.

use async_graphql::{ComplexObject, Context, InputObject, Json, SimpleObject, ID};
use chrono::{DateTime, Utc};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition as CrdDoc;
use kubeql_core::{
    pick_version, BridgeError, Connection, DecodeError, DynObject, ErrorKind, NodeOrder, Patch, ResourceKindDescriptor,
    ResourceReference, VersionDecl,
};
use serde_json::Value;

use crate::schema::{report, scope};

/// A dynamic object as seen by callers.
#[derive(Debug, Clone, SimpleObject)]
pub struct Resource {
    pub id: ID,
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub uid: Option<String>,
    pub resource_version: Option<String>,
    pub created_at: Option<String>,
    pub spec: Option<Json<Value>>,
    pub status: Option<Json<Value>>,
    /// Serialized JSON of the whole object.
    pub raw: String,
    #[graphql(skip)]
    pub created: Option<DateTime<Utc>>,
}

impl Resource {
    pub fn remodel(obj: &DynObject) -> Result<Self, BridgeError> {
        let name = obj
            .name()
            .ok_or_else(|| BridgeError::new(ErrorKind::Remodel, DecodeError::MissingField("metadata.name")))?
            .to_string();
        let raw = obj.to_json().map_err(|e| BridgeError::new(ErrorKind::Remodel, e))?;
        let namespace = obj.namespace().map(str::to_string);
        let id = match obj.uid() {
            Some(uid) => uid.to_string(),
            None => format!("{}/{}/{}/{}", obj.api_version(), obj.kind(), namespace.as_deref().unwrap_or(""), name),
        };
        let created = obj.creation_timestamp();
        Ok(Self {
            id: ID(id),
            api_version: obj.api_version().to_string(),
            kind: obj.kind().to_string(),
            namespace,
            name,
            uid: obj.uid().map(str::to_string),
            resource_version: obj.resource_version().map(str::to_string),
            created_at: created.map(|t| t.to_rfc3339()),
            spec: obj.spec().cloned().map(Json),
            status: obj.status().cloned().map(Json),
            raw,
            created,
        })
    }
}

impl NodeOrder for Resource {
    fn created(&self) -> Option<DateTime<Utc>> { self.created }
    fn namespace(&self) -> Option<&str> { self.namespace.as_deref() }
    fn name(&self) -> &str { &self.name }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct CrdVersion {
    pub name: String,
    pub served: bool,
    pub referenceable: bool,
}

impl From<&VersionDecl> for CrdVersion {
    fn from(v: &VersionDecl) -> Self { Self { name: v.name.clone(), served: v.served, referenceable: v.referenceable } }
}

/// A custom resource definition and the kind it declares.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct CustomResourceDefinition {
    pub name: String,
    pub group: String,
    pub kind: String,
    pub list_kind: Option<String>,
    pub plural: String,
    pub namespaced: bool,
    pub versions: Vec<CrdVersion>,
    pub created_at: Option<String>,
    #[graphql(skip)]
    pub descriptor: ResourceKindDescriptor,
    #[graphql(skip)]
    pub created: Option<DateTime<Utc>>,
}

pub const CRD_GROUP: &str = "apiextensions.k8s.io";
pub const CRD_VERSION: &str = "v1";
pub const CRD_KIND: &str = "CustomResourceDefinition";

impl CustomResourceDefinition {
    /// Descriptor used to list CRDs themselves.
    pub fn meta_descriptor() -> ResourceKindDescriptor {
        ResourceKindDescriptor {
            group: CRD_GROUP.into(),
            kind: CRD_KIND.into(),
            list_kind: None,
            plural: Some("customresourcedefinitions".into()),
            namespaced: false,
            versions: vec![VersionDecl { name: CRD_VERSION.into(), served: true, referenceable: true }],
        }
    }

    pub fn reference(name: &str) -> ResourceReference {
        ResourceReference { api_version: format!("{}/{}", CRD_GROUP, CRD_VERSION), kind: CRD_KIND.into(), namespace: None, name: name.into() }
    }

    pub fn remodel(obj: &DynObject) -> Result<Self, BridgeError> {
        let created = obj.creation_timestamp();
        let doc: CrdDoc = serde_json::from_value(obj.to_value()).map_err(|e| BridgeError::new(ErrorKind::Remodel, DecodeError::Json(e)))?;
        let name = doc
            .metadata
            .name
            .ok_or_else(|| BridgeError::new(ErrorKind::Remodel, DecodeError::MissingField("metadata.name")))?;
        let spec = doc.spec;
        let versions: Vec<VersionDecl> = spec
            .versions
            .iter()
            .map(|v| VersionDecl { name: v.name.clone(), served: v.served, referenceable: v.storage })
            .collect();
        let descriptor = ResourceKindDescriptor {
            group: spec.group.clone(),
            kind: spec.names.kind.clone(),
            list_kind: spec.names.list_kind.clone(),
            plural: Some(spec.names.plural.clone()),
            namespaced: spec.scope == "Namespaced",
            versions,
        };
        Ok(Self {
            name,
            group: spec.group,
            kind: spec.names.kind,
            list_kind: spec.names.list_kind,
            plural: spec.names.plural,
            namespaced: descriptor.namespaced,
            versions: descriptor.versions.iter().map(CrdVersion::from).collect(),
            created_at: created.map(|t| t.to_rfc3339()),
            descriptor,
            created,
        })
    }
}

#[ComplexObject]
impl CustomResourceDefinition {
    /// Version read paths target when the caller does not pick one.
    async fn referenceable_version(&self) -> String { pick_version(&self.descriptor.versions) }

    /// Objects of this kind. An explicit `version` is used as given.
    async fn resources(
        &self,
        ctx: &Context<'_>,
        version: Option<String>,
        namespace: Option<String>,
    ) -> Option<ResourceConnection> {
        let (bridge, rc) = match scope(ctx) {
            Ok(s) => s,
            Err(e) => return report(ctx, "resources", e),
        };
        match bridge.connections().resources(rc, &self.descriptor, version.as_deref(), namespace.as_deref()).await {
            Ok(c) => Some(c.into()),
            Err(e) => report(ctx, "resources", e),
        }
    }
}

impl NodeOrder for CustomResourceDefinition {
    fn created(&self) -> Option<DateTime<Utc>> { self.created }
    fn namespace(&self) -> Option<&str> { None }
    fn name(&self) -> &str { &self.name }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct ResourceConnection {
    pub nodes: Vec<Resource>,
    pub total_count: i64,
}

impl From<Connection<Resource>> for ResourceConnection {
    fn from(c: Connection<Resource>) -> Self { Self { nodes: c.nodes, total_count: c.total_count as i64 } }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct CrdConnection {
    pub nodes: Vec<CustomResourceDefinition>,
    pub total_count: i64,
}

impl From<Connection<CustomResourceDefinition>> for CrdConnection {
    fn from(c: Connection<CustomResourceDefinition>) -> Self { Self { nodes: c.nodes, total_count: c.total_count as i64 } }
}

/// Set the raw JSON `value` at `fieldPath`.
#[derive(Debug, Clone, InputObject)]
pub struct PatchInput {
    pub field_path: String,
    pub value: String,
}

impl From<PatchInput> for Patch {
    fn from(p: PatchInput) -> Self { Patch { field_path: p.field_path, value: p.value } }
}

#[derive(Debug, Clone, InputObject)]
pub struct ResourceReferenceInput {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl From<ResourceReferenceInput> for ResourceReference {
    fn from(r: ResourceReferenceInput) -> Self {
        ResourceReference { api_version: r.api_version, kind: r.kind, namespace: r.namespace.filter(|ns| !ns.is_empty()), name: r.name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crd(list_kind: Option<&str>) -> DynObject {
        let mut names = json!({"kind": "Widget", "plural": "widgets", "singular": "widget"});
        if let Some(lk) = list_kind {
            names["listKind"] = json!(lk);
        }
        DynObject::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "widgets.example.io", "creationTimestamp": "2024-01-01T00:00:00Z"},
            "spec": {
                "group": "example.io",
                "names": names,
                "scope": "Namespaced",
                "versions": [
                    {"name": "v1alpha1", "served": true, "storage": false},
                    {"name": "v1", "served": true, "storage": true}
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn remodels_crd_into_descriptor() {
        let c = CustomResourceDefinition::remodel(&crd(Some("Widgets"))).unwrap();
        assert_eq!(c.name, "widgets.example.io");
        assert_eq!(c.descriptor.group, "example.io");
        assert_eq!(c.descriptor.list_kind.as_deref(), Some("Widgets"));
        assert_eq!(c.descriptor.plural.as_deref(), Some("widgets"));
        assert!(c.namespaced);
        assert_eq!(c.versions.iter().map(|v| (v.name.as_str(), v.referenceable)).collect::<Vec<_>>(), vec![("v1alpha1", false), ("v1", true)]);
    }

    #[test]
    fn malformed_crd_is_a_remodel_error() {
        let bad = DynObject::from_value(json!({"apiVersion": "apiextensions.k8s.io/v1", "kind": "CustomResourceDefinition", "metadata": {"name": "x"}, "spec": {"group": 3}})).unwrap();
        let err = CustomResourceDefinition::remodel(&bad).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Remodel);
    }

    #[test]
    fn remodels_resource() {
        let obj = DynObject::from_value(json!({
            "apiVersion": "example.io/v1", "kind": "Widget",
            "metadata": {"name": "w", "namespace": "ns", "uid": "u-1", "resourceVersion": "7"},
            "spec": {"size": 1}, "status": {"ready": true}
        }))
        .unwrap();
        let r = Resource::remodel(&obj).unwrap();
        assert_eq!(r.id, ID("u-1".into()));
        assert_eq!(r.resource_version.as_deref(), Some("7"));
        assert_eq!(r.spec.map(|j| j.0), Some(json!({"size": 1})));
        assert!(r.raw.contains("\"ready\":true"));
    }

    #[test]
    fn resource_without_name_fails_remodel() {
        let obj = DynObject::from_value(json!({"apiVersion": "v1", "kind": "ConfigMap"})).unwrap();
        assert_eq!(Resource::remodel(&obj).unwrap_err().kind, ErrorKind::Remodel);
    }
}
