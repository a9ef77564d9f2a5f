use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A declared API version of a dynamic kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionDecl {
    pub name: String,
    pub served: bool,
    /// Version other objects should reference by default (CRD `storage`).
    pub referenceable: bool,
}

/// Describes a dynamic kind and the versions it declares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceKindDescriptor {
    pub group: String,
    pub kind: String,
    pub list_kind: Option<String>,
    pub plural: Option<String>,
    pub namespaced: bool,
    pub versions: Vec<VersionDecl>,
}

impl ResourceKindDescriptor {
    pub fn api_version(&self, version: &str) -> String {
        if self.group.is_empty() { version.to_string() } else { format!("{}/{}", self.group, version) }
    }
}

/// Identifies an existing dynamic object for get/update/delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceReference {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceReference {
    /// Group part of `apiVersion`; empty for the core group (`v1`).
    pub fn group(&self) -> &str {
        match self.api_version.rsplit_once('/') {
            Some((g, _)) => g,
            None => "",
        }
    }

    pub fn version(&self) -> &str {
        match self.api_version.rsplit_once('/') {
            Some((_, v)) => v,
            None => &self.api_version,
        }
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} {}/{}", self.api_version, self.kind, ns, self.name),
            None => write!(f, "{}/{} {}", self.api_version, self.kind, self.name),
        }
    }
}

/// Field-path patch: `value` is raw JSON decoded when applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Patch {
    pub field_path: String,
    pub value: String,
}

impl Patch {
    pub fn new(field_path: impl Into<String>, value: impl Into<String>) -> Self {
        Self { field_path: field_path.into(), value: value.into() }
    }
}

/// Ordered node sequence plus the number of items the producing list call returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection<T> {
    pub nodes: Vec<T>,
    pub total_count: usize,
}

/// Sort key for connection nodes: creation time, then namespace, then name.
pub trait NodeOrder {
    fn created(&self) -> Option<DateTime<Utc>>;
    fn namespace(&self) -> Option<&str>;
    fn name(&self) -> &str;
}

impl<T: NodeOrder> Connection<T> {
    /// Order nodes deterministically and count them.
    pub fn ordered(mut nodes: Vec<T>) -> Self {
        nodes.sort_by(|a, b| {
            a.created()
                .cmp(&b.created())
                .then_with(|| a.namespace().cmp(&b.namespace()))
                .then_with(|| a.name().cmp(b.name()))
        });
        let total_count = nodes.len();
        Self { nodes, total_count }
    }
}

impl<T> Default for Connection<T> {
    fn default() -> Self { Self { nodes: Vec::new(), total_count: 0 } }
}

/// Caller credential presented to the backend.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Credential {
    Bearer(String),
    Impersonate { user: String, groups: Vec<String> },
}

/// Opaque caller identity. Used as cache key and client input, never persisted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub credential: Credential,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self { credential: Credential::Bearer(token.into()), expires_at: None }
    }

    pub fn impersonate(user: impl Into<String>, groups: Vec<String>) -> Self {
        Self { credential: Credential::Impersonate { user: user.into(), groups }, expires_at: None }
    }

    pub fn with_expiry(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    pub fn is_expired(&self) -> bool { self.is_expired_at(Utc::now()) }

    pub fn is_blank(&self) -> bool {
        match &self.credential {
            Credential::Bearer(t) => t.trim().is_empty(),
            Credential::Impersonate { user, .. } => user.trim().is_empty(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.credential {
            Credential::Bearer(_) => f.debug_struct("Identity").field("bearer", &"<redacted>").field("expires_at", &self.expires_at).finish(),
            Credential::Impersonate { user, groups } => f
                .debug_struct("Identity")
                .field("user", user)
                .field("groups", groups)
                .field("expires_at", &self.expires_at)
                .finish(),
        }
    }
}

/// Extra scoping applied to a cached client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Restrict every call of the client to this namespace.
    pub namespace: Option<String>,
}

impl ClientOptions {
    pub fn namespaced(ns: impl Into<String>) -> Self { Self { namespace: Some(ns.into()) }.normalized() }

    pub fn normalized(self) -> Self {
        Self { namespace: self.namespace.filter(|ns| !ns.trim().is_empty()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct N(Option<i64>, Option<&'static str>, &'static str);

    impl NodeOrder for N {
        fn created(&self) -> Option<DateTime<Utc>> { self.0.and_then(|s| DateTime::from_timestamp(s, 0)) }
        fn namespace(&self) -> Option<&str> { self.1 }
        fn name(&self) -> &str { self.2 }
    }

    #[test]
    fn connection_orders_by_creation_then_namespace_then_name() {
        let c = Connection::ordered(vec![
            N(Some(20), Some("b"), "x"),
            N(Some(10), Some("b"), "z"),
            N(Some(20), Some("a"), "y"),
            N(Some(20), Some("a"), "w"),
            N(None, None, "early"),
        ]);
        let names: Vec<_> = c.nodes.iter().map(|n| n.2).collect();
        assert_eq!(names, vec!["early", "z", "w", "y", "x"]);
        assert_eq!(c.total_count, 5);
    }

    #[test]
    fn reference_splits_api_version() {
        let r = ResourceReference { api_version: "example.io/v1".into(), kind: "Widget".into(), namespace: None, name: "w".into() };
        assert_eq!(r.group(), "example.io");
        assert_eq!(r.version(), "v1");
        let core = ResourceReference { api_version: "v1".into(), ..r };
        assert_eq!(core.group(), "");
        assert_eq!(core.version(), "v1");
    }

    #[test]
    fn identity_debug_redacts_token() {
        let s = format!("{:?}", Identity::bearer("s3cr3t"));
        assert!(!s.contains("s3cr3t"));
    }

    #[test]
    fn identity_expiry() {
        let now = Utc::now();
        let id = Identity::bearer("t").with_expiry(now);
        assert!(id.is_expired_at(now));
        assert!(!Identity::bearer("t").is_expired_at(now));
    }

    #[test]
    fn options_normalize_blank_namespace() {
        assert_eq!(ClientOptions { namespace: Some(" ".into()) }.normalized(), ClientOptions::default());
        assert_eq!(ClientOptions::namespaced("team-a").namespace.as_deref(), Some("team-a"));
    }
}
