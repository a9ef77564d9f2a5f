//! Target version and list-kind selection for dynamic kinds.

use crate::model::VersionDecl;

/// Pick the declared version a read should target.
///
/// Scans in declaration order, not by semantic version: the first referenceable
/// entry wins, then the first served one. Returns an empty string when neither
/// exists; the backend call that follows is left to fail on its own.
pub fn pick_version(versions: &[VersionDecl]) -> String {
    if let Some(v) = versions.iter().find(|v| v.referenceable) {
        return v.name.clone();
    }
    if let Some(v) = versions.iter().find(|v| v.served) {
        return v.name.clone();
    }
    String::new()
}

/// An explicit caller version is used verbatim, even when undeclared.
pub fn resolve_version(explicit: Option<&str>, versions: &[VersionDecl]) -> String {
    match explicit {
        Some(v) => v.to_string(),
        None => pick_version(versions),
    }
}

/// List type name for a kind: `<Kind>List` unless a non-empty override exists.
pub fn list_kind_name(kind: &str, list_kind: Option<&str>) -> String {
    match list_kind {
        Some(lk) if !lk.is_empty() => lk.to_string(),
        _ => format!("{}List", kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(name: &str, served: bool, referenceable: bool) -> VersionDecl {
        VersionDecl { name: name.into(), served, referenceable }
    }

    #[test]
    fn first_referenceable_wins_in_declaration_order() {
        let versions = vec![v("v1alpha1", true, false), v("v1beta1", true, true), v("v1", true, true)];
        assert_eq!(pick_version(&versions), "v1beta1");
    }

    #[test]
    fn referenceable_beats_earlier_served() {
        let versions = vec![v("v2", true, false), v("v1", false, true)];
        assert_eq!(pick_version(&versions), "v1");
    }

    #[test]
    fn falls_back_to_first_served() {
        let versions = vec![v("v1alpha1", false, false), v("v1beta1", true, false), v("v1", true, false)];
        assert_eq!(pick_version(&versions), "v1beta1");
    }

    #[test]
    fn nothing_usable_yields_empty() {
        assert_eq!(pick_version(&[]), "");
        assert_eq!(pick_version(&[v("v1", false, false)]), "");
    }

    #[test]
    fn explicit_version_bypasses_selection() {
        let versions = vec![v("v1", true, true)];
        assert_eq!(resolve_version(Some("v9"), &versions), "v9");
        assert_eq!(resolve_version(None, &versions), "v1");
    }

    #[test]
    fn list_kind_defaults_and_overrides() {
        assert_eq!(list_kind_name("Example", None), "ExampleList");
        assert_eq!(list_kind_name("Example", Some("")), "ExampleList");
        assert_eq!(list_kind_name("Example", Some("Examples")), "Examples");
    }
}
