//! Field path expressions: `spec.template.containers[0].image`.

use kubeql_core::{PathError, PathSegment};

/// Shape a patch payload must decode into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Str,
    StrMap,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let s = expr.strip_prefix('.').unwrap_or(expr);
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = Vec::new();
        for (position, seg) in s.split('.').enumerate() {
            if seg.is_empty() {
                return Err(PathError::EmptySegment { position });
            }
            let (name, mut rest) = match seg.find('[') {
                Some(i) => seg.split_at(i),
                None => (seg, ""),
            };
            if name.is_empty() {
                return Err(PathError::EmptySegment { position });
            }
            if name.contains(']') {
                return Err(PathError::MalformedIndex { segment: seg.to_string() });
            }
            segments.push(PathSegment::Key(name.to_string()));
            while !rest.is_empty() {
                let malformed = || PathError::MalformedIndex { segment: seg.to_string() };
                let inner = rest.strip_prefix('[').ok_or_else(malformed)?;
                let close = inner.find(']').ok_or_else(malformed)?;
                let index = inner[..close].parse::<usize>().map_err(|_| malformed())?;
                segments.push(PathSegment::Index(index));
                rest = &inner[close + 1..];
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] { &self.segments }

    /// Known-typed Kubernetes fields decode to strings or string maps; the rest is free-form.
    pub fn target(&self) -> Target {
        let keys: Vec<&str> = self
            .segments
            .iter()
            .map(|s| match s {
                PathSegment::Key(k) => k.as_str(),
                PathSegment::Index(_) => "",
            })
            .collect();
        match keys.as_slice() {
            ["apiVersion"] | ["kind"] => Target::Str,
            ["metadata", "name" | "namespace" | "generateName"] => Target::Str,
            ["metadata", "labels" | "annotations"] => Target::StrMap,
            ["metadata", "labels" | "annotations", k] if !k.is_empty() => Target::Str,
            _ => Target::Any,
        }
    }
}
