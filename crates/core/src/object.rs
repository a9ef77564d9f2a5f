//! Dynamic objects: a validated wrapper over an untyped JSON document.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{DecodeError, PathError};
use crate::model::ResourceReference;

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// An untyped object document. Always a JSON object with string `apiVersion` and `kind`.
#[derive(Debug, Clone, PartialEq)]
pub struct DynObject {
    doc: Map<String, Value>,
}

impl DynObject {
    pub fn from_slice(raw: &[u8]) -> Result<Self, DecodeError> {
        let v: Value = serde_json::from_slice(raw)?;
        Self::from_value(v)
    }

    pub fn from_value(v: Value) -> Result<Self, DecodeError> {
        match v {
            Value::Object(doc) => {
                let obj = Self { doc };
                obj.validate()?;
                Ok(obj)
            }
            _ => Err(DecodeError::NotAnObject),
        }
    }

    /// Minimal document carrying only the identifying fields of `reference`.
    pub fn from_reference(reference: &ResourceReference) -> Self {
        let mut meta = Map::new();
        meta.insert("name".into(), Value::String(reference.name.clone()));
        if let Some(ns) = &reference.namespace {
            meta.insert("namespace".into(), Value::String(ns.clone()));
        }
        let mut doc = Map::new();
        doc.insert("apiVersion".into(), Value::String(reference.api_version.clone()));
        doc.insert("kind".into(), Value::String(reference.kind.clone()));
        doc.insert("metadata".into(), Value::Object(meta));
        Self { doc }
    }

    /// Re-check the shape invariants, e.g. after in-place edits.
    pub fn validate(&self) -> Result<(), DecodeError> {
        for field in ["apiVersion", "kind"] {
            match self.doc.get(field) {
                Some(Value::String(_)) => {}
                Some(_) => return Err(DecodeError::WrongType { field: field.to_string(), expected: "string" }),
                None => return Err(DecodeError::MissingField(field)),
            }
        }
        if let Some(meta) = self.doc.get("metadata") {
            if !meta.is_object() {
                return Err(DecodeError::WrongType { field: "metadata".into(), expected: "object" });
            }
        }
        Ok(())
    }

    pub fn api_version(&self) -> &str { self.str_field("apiVersion").unwrap_or_default() }
    pub fn kind(&self) -> &str { self.str_field("kind").unwrap_or_default() }

    pub fn name(&self) -> Option<&str> { self.meta_str("name") }
    pub fn namespace(&self) -> Option<&str> { self.meta_str("namespace") }
    pub fn uid(&self) -> Option<&str> { self.meta_str("uid") }
    pub fn resource_version(&self) -> Option<&str> { self.meta_str("resourceVersion") }

    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.meta_str("creationTimestamp")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn spec(&self) -> Option<&Value> { self.doc.get("spec") }
    pub fn status(&self) -> Option<&Value> { self.doc.get("status") }

    pub fn get(&self, key: &str) -> Option<&Value> { self.doc.get(key) }

    /// Raw serialized form.
    pub fn to_json(&self) -> Result<String, DecodeError> { Ok(serde_json::to_string(&self.doc)?) }

    pub fn as_map(&self) -> &Map<String, Value> { &self.doc }

    pub fn into_value(self) -> Value { Value::Object(self.doc) }

    pub fn to_value(&self) -> Value { Value::Object(self.doc.clone()) }

    /// Fill `apiVersion`/`kind` when absent (list items of built-in kinds omit them).
    pub fn with_default_types(mut v: Value, api_version: &str, kind: &str) -> Result<Self, DecodeError> {
        if let Value::Object(map) = &mut v {
            map.entry("apiVersion").or_insert_with(|| Value::String(api_version.to_string()));
            map.entry("kind").or_insert_with(|| Value::String(kind.to_string()));
        }
        Self::from_value(v)
    }

    /// Set `value` at `path`, creating missing intermediate objects.
    ///
    /// An index equal to the array length appends.
    pub fn set_at(&mut self, path: &[PathSegment], value: Value) -> Result<(), PathError> {
        let (first, rest) = match path.split_first() {
            Some((PathSegment::Key(k), rest)) => (k, rest),
            Some((PathSegment::Index(_), _)) => return Err(PathError::NotAnArray { at: String::new() }),
            None => return Err(PathError::Empty),
        };
        let slot = self.doc.entry(first.clone()).or_insert(Value::Null);
        set_in(slot, rest, value, first.clone())
    }

    fn str_field(&self, key: &str) -> Option<&str> { self.doc.get(key).and_then(|v| v.as_str()) }

    fn meta_str(&self, key: &str) -> Option<&str> {
        self.doc.get("metadata").and_then(|m| m.get(key)).and_then(|v| v.as_str())
    }
}

fn set_in(slot: &mut Value, path: &[PathSegment], value: Value, at: String) -> Result<(), PathError> {
    let Some((seg, rest)) = path.split_first() else {
        *slot = value;
        return Ok(());
    };
    match seg {
        PathSegment::Key(k) => {
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            let map = slot.as_object_mut().ok_or_else(|| PathError::NotAnObject { at: at.clone() })?;
            let next = map.entry(k.clone()).or_insert(Value::Null);
            set_in(next, rest, value, format!("{}.{}", at, k))
        }
        PathSegment::Index(i) => {
            let arr = slot.as_array_mut().ok_or_else(|| PathError::NotAnArray { at: at.clone() })?;
            let len = arr.len();
            if *i == len {
                arr.push(Value::Null);
            } else if *i > len {
                return Err(PathError::IndexOutOfRange { at, index: *i, len });
            }
            set_in(&mut arr[*i], rest, value, format!("{}[{}]", at, i))
        }
    }
}
