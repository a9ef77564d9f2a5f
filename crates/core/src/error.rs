//! Error taxonomy shared by every crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operation a field resolution failed in. Callers match on this, not on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ClientAcquisition,
    List,
    Get,
    Unmarshal,
    PatchPath,
    Create,
    Update,
    Delete,
    Remodel,
}

impl ErrorKind {
    /// Fixed human-readable prefix for errors of this kind.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::ClientAcquisition => "unable to acquire backend client",
            ErrorKind::List => "unable to list resources",
            ErrorKind::Get => "unable to get resource",
            ErrorKind::Unmarshal => "unable to decode document",
            ErrorKind::PatchPath => "unable to apply patch",
            ErrorKind::Create => "unable to create resource",
            ErrorKind::Update => "unable to update resource",
            ErrorKind::Delete => "unable to delete resource",
            ErrorKind::Remodel => "unable to remodel resource",
        }
    }

    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::ClientAcquisition => "CLIENT_ACQUISITION",
            ErrorKind::List => "LIST",
            ErrorKind::Get => "GET",
            ErrorKind::Unmarshal => "UNMARSHAL",
            ErrorKind::PatchPath => "PATCH_PATH",
            ErrorKind::Create => "CREATE",
            ErrorKind::Update => "UPDATE",
            ErrorKind::Delete => "DELETE",
            ErrorKind::Remodel => "REMODEL",
        }
    }
}

/// Failure reported by the dynamic backend or the client layer in front of it.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("server timeout: {0}")]
    ServerTimeout(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("too many requests: {0}")]
    TooManyRequests(String),
    #[error("status {code} ({reason}): {message}")]
    Status { code: u16, reason: String, message: String },
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("transport: {0}")]
    Transport(String),
}

impl BackendError {
    /// Classify an API status by its reason first, then by HTTP code.
    pub fn from_status(code: u16, reason: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match reason {
            "NotFound" => return BackendError::NotFound(message),
            "Timeout" => return BackendError::Timeout(message),
            "ServerTimeout" => return BackendError::ServerTimeout(message),
            "InternalError" => return BackendError::Internal(message),
            "TooManyRequests" => return BackendError::TooManyRequests(message),
            _ => {}
        }
        match code {
            404 => BackendError::NotFound(message),
            504 => BackendError::Timeout(message),
            500 => BackendError::Internal(message),
            429 => BackendError::TooManyRequests(message),
            _ => BackendError::Status { code, reason: reason.to_string(), message },
        }
    }

    /// Only a confirmed not-found is final; anything uncertain may succeed on retry.
    pub fn is_retriable(&self) -> bool { !matches!(self, BackendError::NotFound(_)) }
}

/// Document or payload decoding failure.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document is not an object")]
    NotAnObject,
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("field {field} must be {expected}")]
    WrongType { field: String, expected: &'static str },
}

/// Structurally invalid field path, or one that cannot be applied to the document.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty field path")]
    Empty,
    #[error("empty segment at position {position}")]
    EmptySegment { position: usize },
    #[error("malformed index in segment {segment:?}")]
    MalformedIndex { segment: String },
    #[error("{at:?} is not an object")]
    NotAnObject { at: String },
    #[error("{at:?} is not an array")]
    NotAnArray { at: String },
    #[error("index {index} out of range at {at:?} (len {len})")]
    IndexOutOfRange { at: String, index: usize, len: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum Cause {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("{0}")]
    Other(String),
}

/// A field-scoped failure: the operation kind, the failing patch if any, and the cause.
#[derive(Debug)]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub patch_index: Option<usize>,
    pub cause: Cause,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, cause: impl Into<Cause>) -> Self {
        Self { kind, patch_index: None, cause: cause.into() }
    }

    pub fn patch(kind: ErrorKind, index: usize, cause: impl Into<Cause>) -> Self {
        Self { kind, patch_index: Some(index), cause: cause.into() }
    }

    pub fn other(kind: ErrorKind, msg: impl Into<String>) -> Self { Self::new(kind, Cause::Other(msg.into())) }

    pub fn backend(&self) -> Option<&BackendError> {
        match &self.cause {
            Cause::Backend(e) => Some(e),
            _ => None,
        }
    }

    /// Non-backend failures count as retriable.
    pub fn is_retriable(&self) -> bool { self.backend().map(BackendError::is_retriable).unwrap_or(true) }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch_index {
            Some(i) => write!(f, "{}: patch {}: {}", self.kind.message(), i, self.cause),
            None => write!(f, "{}: {}", self.kind.message(), self.cause),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { Some(&self.cause) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table() {
        assert!(!BackendError::NotFound("x".into()).is_retriable());
        assert!(BackendError::Timeout("x".into()).is_retriable());
        assert!(BackendError::ServerTimeout("x".into()).is_retriable());
        assert!(BackendError::Internal("x".into()).is_retriable());
        assert!(BackendError::TooManyRequests("x".into()).is_retriable());
        assert!(BackendError::Status { code: 418, reason: "Teapot".into(), message: String::new() }.is_retriable());
        assert!(BackendError::Transport("reset".into()).is_retriable());
    }

    #[test]
    fn status_mapping_prefers_reason() {
        assert!(matches!(BackendError::from_status(404, "NotFound", "m"), BackendError::NotFound(_)));
        assert!(matches!(BackendError::from_status(500, "ServerTimeout", "m"), BackendError::ServerTimeout(_)));
        assert!(matches!(BackendError::from_status(504, "", "m"), BackendError::Timeout(_)));
        assert!(matches!(BackendError::from_status(429, "", "m"), BackendError::TooManyRequests(_)));
        assert!(matches!(BackendError::from_status(500, "", "m"), BackendError::Internal(_)));
        assert!(matches!(BackendError::from_status(409, "AlreadyExists", "m"), BackendError::Status { code: 409, .. }));
    }

    #[test]
    fn bridge_error_retriable_delegates_to_backend() {
        let nf = BridgeError::new(ErrorKind::Get, BackendError::NotFound("w".into()));
        assert!(!nf.is_retriable());
        let generic = BridgeError::other(ErrorKind::Remodel, "boom");
        assert!(generic.is_retriable());
    }

    #[test]
    fn display_carries_prefix_and_patch_index() {
        let e = BridgeError::patch(ErrorKind::PatchPath, 2, PathError::EmptySegment { position: 1 });
        assert_eq!(e.to_string(), "unable to apply patch: patch 2: empty segment at position 1");
        let e = BridgeError::new(ErrorKind::List, BackendError::Timeout("deadline exceeded".into()));
        assert_eq!(e.to_string(), "unable to list resources: timeout: deadline exceeded");
    }
}
