//! kubeql core types: resource model, dynamic documents, version selection and errors.

#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod object;
pub mod version;

pub use error::{BackendError, BridgeError, Cause, DecodeError, ErrorKind, PathError};
pub use model::{
    ClientOptions, Connection, Credential, Identity, NodeOrder, Patch, ResourceKindDescriptor,
    ResourceReference, VersionDecl,
};
pub use object::{DynObject, PathSegment};
pub use version::{list_kind_name, pick_version, resolve_version};
