//! In-memory backend for tests and offline runs.
//!
//! Every client built by [`MockFactory`] shares one [`MockBackend`] store, records the
//! calls it receives, and can be told to fail a given operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat};
use kubeql_core::{BackendError, ClientOptions, DynObject, Identity, PathSegment, ResourceReference};
use serde_json::Value;

use crate::{ClientFactory, DynamicClient, ListRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(ListRequest),
    Get(ResourceReference),
    Create(DynObject),
    Update(ResourceReference, DynObject),
    Delete(ResourceReference),
}

#[derive(Default)]
struct Inner {
    objects: Vec<DynObject>,
    calls: Vec<Call>,
    failures: HashMap<Op, BackendError>,
    seq: u64,
    delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<Inner>>,
}

fn matches_ref(o: &DynObject, r: &ResourceReference) -> bool {
    o.api_version() == r.api_version && o.kind() == r.kind && o.namespace() == r.namespace.as_deref() && o.name() == Some(r.name.as_str())
}

fn key(k: &str) -> PathSegment { PathSegment::Key(k.to_string()) }

fn set_meta(o: &mut DynObject, field: &str, value: Value) {
    // metadata is validated to be an object (or absent) so this cannot fail
    let _ = o.set_at(&[key("metadata"), key(field)], value);
}

impl MockBackend {
    fn lock(&self) -> MutexGuard<'_, Inner> { self.inner.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Store an object as-is.
    pub fn insert(&self, obj: DynObject) { self.lock().objects.push(obj); }

    pub fn objects(&self) -> Vec<DynObject> { self.lock().objects.clone() }

    pub fn calls(&self) -> Vec<Call> { self.lock().calls.clone() }

    pub fn call_count(&self) -> usize { self.lock().calls.len() }

    /// Make every subsequent call of `op` fail with `err`.
    pub fn fail(&self, op: Op, err: BackendError) { self.lock().failures.insert(op, err); }

    pub fn clear_failures(&self) { self.lock().failures.clear(); }

    /// Delay every call, e.g. to exercise deadlines.
    pub fn set_delay(&self, delay: Option<Duration>) { self.lock().delay = delay; }

    async fn enter(&self, op: Op, call: Call) -> Result<(), BackendError> {
        let (delay, failure) = {
            let mut inner = self.lock();
            inner.calls.push(call);
            (inner.delay, inner.failures.get(&op).cloned())
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Client view of a [`MockBackend`], optionally restricted to one namespace.
pub struct MockClient {
    backend: MockBackend,
    restrict: Option<String>,
}

impl MockClient {
    pub fn new(backend: MockBackend, restrict: Option<String>) -> Self { Self { backend, restrict } }

    fn check_ns(&self, ns: Option<&str>) -> Result<(), BackendError> {
        match (&self.restrict, ns) {
            (Some(r), Some(n)) if r == n => Ok(()),
            (Some(r), _) => Err(BackendError::Status { code: 403, reason: "Forbidden".into(), message: format!("restricted to namespace {}", r) }),
            (None, _) => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl DynamicClient for MockClient {
    async fn list(&self, req: &ListRequest) -> Result<Vec<DynObject>, BackendError> {
        self.backend.enter(Op::List, Call::List(req.clone())).await?;
        let ns = match (&self.restrict, &req.namespace) {
            (Some(r), None) => Some(r.clone()),
            (_, n) => n.clone(),
        };
        self.check_ns(ns.as_deref())?;
        let api_version = req.api_version();
        let inner = self.backend.lock();
        Ok(inner
            .objects
            .iter()
            .filter(|o| o.api_version() == api_version && o.kind() == req.kind)
            .filter(|o| ns.is_none() || o.namespace() == ns.as_deref())
            .cloned()
            .collect())
    }

    async fn get(&self, reference: &ResourceReference) -> Result<DynObject, BackendError> {
        self.backend.enter(Op::Get, Call::Get(reference.clone())).await?;
        self.check_ns(reference.namespace.as_deref())?;
        let inner = self.backend.lock();
        inner
            .objects
            .iter()
            .find(|o| matches_ref(o, reference))
            .cloned()
            .ok_or_else(|| BackendError::NotFound(reference.to_string()))
    }

    async fn create(&self, obj: &DynObject) -> Result<DynObject, BackendError> {
        self.backend.enter(Op::Create, Call::Create(obj.clone())).await?;
        self.check_ns(obj.namespace())?;
        let mut inner = self.backend.lock();
        inner.seq += 1;
        let seq = inner.seq;
        let mut stored = obj.clone();
        let name = match stored.name() {
            Some(n) => n.to_string(),
            None => {
                let prefix = stored.get("metadata").and_then(|m| m.get("generateName")).and_then(|v| v.as_str()).unwrap_or("obj-").to_string();
                let n = format!("{}{}", prefix, seq);
                set_meta(&mut stored, "name", Value::String(n.clone()));
                n
            }
        };
        let exists = inner
            .objects
            .iter()
            .any(|o| o.api_version() == stored.api_version() && o.kind() == stored.kind() && o.namespace() == stored.namespace() && o.name() == Some(name.as_str()));
        if exists {
            return Err(BackendError::Status { code: 409, reason: "AlreadyExists".into(), message: format!("{} already exists", name) });
        }
        let created = DateTime::from_timestamp(1_704_067_200 + seq as i64, 0)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        set_meta(&mut stored, "uid", Value::String(format!("uid-{}", seq)));
        set_meta(&mut stored, "creationTimestamp", Value::String(created));
        set_meta(&mut stored, "resourceVersion", Value::String(seq.to_string()));
        inner.objects.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, reference: &ResourceReference, obj: &DynObject) -> Result<DynObject, BackendError> {
        self.backend.enter(Op::Update, Call::Update(reference.clone(), obj.clone())).await?;
        self.check_ns(reference.namespace.as_deref())?;
        let mut inner = self.backend.lock();
        inner.seq += 1;
        let seq = inner.seq;
        let idx = inner
            .objects
            .iter()
            .position(|o| matches_ref(o, reference))
            .ok_or_else(|| BackendError::NotFound(reference.to_string()))?;
        let prev = inner.objects[idx].clone();
        let mut next = obj.clone();
        for field in ["uid", "creationTimestamp"] {
            if let Some(v) = prev.get("metadata").and_then(|m| m.get(field)) {
                set_meta(&mut next, field, v.clone());
            }
        }
        set_meta(&mut next, "resourceVersion", Value::String(seq.to_string()));
        inner.objects[idx] = next.clone();
        Ok(next)
    }

    async fn delete(&self, reference: &ResourceReference) -> Result<(), BackendError> {
        self.backend.enter(Op::Delete, Call::Delete(reference.clone())).await?;
        self.check_ns(reference.namespace.as_deref())?;
        let mut inner = self.backend.lock();
        let before = inner.objects.len();
        inner.objects.retain(|o| !matches_ref(o, reference));
        if inner.objects.len() == before {
            return Err(BackendError::NotFound(reference.to_string()));
        }
        Ok(())
    }
}

/// Factory handing out [`MockClient`]s over one shared backend.
#[derive(Clone)]
pub struct MockFactory {
    backend: MockBackend,
    builds: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl MockFactory {
    pub fn new(backend: MockBackend) -> Self {
        Self { backend, builds: Arc::new(AtomicUsize::new(0)), refuse: Arc::new(AtomicBool::new(false)), delay: None }
    }

    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of client constructions attempted.
    pub fn builds(&self) -> usize { self.builds.load(Ordering::SeqCst) }

    pub fn fail_builds(&self, on: bool) { self.refuse.store(on, Ordering::SeqCst); }

    pub fn backend(&self) -> &MockBackend { &self.backend }
}

#[async_trait::async_trait]
impl ClientFactory for MockFactory {
    async fn build(&self, _identity: &Identity, options: &ClientOptions) -> Result<Arc<dyn DynamicClient>, BackendError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(BackendError::InvalidIdentity("credential rejected".into()));
        }
        Ok(Arc::new(MockClient::new(self.backend.clone(), options.namespace.clone())))
    }
}
