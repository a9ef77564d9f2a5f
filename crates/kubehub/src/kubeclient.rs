//! kube-rs implementation of [`DynamicClient`] and its per-identity factory.

use std::sync::Arc;
use std::time::Instant;

use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    config::AuthInfo,
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{pinned_kind, Scope},
    Client, Config,
};
use kubeql_core::{BackendError, ClientOptions, Credential, DynObject, Identity, ResourceReference};
use metrics::{counter, histogram};
use secrecy::SecretString;
use tracing::{debug, info};

use crate::{ClientFactory, DynamicClient, ListRequest};

/// Map a kube error onto the backend taxonomy.
pub fn classify(e: kube::Error) -> BackendError {
    match e {
        kube::Error::Api(resp) => BackendError::from_status(resp.code, &resp.reason, resp.message),
        other => BackendError::Transport(other.to_string()),
    }
}

fn forbidden(msg: String) -> BackendError {
    BackendError::Status { code: 403, reason: "Forbidden".into(), message: msg }
}

fn to_kube(obj: &DynObject) -> Result<DynamicObject, BackendError> {
    serde_json::from_value(obj.to_value()).map_err(|e| BackendError::Transport(format!("encoding object: {}", e)))
}

fn from_kube(obj: DynamicObject, api_version: &str, kind: &str) -> Result<DynObject, BackendError> {
    let v = serde_json::to_value(&obj).map_err(|e| BackendError::Transport(format!("decoding object: {}", e)))?;
    DynObject::with_default_types(v, api_version, kind).map_err(|e| BackendError::Transport(format!("decoding object: {}", e)))
}

/// Client bound to one identity, optionally restricted to a single namespace.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    restrict: Option<String>,
}

impl KubeClient {
    pub fn new(client: Client, restrict: Option<String>) -> Self { Self { client, restrict } }

    fn scope_ns<'a>(&'a self, requested: Option<&'a str>) -> Result<Option<&'a str>, BackendError> {
        match (self.restrict.as_deref(), requested) {
            (Some(r), Some(n)) if r != n => Err(forbidden(format!("client restricted to namespace {}, got {}", r, n))),
            (Some(r), _) => Ok(Some(r)),
            (None, n) => Ok(n),
        }
    }

    async fn api_for(&self, api_version: &str, kind: &str, namespace: Option<&str>) -> Result<Api<DynamicObject>, BackendError> {
        let (group, version) = match api_version.rsplit_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        let gvk = GroupVersionKind { group, version, kind: kind.to_string() };
        let (ar, caps) = pinned_kind(&self.client, &gvk).await.map_err(classify)?;
        let api = match caps.scope {
            Scope::Namespaced => {
                let ns = self
                    .scope_ns(namespace)?
                    .ok_or_else(|| BackendError::Status { code: 400, reason: "BadRequest".into(), message: "namespace required for namespaced kind".into() })?;
                Api::namespaced_with(self.client.clone(), ns, &ar)
            }
            Scope::Cluster => {
                if let Some(r) = &self.restrict {
                    return Err(forbidden(format!("client restricted to namespace {}, kind {} is cluster scoped", r, kind)));
                }
                Api::all_with(self.client.clone(), &ar)
            }
        };
        Ok(api)
    }
}

#[async_trait::async_trait]
impl DynamicClient for KubeClient {
    async fn list(&self, req: &ListRequest) -> Result<Vec<DynObject>, BackendError> {
        let t0 = Instant::now();
        let api_version = req.api_version();
        let ns = self.scope_ns(req.namespace.as_deref())?;
        let gvk = GroupVersionKind { group: req.group.clone(), version: req.version.clone(), kind: req.kind.clone() };
        let ar = match &req.plural {
            Some(plural) => ApiResource::from_gvk_with_plural(&gvk, plural),
            None => pinned_kind(&self.client, &gvk).await.map_err(classify)?.0,
        };
        let api: Api<DynamicObject> = match ns {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };
        debug!(api_version = %api_version, list_kind = %req.list_kind, ns = ?ns, "kube: list");
        counter!("kubeql_backend_calls", 1u64, "op" => "list");
        let list = api.list(&ListParams::default()).await.map_err(classify)?;
        let items = list
            .items
            .into_iter()
            .map(|o| from_kube(o, &api_version, &req.kind))
            .collect::<Result<Vec<_>, _>>()?;
        histogram!("kubeql_backend_latency_ms", t0.elapsed().as_secs_f64() * 1000.0, "op" => "list");
        info!(list_kind = %req.list_kind, items = items.len(), took_ms = %t0.elapsed().as_millis(), "kube: list ok");
        Ok(items)
    }

    async fn get(&self, reference: &ResourceReference) -> Result<DynObject, BackendError> {
        let t0 = Instant::now();
        let api = self.api_for(&reference.api_version, &reference.kind, reference.namespace.as_deref()).await?;
        counter!("kubeql_backend_calls", 1u64, "op" => "get");
        let obj = api.get(&reference.name).await.map_err(classify)?;
        info!(target_ref = %reference, took_ms = %t0.elapsed().as_millis(), "kube: get ok");
        from_kube(obj, &reference.api_version, &reference.kind)
    }

    async fn create(&self, obj: &DynObject) -> Result<DynObject, BackendError> {
        let t0 = Instant::now();
        let api = self.api_for(obj.api_version(), obj.kind(), obj.namespace()).await?;
        counter!("kubeql_backend_calls", 1u64, "op" => "create");
        let created = api.create(&PostParams::default(), &to_kube(obj)?).await.map_err(classify)?;
        info!(kind = %obj.kind(), name = ?created.metadata.name, took_ms = %t0.elapsed().as_millis(), "kube: create ok");
        from_kube(created, obj.api_version(), obj.kind())
    }

    async fn update(&self, reference: &ResourceReference, obj: &DynObject) -> Result<DynObject, BackendError> {
        let t0 = Instant::now();
        let api = self.api_for(&reference.api_version, &reference.kind, reference.namespace.as_deref()).await?;
        counter!("kubeql_backend_calls", 1u64, "op" => "update");
        let replaced = api.replace(&reference.name, &PostParams::default(), &to_kube(obj)?).await.map_err(classify)?;
        info!(target_ref = %reference, took_ms = %t0.elapsed().as_millis(), "kube: update ok");
        from_kube(replaced, &reference.api_version, &reference.kind)
    }

    async fn delete(&self, reference: &ResourceReference) -> Result<(), BackendError> {
        let t0 = Instant::now();
        let api = self.api_for(&reference.api_version, &reference.kind, reference.namespace.as_deref()).await?;
        counter!("kubeql_backend_calls", 1u64, "op" => "delete");
        let _ = api.delete(&reference.name, &DeleteParams::default()).await.map_err(classify)?;
        info!(target_ref = %reference, took_ms = %t0.elapsed().as_millis(), "kube: delete ok");
        Ok(())
    }
}

/// Builds [`KubeClient`]s from a base config plus the caller identity.
#[derive(Clone)]
pub struct KubeClientFactory {
    base: Config,
}

impl KubeClientFactory {
    pub fn new(base: Config) -> Self { Self { base } }

    /// Base config from the environment (in-cluster or kubeconfig).
    pub async fn infer() -> Result<Self, BackendError> {
        let base = Config::infer().await.map_err(|e| BackendError::Transport(format!("inferring kube config: {}", e)))?;
        Ok(Self::new(base))
    }

    /// Bearer tokens replace the bridge credentials; impersonation rides on top of them.
    pub fn config_for(&self, identity: &Identity, options: &ClientOptions) -> Result<Config, BackendError> {
        if identity.is_blank() {
            return Err(BackendError::InvalidIdentity("empty credential".into()));
        }
        let mut cfg = self.base.clone();
        match &identity.credential {
            Credential::Bearer(token) => {
                cfg.auth_info = AuthInfo { token: Some(SecretString::new(token.clone())), ..Default::default() };
            }
            Credential::Impersonate { user, groups } => {
                cfg.auth_info.impersonate = Some(user.clone());
                cfg.auth_info.impersonate_groups = if groups.is_empty() { None } else { Some(groups.clone()) };
            }
        }
        if let Some(ns) = &options.namespace {
            cfg.default_namespace = ns.clone();
        }
        Ok(cfg)
    }
}

#[async_trait::async_trait]
impl ClientFactory for KubeClientFactory {
    async fn build(&self, identity: &Identity, options: &ClientOptions) -> Result<Arc<dyn DynamicClient>, BackendError> {
        let cfg = self.config_for(identity, options)?;
        let client = Client::try_from(cfg).map_err(|e| BackendError::InvalidIdentity(e.to_string()))?;
        Ok(Arc::new(KubeClient::new(client, options.namespace.clone())))
    }
}
