use std::time::Duration;

use kubeql_kubehub::CacheConfig;

/// Runtime limits for the resolver layer.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Upper bound for one backend call.
    pub call_timeout: Duration,
    /// Deadline for a whole request, shared by all its backend calls.
    pub request_timeout: Duration,
    pub cache: CacheConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { call_timeout: Duration::from_secs(30), request_timeout: Duration::from_secs(60), cache: CacheConfig::default() }
    }
}
