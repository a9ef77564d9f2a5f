//! Request-scoped identity, deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use kubeql_core::{BackendError, ClientOptions, Identity};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Carried explicitly through every resolver and backend call of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub identity: Identity,
    pub options: ClientOptions,
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity, options: ClientOptions::default(), deadline: None, cancel: CancellationToken::new() }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options.normalized();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one backend call bounded by `per_call`, the request deadline and cancellation.
    ///
    /// Expiry or cancellation drops the in-flight future and reports a timeout.
    pub async fn bounded<T, F>(&self, per_call: Duration, op: &'static str, fut: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let mut deadline = Instant::now() + per_call;
        if let Some(d) = self.deadline {
            deadline = deadline.min(d);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(op, "backend call cancelled");
                Err(BackendError::Timeout(format!("{}: request cancelled", op)))
            }
            res = tokio::time::timeout_at(deadline, fut) => match res {
                Ok(r) => r,
                Err(_) => {
                    debug!(op, "backend call deadline exceeded");
                    Err(BackendError::Timeout(format!("{}: deadline exceeded", op)))
                }
            },
        }
    }
}
