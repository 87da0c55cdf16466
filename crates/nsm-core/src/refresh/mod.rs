//! Registration lease refresh
//!
//! [`RefreshClient`] is a registry client chain element that keeps endpoint
//! registrations alive. Every successful `register` starts a background
//! renewal task for that endpoint name; `unregister` stops it.
//!
//! ## Schedule
//!
//! ```text
//! registered ── sleep 2/3 of remaining lease ──► renew
//!                      ▲                          │
//!                      └──────── ok ──────────────┤
//!                                                 │ err
//!                          sleep retry_delay ◄────┘ (then renew again)
//! ```
//!
//! A successful renewal asks for `now + lease` where `lease` is the time
//! that remained when the endpoint was first registered, and the next wake
//! is computed from that request rather than from whatever expiration the
//! registry hands back. A failed renewal
//! is retried after `retry_delay` without recomputing the schedule, until
//! it succeeds or the task is cancelled.
//!
//! ## Cancellation
//!
//! At most one task runs per endpoint name. Re-registering a name cancels
//! the previous task before starting the new one, under the same lock that
//! guards the lease map. [`RefreshClient::shutdown`] cancels all of them.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::RefreshConfig;
use crate::traits::registry::{
    EndpointRegistryClient, EndpointStream, NetworkServiceEndpoint, NetworkServiceEndpointQuery,
};

/// A running renewal task
struct Lease {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Lease {
    fn cancel(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Registry client element that renews registrations before they expire
///
/// # Lifecycle
///
/// Renewal tasks are spawned on the current tokio runtime. They run until
/// the endpoint is unregistered or [`RefreshClient::shutdown`] is called.
pub struct RefreshClient {
    next: Arc<dyn EndpointRegistryClient>,
    leases: Mutex<HashMap<String, Lease>>,
    retry_delay: Duration,
    root: CancellationToken,
}

impl RefreshClient {
    /// Create a refresh element in front of `next`
    ///
    /// Renewals are sent through `next` as well.
    pub fn new(next: Arc<dyn EndpointRegistryClient>, config: RefreshConfig) -> Self {
        Self {
            next,
            leases: Mutex::new(HashMap::new()),
            retry_delay: config.retry_delay(),
            root: CancellationToken::new(),
        }
    }

    /// Override the retry delay for failed renewals
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Names of endpoints with an active renewal task
    pub fn active_leases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.leases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Cancel every renewal task
    ///
    /// Idempotent. Registrations made afterwards are forwarded but no longer
    /// renewed.
    pub fn shutdown(&self) {
        self.root.cancel();
        let mut leases = self.leases.lock();
        for (name, lease) in leases.drain() {
            debug!(endpoint = %name, "Cancelling renewal on shutdown");
            lease.cancel();
        }
    }

    fn start_refresh(&self, endpoint: NetworkServiceEndpoint) {
        let mut leases = self.leases.lock();

        if let Some(previous) = leases.remove(&endpoint.name) {
            debug!(endpoint = %endpoint.name, "Replacing renewal task");
            previous.cancel();
        }

        if self.root.is_cancelled() {
            debug!(endpoint = %endpoint.name, "Refresh client shut down, not renewing");
            return;
        }

        let Some(expiration_time) = endpoint.expiration_time else {
            debug!(endpoint = %endpoint.name, "No expiration time, nothing to renew");
            return;
        };
        let remaining = expiration_time - Utc::now();
        let lease = match remaining.to_std() {
            Ok(lease) if !lease.is_zero() => lease,
            _ => {
                warn!(endpoint = %endpoint.name, "Registration already expired, not renewing");
                return;
            }
        };

        let token = self.root.child_token();
        let name = endpoint.name.clone();
        let task = RenewalTask {
            next: Arc::clone(&self.next),
            endpoint,
            lease,
            lease_delta: remaining,
            retry_delay: self.retry_delay,
            token: token.clone(),
        };
        let handle = tokio::spawn(task.run());
        leases.insert(name, Lease { token, handle });
    }

    fn stop_refresh(&self, name: &str) {
        if let Some(lease) = self.leases.lock().remove(name) {
            debug!(endpoint = %name, "Stopping renewal task");
            lease.cancel();
        }
    }
}

struct RenewalTask {
    next: Arc<dyn EndpointRegistryClient>,
    endpoint: NetworkServiceEndpoint,
    /// Lease length as first registered
    lease: Duration,
    lease_delta: chrono::Duration,
    retry_delay: Duration,
    token: CancellationToken,
}

impl RenewalTask {
    async fn run(mut self) {
        let mut deadline = Instant::now() + self.lease;

        loop {
            let wake = Instant::now() + deadline.saturating_duration_since(Instant::now()) * 2 / 3;
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep_until(wake) => {}
            }

            match self.renew().await {
                Some(next_deadline) => deadline = next_deadline,
                None => return,
            }
        }
    }

    /// Renew until success; `None` once cancelled
    async fn renew(&mut self) -> Option<Instant> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }

            let requested_at = Instant::now();
            let mut request = self.endpoint.clone();
            request.expiration_time = Some(Utc::now() + self.lease_delta);

            match self.next.register(request.clone()).await {
                Ok(renewed) => {
                    debug!(
                        endpoint = %renewed.name,
                        granted = ?renewed.expiration_time,
                        "Renewed registration"
                    );
                    // Scheduling follows the original lease, whatever the registry granted.
                    self.endpoint = renewed;
                    return Some(requested_at + self.lease);
                }
                Err(e) => {
                    warn!(
                        endpoint = %request.name,
                        error = %e,
                        "Renewal failed, retrying in {:?}",
                        self.retry_delay
                    );
                    tokio::select! {
                        _ = self.token.cancelled() => return None,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl EndpointRegistryClient for RefreshClient {
    async fn register(&self, endpoint: NetworkServiceEndpoint) -> Result<NetworkServiceEndpoint> {
        let registered = self.next.register(endpoint).await?;
        info!(
            endpoint = %registered.name,
            expires = ?registered.expiration_time,
            "Endpoint registered"
        );
        self.start_refresh(registered.clone());
        Ok(registered)
    }

    async fn find(&self, query: NetworkServiceEndpointQuery) -> Result<EndpointStream> {
        self.next.find(query).await
    }

    async fn unregister(&self, endpoint: NetworkServiceEndpoint) -> Result<()> {
        let name = endpoint.name.clone();
        self.next.unregister(endpoint).await?;
        self.stop_refresh(&name);
        info!(endpoint = %name, "Endpoint unregistered");
        Ok(())
    }
}

impl Drop for RefreshClient {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
