//! Test doubles and common utilities for chain element contract tests
//!
//! This module provides minimal doubles for the elements and streams that
//! surround the code under test.

#![allow(dead_code)]

use nsm_core::MonitorServer;
use nsm_core::error::{Error, Result};
use nsm_core::traits::{
    Connection, ConnectionEvent, ConnectionEventType, EndpointRegistryClient, EndpointStream,
    MonitorConnectionServer, MonitorConnectionStream, MonitorScopeSelector, NetworkServiceEndpoint,
    NetworkServiceEndpointQuery, NetworkServiceRequest, NetworkServiceServer,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tail element that accepts everything and counts calls
#[derive(Default)]
pub struct EchoServer {
    request_count: AtomicUsize,
    close_count: AtomicUsize,
    fail_requests: AtomicBool,
    fail_closes: AtomicBool,
}

impl EchoServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent request fail
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent close fail
    pub fn fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl NetworkServiceServer for EchoServer {
    async fn request(&self, request: NetworkServiceRequest) -> Result<Connection> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(Error::network_service("downstream refused request"));
        }
        Ok(request.connection)
    }

    async fn close(&self, _connection: Connection) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_closes.load(Ordering::SeqCst) {
            return Err(Error::network_service("downstream refused close"));
        }
        Ok(())
    }
}

/// Monitor stream that records events and can be told to fail sends
#[derive(Default)]
pub struct RecordingStream {
    events: parking_lot::Mutex<Vec<ConnectionEvent>>,
    fail_sends: AtomicBool,
    token: CancellationToken,
}

impl RecordingStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events.lock().clone()
    }

    /// Event types received so far, in order
    pub fn event_types(&self) -> Vec<ConnectionEventType> {
        self.events.lock().iter().map(|e| e.event_type).collect()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[async_trait::async_trait]
impl MonitorConnectionStream for RecordingStream {
    async fn send(&self, event: ConnectionEvent) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::stream("transport write failed"));
        }
        self.events.lock().push(event);
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Wait until `stream` has received at least `n` events
pub async fn wait_for_events(stream: &RecordingStream, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while stream.events.lock().len() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for monitor events");
}

/// Start a watch on `server` in the background
pub fn spawn_watch(
    server: &MonitorServer,
    selector: MonitorScopeSelector,
    stream: Arc<RecordingStream>,
) -> JoinHandle<Result<()>> {
    let server = server.clone();
    tokio::spawn(async move { server.monitor_connections(selector, stream).await })
}

/// Request a connection with the given id through `server`
pub async fn establish(server: &MonitorServer, id: &str) -> Result<Connection> {
    server
        .request(NetworkServiceRequest::new(Connection::new(id)))
        .await
}

/// Registry double that counts calls and can fail on demand
#[derive(Default)]
pub struct MockRegistry {
    register_count: AtomicUsize,
    unregister_count: AtomicUsize,
    /// Number of upcoming register calls to fail
    failures_remaining: AtomicUsize,
    fail_unregister: AtomicBool,
    /// Expiration granted to register calls, overriding the requested one
    granted_lease: parking_lot::Mutex<Option<chrono::Duration>>,
    registered: parking_lot::Mutex<Vec<NetworkServiceEndpoint>>,
}

impl MockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` register calls
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Grant `lease` from now on every subsequent register, whatever was asked
    pub fn grant_lease(&self, lease: chrono::Duration) {
        *self.granted_lease.lock() = Some(lease);
    }

    pub fn fail_unregister(&self, fail: bool) {
        self.fail_unregister.store(fail, Ordering::SeqCst);
    }

    /// Total register calls, including failed ones
    pub fn register_count(&self) -> usize {
        self.register_count.load(Ordering::SeqCst)
    }

    pub fn unregister_count(&self) -> usize {
        self.unregister_count.load(Ordering::SeqCst)
    }

    /// Endpoints accepted so far, in order
    pub fn registered(&self) -> Vec<NetworkServiceEndpoint> {
        self.registered.lock().clone()
    }
}

#[async_trait::async_trait]
impl EndpointRegistryClient for MockRegistry {
    async fn register(&self, endpoint: NetworkServiceEndpoint) -> Result<NetworkServiceEndpoint> {
        self.register_count.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Error::registry("registry unavailable"));
        }
        let mut endpoint = endpoint;
        if let Some(lease) = *self.granted_lease.lock() {
            endpoint.expiration_time = Some(chrono::Utc::now() + lease);
        }
        self.registered.lock().push(endpoint.clone());
        Ok(endpoint)
    }

    async fn find(&self, query: NetworkServiceEndpointQuery) -> Result<EndpointStream> {
        let matches: Vec<_> = self
            .registered
            .lock()
            .iter()
            .filter(|nse| nse.name == query.endpoint.name)
            .cloned()
            .collect();
        Ok(Box::pin(tokio_stream::iter(matches)))
    }

    async fn unregister(&self, _endpoint: NetworkServiceEndpoint) -> Result<()> {
        self.unregister_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_unregister.load(Ordering::SeqCst) {
            return Err(Error::registry("unregister rejected"));
        }
        Ok(())
    }
}
