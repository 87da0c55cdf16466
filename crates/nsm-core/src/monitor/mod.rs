//! Connection monitor chain element
//!
//! [`MonitorServer`] sits on the establish/teardown path and mirrors the
//! connections that pass through it into an in-memory table. Watchers
//! subscribe through [`MonitorConnectionServer`] and receive an initial
//! snapshot followed by one event per establish or teardown.
//!
//! ## Architecture
//!
//! ```text
//!  request ──► next.request ──ok──► enqueue { insert, broadcast UPDATE }
//!  close   ──► enqueue { remove, broadcast DELETE if known } ──► next.close
//!  watch   ──► enqueue { add subscriber, send INITIAL_STATE_TRANSFER }
//!              then park until stream cancelled or shutdown()
//!
//!                      ┌────────────────┐
//!   enqueued work ───► │ SerialExecutor │ ──► table + subscribers
//!                      └────────────────┘
//! ```
//!
//! ## Ordering
//!
//! The table and subscriber list are only touched from units running on the
//! server's [`SerialExecutor`], so a mutation and its broadcast are atomic
//! with respect to every other mutation and broadcast. Every subscriber sees
//! its snapshot first, then updates and deletes in the order they were
//! applied to the table.
//!
//! ## Subscriber pruning
//!
//! Subscribers are dropped lazily: a broadcast skips and forgets any
//! subscriber whose stream reports cancellation. A failed send is logged
//! and the subscriber is kept.

mod filter;
pub mod stream;

pub use stream::ChannelMonitorStream;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::serialize::{ExecHandle, SerialExecutor};
use crate::traits::monitor::{
    ConnectionEvent, MonitorConnectionServer, MonitorConnectionStream, MonitorScopeSelector,
};
use crate::traits::network_service::{Connection, NetworkServiceRequest, NetworkServiceServer};
use crate::{Error, Result};
use filter::MonitorFilter;

type StateFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// State owned by the serialized executor
#[derive(Default)]
struct MonitorState {
    connections: BTreeMap<String, Connection>,
    monitors: Vec<MonitorFilter>,
}

impl MonitorState {
    /// Broadcast an event, pruning cancelled subscribers
    async fn send(&mut self, event: &ConnectionEvent) {
        let monitors = std::mem::take(&mut self.monitors);
        let mut kept = Vec::with_capacity(monitors.len());

        for monitor in monitors {
            if monitor.is_cancelled() {
                debug!("Dropping cancelled monitor subscriber");
                continue;
            }
            if let Err(e) = monitor.send(event).await {
                error!(event_type = ?event.event_type, "Error sending event: {}", e);
            }
            kept.push(monitor);
        }

        self.monitors = kept;
    }
}

struct Shared {
    // Locked only from units on `executor`, so never contended.
    state: Mutex<MonitorState>,
    executor: SerialExecutor,
    shutdown: CancellationToken,
}

/// Monitor chain element and watch server
///
/// Cloning is cheap; clones share the same table and subscribers.
///
/// # Lifecycle
///
/// Must be created inside a tokio runtime. Call [`MonitorServer::shutdown`]
/// to release every parked [`monitor_connections`](MonitorConnectionServer::monitor_connections)
/// call; dropping the server does not do that.
#[derive(Clone)]
pub struct MonitorServer {
    shared: Arc<Shared>,
    next: Arc<dyn NetworkServiceServer>,
}

impl MonitorServer {
    /// Create a monitor element in front of `next`
    pub fn new(next: Arc<dyn NetworkServiceServer>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MonitorState::default()),
                executor: SerialExecutor::new(),
                shutdown: CancellationToken::new(),
            }),
            next,
        }
    }

    /// Release every parked watch call
    ///
    /// Idempotent. Establish and teardown keep working afterwards.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Snapshot of the connection table, after all queued work has run
    pub async fn connections(&self) -> Result<BTreeMap<String, Connection>> {
        self.query(|state| state.connections.clone()).await
    }

    /// Number of tracked subscribers, after all queued work has run
    ///
    /// Cancelled subscribers are only forgotten by a broadcast, so this can
    /// include streams that are already gone.
    pub async fn subscriber_count(&self) -> Result<usize> {
        self.query(|state| state.monitors.len()).await
    }

    fn enqueue<F>(&self, apply: F) -> ExecHandle
    where
        F: for<'a> FnOnce(&'a mut MonitorState) -> StateFuture<'a> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.async_exec(async move {
            let mut state = shared.state.lock().await;
            apply(&mut *state).await;
        })
    }

    async fn query<T, F>(&self, read: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&MonitorState) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let _ = self.shared.executor.async_exec(async move {
            let state = shared.state.lock().await;
            let _ = tx.send(read(&*state));
        });
        rx.await.map_err(|_| Error::ExecutorClosed)
    }
}

#[async_trait]
impl MonitorConnectionServer for MonitorServer {
    async fn monitor_connections(
        &self,
        selector: MonitorScopeSelector,
        stream: Arc<dyn MonitorConnectionStream>,
    ) -> Result<()> {
        let monitor = MonitorFilter::new(selector, Arc::clone(&stream));
        self.enqueue(move |state| {
            Box::pin(async move {
                let event = ConnectionEvent::initial_state(state.connections.clone());
                if let Err(e) = monitor.send(&event).await {
                    warn!("Error sending initial state transfer: {}", e);
                }
                state.monitors.push(monitor);
            })
        });

        tokio::select! {
            _ = stream.cancelled() => {
                debug!("Monitor stream cancelled");
            }
            _ = self.shared.shutdown.cancelled() => {
                debug!("Monitor server shut down, releasing watcher");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkServiceServer for MonitorServer {
    async fn request(&self, request: NetworkServiceRequest) -> Result<Connection> {
        let conn = self.next.request(request).await?;

        let update = conn.clone();
        self.enqueue(move |state| {
            Box::pin(async move {
                debug!(connection_id = %update.id, "Recording connection");
                state.connections.insert(update.id.clone(), update.clone());
                state.send(&ConnectionEvent::update(update)).await;
            })
        });

        Ok(conn)
    }

    async fn close(&self, connection: Connection) -> Result<()> {
        let id = connection.id.clone();
        self.enqueue(move |state| {
            Box::pin(async move {
                // Subscribers never hear about a connection they were not told exists.
                let Some(stored) = state.connections.remove(&id) else {
                    debug!(connection_id = %id, "Close for unknown connection");
                    return;
                };
                debug!(connection_id = %id, "Forgetting connection");
                // Selectors are matched against the recorded path, not the caller's copy.
                state.send(&ConnectionEvent::delete(stored)).await;
            })
        });

        self.next.close(connection).await
    }
}
