// # Connection Monitoring
//
// Defines the watch contract: subscribers hand in a selector and an output
// stream, and receive an initial snapshot followed by incremental events.
//
// ## Usage
//
// ```rust,ignore
// use nsm_core::monitor::ChannelMonitorStream;
// use nsm_core::traits::{MonitorConnectionServer, MonitorScopeSelector};
// use tokio_stream::StreamExt;
//
// let (stream, mut events) = ChannelMonitorStream::new();
// let token = stream.cancellation_token();
// tokio::spawn(async move {
//     monitor.monitor_connections(MonitorScopeSelector::all(), Arc::new(stream)).await
// });
//
// while let Some(event) = events.next().await {
//     println!("{:?}: {} connections", event.event_type, event.connections.len());
// }
// token.cancel();
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::network_service::{Connection, PathSegment};

/// Kind of a connection event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionEventType {
    /// Full snapshot sent once when a subscriber arrives
    InitialStateTransfer,
    /// A connection was established or refreshed
    Update,
    /// A connection was torn down
    Delete,
}

/// A connection lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub event_type: ConnectionEventType,
    /// Connections keyed by id
    pub connections: BTreeMap<String, Connection>,
}

impl ConnectionEvent {
    /// Snapshot of a whole connection table
    pub fn initial_state(connections: BTreeMap<String, Connection>) -> Self {
        Self {
            event_type: ConnectionEventType::InitialStateTransfer,
            connections,
        }
    }

    /// Single-connection update
    pub fn update(connection: Connection) -> Self {
        Self::single(ConnectionEventType::Update, connection)
    }

    /// Single-connection delete
    pub fn delete(connection: Connection) -> Self {
        Self::single(ConnectionEventType::Delete, connection)
    }

    fn single(event_type: ConnectionEventType, connection: Connection) -> Self {
        let mut connections = BTreeMap::new();
        connections.insert(connection.id.clone(), connection);
        Self {
            event_type,
            connections,
        }
    }
}

/// Which connections a subscriber is interested in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorScopeSelector {
    /// Empty means every connection
    #[serde(default)]
    pub path_segments: Vec<PathSegment>,
}

impl MonitorScopeSelector {
    /// Selector matching every connection
    pub fn all() -> Self {
        Self::default()
    }

    /// Selector matching connections whose path shares a segment with `segments`
    pub fn with_path_segments(segments: Vec<PathSegment>) -> Self {
        Self {
            path_segments: segments,
        }
    }

    /// Check whether a connection falls within this selector
    ///
    /// A selector segment matches a path segment when either its non-empty
    /// `name` or its non-empty `id` is equal.
    pub fn matches(&self, connection: &Connection) -> bool {
        if self.path_segments.is_empty() {
            return true;
        }
        self.path_segments.iter().any(|wanted| {
            connection.path.iter().any(|segment| {
                (!wanted.name.is_empty() && wanted.name == segment.name)
                    || (!wanted.id.is_empty() && wanted.id == segment.id)
            })
        })
    }
}

/// Output side of a watch
///
/// # Liveness
///
/// Only [`is_cancelled`](Self::is_cancelled) tells the broadcaster a
/// subscriber is gone. A failing [`send`](Self::send) is logged and the
/// subscriber is kept.
#[async_trait]
pub trait MonitorConnectionStream: Send + Sync {
    /// Deliver one event
    async fn send(&self, event: ConnectionEvent) -> Result<(), crate::Error>;

    /// Non-blocking liveness check
    fn is_cancelled(&self) -> bool;

    /// Resolves once the stream is cancelled
    async fn cancelled(&self);
}

/// Server side of the watch contract
#[async_trait]
pub trait MonitorConnectionServer: Send + Sync {
    /// Stream connection events to `stream` until it is cancelled
    ///
    /// Returns `Ok(())` both when the stream is cancelled and when the
    /// server shuts down.
    async fn monitor_connections(
        &self,
        selector: MonitorScopeSelector,
        stream: Arc<dyn MonitorConnectionStream>,
    ) -> Result<(), crate::Error>;
}
