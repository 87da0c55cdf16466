//! Per-subscriber event filtering

use std::sync::Arc;

use crate::Result;
use crate::traits::monitor::{
    ConnectionEvent, ConnectionEventType, MonitorConnectionStream, MonitorScopeSelector,
};

/// A subscriber: selector plus the stream its events go to
pub(crate) struct MonitorFilter {
    selector: MonitorScopeSelector,
    stream: Arc<dyn MonitorConnectionStream>,
}

impl MonitorFilter {
    pub(crate) fn new(
        selector: MonitorScopeSelector,
        stream: Arc<dyn MonitorConnectionStream>,
    ) -> Self {
        Self { selector, stream }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.stream.is_cancelled()
    }

    /// Send the part of `event` this subscriber selected
    ///
    /// Update and delete events that select nothing are not sent; the
    /// initial state transfer always is, even when empty.
    pub(crate) async fn send(&self, event: &ConnectionEvent) -> Result<()> {
        let connections: std::collections::BTreeMap<_, _> = event
            .connections
            .iter()
            .filter(|(_, conn)| self.selector.matches(conn))
            .map(|(id, conn)| (id.clone(), conn.clone()))
            .collect();

        if connections.is_empty() && event.event_type != ConnectionEventType::InitialStateTransfer {
            return Ok(());
        }

        self.stream
            .send(ConnectionEvent {
                event_type: event.event_type,
                connections,
            })
            .await
    }
}
