// # Channel Monitor Stream
//
// In-process implementation of MonitorConnectionStream backed by an
// unbounded channel. The receiving half is handed back as a Stream.
//
// The stream counts as cancelled once its token is cancelled or the
// receiving half is dropped.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::Error;
use crate::traits::monitor::{ConnectionEvent, MonitorConnectionStream};

/// Channel-backed monitor output stream
#[derive(Debug, Clone)]
pub struct ChannelMonitorStream {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
    token: CancellationToken,
}

impl ChannelMonitorStream {
    /// Create a stream and the receiver its events arrive on
    pub fn new() -> (Self, UnboundedReceiverStream<ConnectionEvent>) {
        Self::with_token(CancellationToken::new())
    }

    /// Create a stream cancelled by an existing token
    pub fn with_token(
        token: CancellationToken,
    ) -> (Self, UnboundedReceiverStream<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, token }, UnboundedReceiverStream::new(rx))
    }

    /// Token that cancels this stream
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[async_trait]
impl MonitorConnectionStream for ChannelMonitorStream {
    async fn send(&self, event: ConnectionEvent) -> Result<(), Error> {
        self.tx
            .send(event)
            .map_err(|_| Error::stream("monitor receiver dropped"))
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    async fn cancelled(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }
}
