//! Architectural Contract Test: Subscriber Isolation
//!
//! This test verifies that watchers cannot interfere with the establish and
//! teardown paths, or with each other.
//!
//! Constraints verified:
//! - A cancelled subscriber is forgotten by the next broadcast
//! - A subscriber whose send fails is kept and keeps receiving
//! - A watch call parks until its stream is cancelled or the server shuts down
//! - Establish and teardown return while a broadcast is stuck
//!
//! If this test fails, someone has:
//! - Awaited enqueued monitor work on the request path
//! - Dropped subscribers on send errors
//! - Let a watch call return early

mod common;

use async_trait::async_trait;
use common::*;
use nsm_core::error::Result;
use nsm_core::traits::{
    Connection, ConnectionEvent, ConnectionEventType, MonitorConnectionServer,
    MonitorConnectionStream, MonitorScopeSelector, NetworkServiceServer,
};
use nsm_core::MonitorServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_test::{assert_pending, assert_ready_ok, task};

/// Stream whose sends wait until released
struct StuckStream {
    gate: Semaphore,
}

impl StuckStream {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
        })
    }

    fn release(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl MonitorConnectionStream for StuckStream {
    async fn send(&self, _event: ConnectionEvent) -> Result<()> {
        let _permit = self.gate.acquire().await;
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        false
    }

    async fn cancelled(&self) {
        std::future::pending::<()>().await
    }
}

#[tokio::test]
async fn cancelled_subscriber_is_pruned_on_next_broadcast() {
    let server = MonitorServer::new(EchoServer::new());

    let staying = RecordingStream::new();
    let leaving = RecordingStream::new();
    let watch_staying = spawn_watch(&server, MonitorScopeSelector::all(), staying.clone());
    let watch_leaving = spawn_watch(&server, MonitorScopeSelector::all(), leaving.clone());
    wait_for_events(&staying, 1).await;
    wait_for_events(&leaving, 1).await;
    assert_eq!(server.subscriber_count().await.unwrap(), 2);

    leaving.cancel();
    watch_leaving.await.unwrap().unwrap();

    // Nothing has been broadcast since, so it is still tracked.
    assert_eq!(server.subscriber_count().await.unwrap(), 2);

    establish(&server, "conn-1").await.unwrap();
    assert_eq!(server.subscriber_count().await.unwrap(), 1);

    assert_eq!(staying.events().len(), 2);
    assert_eq!(leaving.events().len(), 1, "cancelled subscriber receives nothing more");

    server.shutdown();
    watch_staying.await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_send_keeps_subscriber() {
    let server = MonitorServer::new(EchoServer::new());

    let stream = RecordingStream::new();
    let watch = spawn_watch(&server, MonitorScopeSelector::all(), stream.clone());
    wait_for_events(&stream, 1).await;

    stream.fail_sends(true);
    establish(&server, "conn-1").await.unwrap();
    assert_eq!(server.subscriber_count().await.unwrap(), 1);
    assert_eq!(stream.events().len(), 1);

    stream.fail_sends(false);
    establish(&server, "conn-2").await.unwrap();
    wait_for_events(&stream, 2).await;

    let events = stream.events();
    assert_eq!(events[1].event_type, ConnectionEventType::Update);
    assert!(events[1].connections.contains_key("conn-2"));

    server.shutdown();
    watch.await.unwrap().unwrap();
}

#[tokio::test]
async fn failing_subscriber_does_not_starve_others() {
    let server = MonitorServer::new(EchoServer::new());

    let broken = RecordingStream::new();
    let healthy = RecordingStream::new();
    let watch_broken = spawn_watch(&server, MonitorScopeSelector::all(), broken.clone());
    let watch_healthy = spawn_watch(&server, MonitorScopeSelector::all(), healthy.clone());
    wait_for_events(&broken, 1).await;
    wait_for_events(&healthy, 1).await;

    broken.fail_sends(true);
    establish(&server, "conn-1").await.unwrap();
    server.close(Connection::new("conn-1")).await.unwrap();
    wait_for_events(&healthy, 3).await;

    assert_eq!(
        healthy.event_types(),
        vec![
            ConnectionEventType::InitialStateTransfer,
            ConnectionEventType::Update,
            ConnectionEventType::Delete,
        ]
    );

    server.shutdown();
    watch_broken.await.unwrap().unwrap();
    watch_healthy.await.unwrap().unwrap();
}

#[tokio::test]
async fn watch_parks_until_stream_cancelled() {
    let server = MonitorServer::new(EchoServer::new());
    let stream = RecordingStream::new();

    let mut watch = task::spawn(
        server.monitor_connections(MonitorScopeSelector::all(), stream.clone()),
    );
    assert_pending!(watch.poll());

    wait_for_events(&stream, 1).await;
    establish(&server, "conn-1").await.unwrap();
    wait_for_events(&stream, 2).await;
    assert_pending!(watch.poll());

    stream.cancel();
    assert!(watch.is_woken());
    assert_ready_ok!(watch.poll());
}

#[tokio::test]
async fn watch_parks_until_shutdown() {
    let server = MonitorServer::new(EchoServer::new());
    let stream = RecordingStream::new();

    let mut watch = task::spawn(
        server.monitor_connections(MonitorScopeSelector::all(), stream.clone()),
    );
    assert_pending!(watch.poll());

    server.shutdown();
    assert_ready_ok!(watch.poll());

    // Establish keeps working after shutdown.
    establish(&server, "conn-1").await.unwrap();
    assert!(server.connections().await.unwrap().contains_key("conn-1"));
}

#[tokio::test]
async fn request_does_not_wait_for_stuck_broadcast() {
    let tail = EchoServer::new();
    let server = MonitorServer::new(tail.clone());

    let stuck = StuckStream::new();
    let watch = {
        let server = server.clone();
        let stuck = stuck.clone();
        tokio::spawn(async move {
            server
                .monitor_connections(MonitorScopeSelector::all(), stuck)
                .await
        })
    };

    let calls = async {
        establish(&server, "conn-1").await.unwrap();
        establish(&server, "conn-2").await.unwrap();
        server.close(Connection::new("conn-1")).await.unwrap();
    };
    tokio::time::timeout(Duration::from_secs(1), calls)
        .await
        .expect("request path blocked on a stuck subscriber");
    assert_eq!(tail.request_count(), 2);
    assert_eq!(tail.close_count(), 1);

    stuck.release();
    let table = server.connections().await.unwrap();
    assert_eq!(table.keys().cloned().collect::<Vec<_>>(), vec!["conn-2".to_string()]);

    server.shutdown();
    watch.await.unwrap().unwrap();
}
