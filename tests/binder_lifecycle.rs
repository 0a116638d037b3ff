//! Binder Lifecycle Tests - Start, Frames, Stop, Endpoint Changes
//!
//! Drives `LiveFeedBinder` through a mocked `Connector` (mockall) and
//! in-memory connections, so connection counts can be asserted exactly.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use mockall::mock;
use mockall::predicate::*;

use live_feed_binder::adapters::metrics::MetricsRegistry;
use live_feed_binder::domain::snapshot::{ElementValidation, EntitySnapshot, GeoPoint, VehicleStatus};
use live_feed_binder::error::FeedError;
use live_feed_binder::ports::transport::{Connector, Endpoint, FrameStream};
use live_feed_binder::usecases::binder::{BinderOptions, BinderState, LiveFeedBinder};

use common::{channel_stream, push, wait_until, V1_FRAME};

// ---- Mock Definitions ----

mock! {
    pub Conn {}

    #[async_trait::async_trait]
    impl Connector for Conn {
        async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn FrameStream>, FeedError>;
    }
}

const E: &str = "ws://feed.test/e";
const E2: &str = "ws://feed.test/e2";

fn binder_with(conn: MockConn, options: BinderOptions) -> LiveFeedBinder {
    LiveFeedBinder::new(Arc::new(conn), options)
}

// ---- Tests ----

#[tokio::test]
async fn test_reference_scenario_frames() {
    let (tx, stream, _closes) = channel_stream();
    let mut conn = MockConn::new();
    conn.expect_connect()
        .with(eq(Endpoint::from(E)))
        .times(1)
        .return_once(move |_| Ok(Box::new(stream) as Box<dyn FrameStream>));

    let mut binder = binder_with(conn, BinderOptions::default());
    assert!(binder.current().is_empty());

    binder.start(E).await.unwrap();
    assert_eq!(binder.state(), BinderState::Connected);

    // Valid array frame replaces the value
    push(&tx, V1_FRAME);
    wait_until(|| binder.current().len() == 1).await;
    let current = binder.current();
    let v1 = &current[0];
    assert_eq!(v1.id, "v1");
    assert_eq!(v1.location, GeoPoint { latitude: 1.0, longitude: 2.0 });
    assert_eq!(v1.available_seats, 3);
    assert_eq!(v1.status, VehicleStatus::Available);
    assert_eq!(v1.route, "R1");
    assert_eq!(v1.driver_name, "D");
    assert_eq!(v1.plate, "P");
    assert_eq!(v1.fleet_id, "F1");

    // Not JSON: dropped
    push(&tx, "not json");
    wait_until(|| binder.stats().frames_rejected == 1).await;
    assert_eq!(binder.current(), current);

    // Object, not array: dropped
    push(&tx, r#"{"id":"v1"}"#);
    wait_until(|| binder.stats().frames_rejected == 2).await;
    assert_eq!(binder.current(), current);

    binder.stop().await;
}

#[tokio::test]
async fn test_frames_replace_without_merging() {
    let (tx, stream, _closes) = channel_stream();
    let mut conn = MockConn::new();
    conn.expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(stream) as Box<dyn FrameStream>));

    let mut binder = binder_with(conn, BinderOptions::default());
    binder.start(E).await.unwrap();

    push(&tx, r#"[{"id":"a"},{"id":"b"},{"id":"c"}]"#);
    wait_until(|| binder.current().len() == 3).await;

    push(&tx, r#"[{"id":"b"}]"#);
    wait_until(|| binder.current().len() == 1).await;
    assert_eq!(binder.current()[0].id, "b");

    push(&tx, "[]");
    wait_until(|| binder.current().is_empty()).await;
    assert_eq!(binder.stats().frames_accepted, 3);

    binder.stop().await;
}

#[tokio::test]
async fn test_any_array_frame_is_accepted_in_lenient_mode() {
    let (tx, stream, _closes) = channel_stream();
    let mut conn = MockConn::new();
    conn.expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(stream) as Box<dyn FrameStream>));

    let mut binder = binder_with(conn, BinderOptions::default());
    binder.start(E).await.unwrap();

    let frames = [
        r#"[{"id":"v1","route":null,"driverName":null,"plate":null,"fleet_id":null}]"#,
        r#"[{"id":"v1","location":{"latitude":1}}, {"id":"v2","location":{}}]"#,
        r#"[1, "two", null, true, [], {}]"#,
        r#"[{"id":"v1","available_seats":-1,"location":{"latitude":"14.5","longitude":2}}]"#,
        r#"[{"id":"v9","status":"parked","assigned_routes":[{"route_id":1}]}, {"id":7}]"#,
    ];

    for (i, frame) in frames.iter().enumerate() {
        let len = serde_json::from_str::<Vec<serde_json::Value>>(frame).unwrap().len();
        let accepted = i as u64 + 1;

        push(&tx, frame);
        wait_until(|| binder.stats().frames_accepted == accepted).await;
        assert_eq!(binder.current().len(), len, "frame {i}");
    }

    assert_eq!(binder.stats().frames_rejected, 0);
    let last = binder.current();
    assert_eq!(last[0].id, "v9");
    assert_eq!(last[0].status, VehicleStatus::Unavailable);
    assert_eq!(last[1], EntitySnapshot::default());

    binder.stop().await;
}

#[tokio::test]
async fn test_subscribers_are_notified() {
    let (tx, stream, _closes) = channel_stream();
    let mut conn = MockConn::new();
    conn.expect_connect()
        .return_once(move |_| Ok(Box::new(stream) as Box<dyn FrameStream>));

    let mut binder = binder_with(conn, BinderOptions::default());
    let mut rx = binder.subscribe();
    binder.start(E).await.unwrap();

    push(&tx, V1_FRAME);
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("no change notification")
        .unwrap();
    assert_eq!(rx.borrow_and_update()[0].id, "v1");

    binder.stop().await;
}

#[tokio::test]
async fn test_stop_releases_connection_and_ignores_later_frames() {
    let (tx, stream, closes) = channel_stream();
    let mut conn = MockConn::new();
    conn.expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(stream) as Box<dyn FrameStream>));

    let mut binder = binder_with(conn, BinderOptions::default());
    binder.start(E).await.unwrap();
    assert!(binder.stats().link_open);

    push(&tx, V1_FRAME);
    wait_until(|| binder.current().len() == 1).await;

    binder.stop().await;
    assert_eq!(binder.state(), BinderState::Stopped);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(!binder.stats().link_open);

    // The transport keeps delivering; nothing may land.
    push(&tx, r#"[{"id":"after-stop"},{"id":"x"}]"#);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(binder.current().len(), 1);
    assert_eq!(binder.current()[0].id, "v1");
    assert_eq!(binder.stats().frames_accepted, 1);

    // Idempotent
    binder.stop().await;
    binder.stop().await;
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(binder.stats().connections_closed, 1);
}

#[tokio::test]
async fn test_endpoint_change_closes_once_and_opens_once() {
    let (tx_e, stream_e, closes_e) = channel_stream();
    let (tx_e2, stream_e2, closes_e2) = channel_stream();

    let mut conn = MockConn::new();
    conn.expect_connect()
        .with(eq(Endpoint::from(E)))
        .times(1)
        .return_once(move |_| Ok(Box::new(stream_e) as Box<dyn FrameStream>));
    conn.expect_connect()
        .with(eq(Endpoint::from(E2)))
        .times(1)
        .return_once(move |_| Ok(Box::new(stream_e2) as Box<dyn FrameStream>));

    let mut binder = binder_with(conn, BinderOptions::default());
    binder.start(E).await.unwrap();
    push(&tx_e, V1_FRAME);
    wait_until(|| binder.current().len() == 1).await;

    binder.set_endpoint(E2).await.unwrap();
    assert_eq!(binder.state(), BinderState::Connected);
    assert_eq!(binder.endpoint(), Some(&Endpoint::from(E2)));
    assert_eq!(closes_e.load(Ordering::SeqCst), 1);
    assert_eq!(closes_e2.load(Ordering::SeqCst), 0);

    // Prior value survives until the new connection delivers.
    assert_eq!(binder.current()[0].id, "v1");

    // Setting the same endpoint again is a no-op.
    binder.set_endpoint(E2).await.unwrap();
    assert_eq!(binder.stats().connections_opened, 2);

    push(&tx_e, r#"[{"id":"old"}]"#);
    push(&tx_e2, r#"[{"id":"new-1"},{"id":"new-2"}]"#);
    wait_until(|| binder.current().len() == 2).await;
    assert_eq!(binder.current()[0].id, "new-1");

    binder.stop().await;
    assert_eq!(closes_e.load(Ordering::SeqCst), 1);
    assert_eq!(closes_e2.load(Ordering::SeqCst), 1);
    assert_eq!(binder.stats().connections_closed, 2);
}

#[tokio::test]
async fn test_endpoint_change_can_reset_value() {
    let (tx_e, stream_e, _) = channel_stream();
    let (_tx_e2, stream_e2, _) = channel_stream();

    let mut conn = MockConn::new();
    conn.expect_connect()
        .with(eq(Endpoint::from(E)))
        .return_once(move |_| Ok(Box::new(stream_e) as Box<dyn FrameStream>));
    conn.expect_connect()
        .with(eq(Endpoint::from(E2)))
        .return_once(move |_| Ok(Box::new(stream_e2) as Box<dyn FrameStream>));

    let options = BinderOptions {
        reset_on_endpoint_change: true,
        ..BinderOptions::default()
    };
    let mut binder = binder_with(conn, options);
    binder.start(E).await.unwrap();
    push(&tx_e, V1_FRAME);
    wait_until(|| binder.current().len() == 1).await;

    binder.set_endpoint(E2).await.unwrap();
    assert!(binder.current().is_empty());

    binder.stop().await;
}

#[tokio::test]
async fn test_failed_endpoint_change_leaves_binder_stopped() {
    let (_tx_e, stream_e, closes_e) = channel_stream();

    let mut conn = MockConn::new();
    conn.expect_connect()
        .with(eq(Endpoint::from(E)))
        .times(1)
        .return_once(move |_| Ok(Box::new(stream_e) as Box<dyn FrameStream>));
    conn.expect_connect()
        .with(eq(Endpoint::from(E2)))
        .times(1)
        .returning(|ep| {
            Err(FeedError::Connect {
                endpoint: ep.to_string(),
                reason: "refused".to_string(),
            })
        });

    let mut binder = binder_with(conn, BinderOptions::default());
    binder.start(E).await.unwrap();

    let err = binder.set_endpoint(E2).await.unwrap_err();
    assert!(matches!(err, FeedError::Connect { .. }));
    assert_eq!(binder.state(), BinderState::Stopped);
    assert_eq!(closes_e.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_while_connected_is_rejected() {
    let (_tx, stream, _) = channel_stream();
    let mut conn = MockConn::new();
    conn.expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(stream) as Box<dyn FrameStream>));

    let mut binder = binder_with(conn, BinderOptions::default());
    binder.start(E).await.unwrap();

    let err = binder.start(E2).await.unwrap_err();
    assert!(matches!(err, FeedError::AlreadyRunning(ref ep) if ep == E));
    assert_eq!(binder.endpoint(), Some(&Endpoint::from(E)));

    binder.stop().await;
}

#[tokio::test]
async fn test_restart_after_stop() {
    let (_tx1, stream1, closes1) = channel_stream();
    let (tx2, stream2, _) = channel_stream();

    let mut conn = MockConn::new();
    conn.expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(stream1) as Box<dyn FrameStream>));
    conn.expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(stream2) as Box<dyn FrameStream>));

    let mut binder = binder_with(conn, BinderOptions::default());
    binder.start(E).await.unwrap();
    binder.stop().await;
    assert_eq!(closes1.load(Ordering::SeqCst), 1);

    binder.start(E).await.unwrap();
    assert_eq!(binder.state(), BinderState::Connected);

    push(&tx2, V1_FRAME);
    wait_until(|| binder.current().len() == 1).await;

    binder.stop().await;
}

#[tokio::test]
async fn test_peer_close_stops_delivery_without_recovery() {
    let (tx, stream, closes) = channel_stream();
    let mut conn = MockConn::new();
    conn.expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(stream) as Box<dyn FrameStream>));

    let mut binder = binder_with(conn, BinderOptions::default());
    binder.start(E).await.unwrap();

    push(&tx, V1_FRAME);
    wait_until(|| binder.current().len() == 1).await;

    drop(tx);
    wait_until(|| !binder.stats().link_open).await;

    // Still owned until stopped; value is kept.
    assert_eq!(binder.state(), BinderState::Connected);
    assert_eq!(binder.current()[0].id, "v1");
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    binder.stop().await;
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(binder.state(), BinderState::Stopped);

    let stats = binder.stats();
    assert_eq!(stats.connections_lost, 1);
    assert_eq!(stats.connections_closed, 1);
}

#[tokio::test]
async fn test_transport_error_ends_delivery() {
    let (tx, stream, _) = channel_stream();
    let mut conn = MockConn::new();
    conn.expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(stream) as Box<dyn FrameStream>));

    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let mut binder =
        LiveFeedBinder::with_metrics(Arc::new(conn), BinderOptions::default(), Arc::clone(&metrics));
    binder.start(E).await.unwrap();
    assert_eq!(metrics.link_open.get(), 1);

    let _ = tx.send(Err(FeedError::Transport("connection reset".to_string())));
    wait_until(|| !binder.stats().link_open).await;

    push(&tx, V1_FRAME);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(binder.current().is_empty());

    assert_eq!(binder.stats().connections_lost, 1);
    assert_eq!(metrics.link_open.get(), 0);
    assert_eq!(metrics.connections.with_label_values(&["lost"]).get(), 1);

    binder.stop().await;
    assert_eq!(binder.stats().connections_lost, 1);
}

#[tokio::test]
async fn test_strict_validation_rejects_whole_frame() {
    let (tx, stream, _) = channel_stream();
    let mut conn = MockConn::new();
    conn.expect_connect()
        .return_once(move |_| Ok(Box::new(stream) as Box<dyn FrameStream>));

    let options = BinderOptions {
        validation: ElementValidation::Strict,
        ..BinderOptions::default()
    };
    let mut binder = binder_with(conn, options);
    binder.start(E).await.unwrap();

    push(&tx, r#"[{"id":"ok"},{"id":""}]"#);
    wait_until(|| binder.stats().frames_rejected == 1).await;
    assert!(binder.current().is_empty());
    assert!(binder
        .stats()
        .last_decode_error
        .unwrap()
        .contains("element 1"));

    push(&tx, r#"[{"id":"ok","route":null}]"#);
    wait_until(|| binder.stats().frames_rejected == 2).await;
    assert!(binder.current().is_empty());

    binder.stop().await;
}

#[tokio::test]
async fn test_connect_error_propagates() {
    let mut conn = MockConn::new();
    conn.expect_connect()
        .times(1)
        .returning(|ep| {
            Err(FeedError::Connect {
                endpoint: ep.to_string(),
                reason: "invalid URL".to_string(),
            })
        });

    let mut binder = binder_with(conn, BinderOptions::default());
    let err = binder.start("::not a url::").await.unwrap_err();

    assert!(matches!(err, FeedError::Connect { .. }));
    assert_eq!(binder.state(), BinderState::Idle);
    assert!(!binder.stats().link_open);
}
