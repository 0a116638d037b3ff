//! Shared helpers: an in-memory `FrameStream` and a polling wait.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use live_feed_binder::error::FeedError;
use live_feed_binder::ports::transport::FrameStream;

pub const V1_FRAME: &str = r#"[{"id":"v1","location":{"latitude":1,"longitude":2},"available_seats":3,"status":"available","route":"R1","driverName":"D","plate":"P","fleet_id":"F1"}]"#;

pub type FrameTx = mpsc::UnboundedSender<Result<String, FeedError>>;

/// Connection whose frames are pushed by the test.
pub struct ChannelStream {
    rx: mpsc::UnboundedReceiver<Result<String, FeedError>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameStream for ChannelStream {
    async fn next_frame(&mut self) -> Option<Result<String, FeedError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.rx.close();
    }
}

/// A fresh in-memory connection plus its sender and close counter.
pub fn channel_stream() -> (FrameTx, ChannelStream, Arc<AtomicUsize>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closes = Arc::new(AtomicUsize::new(0));
    let stream = ChannelStream {
        rx,
        closes: Arc::clone(&closes),
    };
    (tx, stream, closes)
}

/// Push a text frame; a send after the reader is gone is not an error here.
pub fn push(tx: &FrameTx, frame: &str) {
    let _ = tx.send(Ok(frame.to_string()));
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 2s");
}
