//! Error Types - Decode and Transport Failures
//!
//! Two error families only: a frame that cannot be turned into a
//! snapshot list (`DecodeError`), and everything that goes wrong with
//! the connection itself (`FeedError`). Neither is ever fatal to the
//! process; the binder records decode errors and drops the frame.

use thiserror::Error;

/// Why an inbound frame was rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("frame is JSON {kind}, expected an array")]
    NotAnArray { kind: &'static str },

    #[error("element {index} does not match the snapshot shape: {source}")]
    Element {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("element {index} rejected: {reason}")]
    Invalid { index: usize, reason: String },
}

/// Connection and lifecycle errors.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("binder already connected to {0}")]
    AlreadyRunning(String),
}
