//! Transport Port - Duplex Connection Interface
//!
//! The binder only needs two things from the network: a way to open one
//! connection to an endpoint, and a stream of inbound text frames from
//! that connection. Keeping this behind a trait lets the lifecycle be
//! tested without sockets.

use async_trait::async_trait;

use crate::error::FeedError;

/// Address of a duplex streaming endpoint (e.g. `ws://host/path`).
///
/// Not validated here; the transport rejects what it cannot open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Endpoint {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// One open connection, read-only from the binder's point of view.
#[async_trait]
pub trait FrameStream: Send {
    /// Next inbound text frame in arrival order.
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<String, FeedError>>;

    /// Release the connection. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Opens connections. One call, one connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `endpoint`.
    ///
    /// # Errors
    /// Returns `FeedError::Connect` when the transport cannot open it.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn FrameStream>, FeedError>;
}
