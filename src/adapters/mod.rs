//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies.
//!
//! Adapter categories:
//! - `ws`: tokio-tungstenite WebSocket transport
//! - `metrics`: Prometheus metrics export and health checks

pub mod metrics;
pub mod ws;

pub use ws::WsConnector;
