//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces the binder requires from the outside world.
//! Adapters implement these traits.
//!
//! Port categories:
//! - `Connector` / `FrameStream`: duplex connection carrying inbound frames

pub mod transport;

pub use transport::{Connector, Endpoint, FrameStream};
