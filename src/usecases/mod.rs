//! Use Cases Layer - Application Logic
//!
//! Orchestrates domain decoding with the transport port.
//!
//! Use cases:
//! - `LiveFeedBinder`: one connection, one last-message-wins value

pub mod binder;

pub use binder::{BinderOptions, BinderState, Current, FeedStats, FeedStatus, LiveFeedBinder};
