//! Domain layer - Vehicle snapshot model and frame decoding.
//!
//! Pure data and functions: no I/O, no async. Everything here is
//! testable in isolation.

pub mod fleet;
pub mod snapshot;

pub use fleet::FleetSummary;
pub use snapshot::{
    decode_frame, ElementValidation, EntityId, EntitySnapshot, GeoPoint, RouteInfo,
    VehicleStatus,
};
