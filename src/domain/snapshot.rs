//! Entity Snapshot Model and Frame Decoding
//!
//! One inbound frame is a JSON array of vehicle snapshots. In lenient
//! mode every array is accepted: elements are read best-effort and any
//! field that does not fit falls back to its default. Strict mode checks
//! each element and rejects the frame as a whole on the first failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Opaque vehicle identifier.
pub type EntityId = String;

/// Operational status of a vehicle. Closed set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Available,
    Full,
    #[default]
    Unavailable,
}

impl std::fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Full => write!(f, "full"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Whether both coordinates fall inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A route a vehicle is running or has been assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteInfo {
    pub route_id: String,
    pub start_location: String,
    pub end_location: String,
    pub route_name: String,
}

/// One tracked vehicle at a point in time.
///
/// Every field has a default so that a sparse element still decodes.
/// The derived `Deserialize` is exact about types; see [`decode_frame`]
/// for how lenient mode recovers from mismatches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub location: GeoPoint,
    pub available_seats: u32,
    pub status: VehicleStatus,
    /// Free-text route label.
    pub route: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_route: Option<RouteInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_routes: Option<Vec<RouteInfo>>,
    #[serde(rename = "driverName")]
    pub driver_name: String,
    pub plate: String,
    pub fleet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    /// Total seat capacity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Kept verbatim; see [`EntitySnapshot::last_updated_at`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl EntitySnapshot {
    /// Parse `last_updated` as an RFC 3339 timestamp, if present and well-formed.
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_updated.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Occupied seats, when the total capacity is known.
    pub fn occupied_seats(&self) -> Option<u32> {
        self.capacity
            .map(|total| total.saturating_sub(self.available_seats))
    }
}

/// How much checking is applied to individual array elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementValidation {
    /// Accept any array. Missing, null or mistyped fields default.
    #[default]
    Lenient,
    /// Require every element to decode exactly, with a non-empty id and
    /// in-range coordinates.
    Strict,
}

/// Decode one raw frame into the full replacement snapshot list.
///
/// In lenient mode the result always has one snapshot per array element.
///
/// # Errors
/// Returns a [`DecodeError`] when the text is not JSON or the JSON is not
/// an array. In strict mode, also when any element fails to decode or
/// validate.
pub fn decode_frame(
    raw: &str,
    validation: ElementValidation,
) -> Result<Vec<EntitySnapshot>, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;

    let Value::Array(items) = value else {
        return Err(DecodeError::NotAnArray {
            kind: json_kind(&value),
        });
    };

    match validation {
        ElementValidation::Lenient => Ok(items.iter().map(decode_lenient).collect()),
        ElementValidation::Strict => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| -> Result<EntitySnapshot, DecodeError> {
                let snapshot: EntitySnapshot = serde_json::from_value(item)
                    .map_err(|source| DecodeError::Element { index, source })?;
                check_strict(index, &snapshot)?;
                Ok(snapshot)
            })
            .collect(),
    }
}

/// Best-effort read of one element. Never fails.
///
/// Non-objects become a default snapshot. For objects, keys whose value
/// does not decode on its own are dropped so the field takes its default.
fn decode_lenient(item: &Value) -> EntitySnapshot {
    if let Ok(snapshot) = EntitySnapshot::deserialize(item) {
        return snapshot;
    }

    let Value::Object(fields) = item else {
        return EntitySnapshot::default();
    };

    let usable: Map<String, Value> = fields
        .iter()
        .filter(|(key, value)| field_decodes(key, value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    EntitySnapshot::deserialize(&Value::Object(usable)).unwrap_or_default()
}

/// Whether `key: value` alone decodes. Every field defaults, so this
/// isolates one field's type check from the rest of the element.
fn field_decodes(key: &str, value: &Value) -> bool {
    let single: Map<String, Value> = std::iter::once((key.to_owned(), value.clone())).collect();
    EntitySnapshot::deserialize(&Value::Object(single)).is_ok()
}

fn check_strict(index: usize, snapshot: &EntitySnapshot) -> Result<(), DecodeError> {
    if snapshot.id.trim().is_empty() {
        return Err(DecodeError::Invalid {
            index,
            reason: "empty id".to_string(),
        });
    }
    if !snapshot.location.is_valid() {
        return Err(DecodeError::Invalid {
            index,
            reason: format!(
                "coordinates out of range ({}, {})",
                snapshot.location.latitude, snapshot.location.longitude
            ),
        });
    }
    Ok(())
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
