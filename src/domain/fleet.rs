//! Fleet Summary - Read-only Aggregate over a Snapshot List
//!
//! Gives the rendering layer something small to display on every
//! change without walking the full list itself.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::snapshot::{EntitySnapshot, VehicleStatus};

/// Aggregate view of one current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSummary {
    /// Number of vehicles in the value.
    pub total: usize,
    pub available: usize,
    pub full: usize,
    pub unavailable: usize,
    /// Sum of `available_seats` across all vehicles.
    pub open_seats: u64,
    /// Distinct `fleet_id` values.
    pub fleets: usize,
    /// Newest parsable `last_updated` timestamp.
    pub newest_update: Option<DateTime<Utc>>,
}

impl FleetSummary {
    /// Summarize a snapshot list.
    pub fn from_snapshots(snapshots: &[EntitySnapshot]) -> Self {
        let mut summary = Self {
            total: snapshots.len(),
            ..Self::default()
        };
        let mut fleets = HashSet::new();

        for snapshot in snapshots {
            match snapshot.status {
                VehicleStatus::Available => summary.available += 1,
                VehicleStatus::Full => summary.full += 1,
                VehicleStatus::Unavailable => summary.unavailable += 1,
            }
            summary.open_seats += u64::from(snapshot.available_seats);
            fleets.insert(snapshot.fleet_id.as_str());

            if let Some(ts) = snapshot.last_updated_at() {
                summary.newest_update = Some(summary.newest_update.map_or(ts, |cur| cur.max(ts)));
            }
        }

        summary.fleets = fleets.len();
        summary
    }
}

impl std::fmt::Display for FleetSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} vehicles ({} available, {} full, {} unavailable), {} open seats across {} fleet(s)",
            self.total, self.available, self.full, self.unavailable, self.open_seats, self.fleets
        )
    }
}
