//! Session telemetry: warnings surfaced to the user, informational notices,
//! charge records and completed trips.

use bevy_ecs::prelude::Resource;

use crate::stations::StationId;

/// User-facing warning. Validation rejections land here instead of being
/// thrown; the UI renders them as toasts.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionWarning {
    /// Attempted to pick the same station for both ends of the trip.
    SameStationRejected { station: StationId, at: u64 },
    /// A step-machine operation was attempted outside its legal window.
    OperationRejected { reason: String, at: u64 },
    /// A charge attempt failed; the booking was left in place for retry.
    ChargeFailed {
        amount_cents: u32,
        reason: String,
        at: u64,
    },
    /// A snapshot write failed; the in-memory state is ahead of the store.
    PersistenceFailed { reason: String, at: u64 },
}

/// Informational notices, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    /// Recovery monitor normalized a stale step-5/6 snapshot at session start.
    PreviousTripCompleted { at: u64 },
    /// A trip ended normally and the flow reset to step 1.
    TripCompleted { at: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargePurpose {
    /// Flat starting fare at trip confirmation.
    TripStart,
    /// Per-minute usage fare at trip end.
    TripUsage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRecord {
    pub purpose: ChargePurpose,
    pub amount_cents: u32,
    pub transaction_id: String,
    pub at: u64,
}

/// One completed trip. Timestamps are session-clock milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTripRecord {
    pub departure: Option<StationId>,
    pub arrival: Option<StationId>,
    pub unlocked_at: Option<u64>,
    pub ended_at: u64,
    pub minutes_used: u64,
    pub additional_fare_cents: u32,
}

impl CompletedTripRecord {
    /// Unlocked usage window, when the vehicle was actually unlocked.
    pub fn usage_duration_ms(&self) -> Option<u64> {
        self.unlocked_at
            .map(|unlocked| self.ended_at.saturating_sub(unlocked))
    }
}

/// Collects session telemetry. Insert as a resource to record what happened.
#[derive(Debug, Default, Resource)]
pub struct SessionTelemetry {
    pub warnings: Vec<SessionWarning>,
    pub notices: Vec<SessionNotice>,
    pub charges: Vec<ChargeRecord>,
    pub completed_trips: Vec<CompletedTripRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_duration_derives_from_unlock() {
        let record = CompletedTripRecord {
            departure: Some(StationId(1)),
            arrival: Some(StationId(2)),
            unlocked_at: Some(10_000),
            ended_at: 105_000,
            minutes_used: 2,
            additional_fare_cents: 60,
        };
        assert_eq!(record.usage_duration_ms(), Some(95_000));

        let never_unlocked = CompletedTripRecord {
            unlocked_at: None,
            ..record
        };
        assert_eq!(never_unlocked.usage_duration_ms(), None);
    }
}
