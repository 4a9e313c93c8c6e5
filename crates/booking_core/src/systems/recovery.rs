//! Recovery monitor.
//!
//! Steps 5 and 6 are only legitimate while a live [`TripSession`] exists.
//! A persisted snapshot can claim them after a reload that lost the session
//! (step 6 additionally survives from legacy builds that had a terminal
//! state). On `SessionStarted`, such a state is normalized back to step 1,
//! the corrected snapshot is persisted, and the user gets an informational
//! "previous trip completed" notice rather than an error.

use bevy_ecs::prelude::{Res, ResMut};

use crate::billing::TripSession;
use crate::booking::{BookingState, BookingStep};
use crate::clock::{CurrentEvent, EventKind, SessionClock};
use crate::route_cache::RouteCache;
use crate::session::SessionAuth;
use crate::snapshot::{BookingSnapshot, SnapshotStoreResource};
use crate::telemetry::{SessionNotice, SessionTelemetry, SessionWarning};

pub fn session_restore_system(
    event: Res<CurrentEvent>,
    clock: Res<SessionClock>,
    auth: Res<SessionAuth>,
    mut booking: ResMut<BookingState>,
    trip: Option<Res<TripSession>>,
    mut cache: ResMut<RouteCache>,
    store: Res<SnapshotStoreResource>,
    mut telemetry: ResMut<SessionTelemetry>,
) {
    if event.0.kind != EventKind::SessionStarted {
        return;
    }
    if !auth.signed_in {
        return;
    }
    if !matches!(
        booking.step(),
        BookingStep::TripActive | BookingStep::Completed
    ) {
        return;
    }
    if trip.is_some() {
        // A live trip legitimately holds step 5; nothing to repair.
        return;
    }

    booking.reset_booking_flow();
    cache.clear_all();

    let snapshot = BookingSnapshot::capture(&booking);
    if let Err(err) = store.0.save(&snapshot) {
        telemetry.warnings.push(SessionWarning::PersistenceFailed {
            reason: err.to_string(),
            at: clock.now(),
        });
    }
    telemetry
        .notices
        .push(SessionNotice::PreviousTripCompleted { at: clock.now() });
}
