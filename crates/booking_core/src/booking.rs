//! The booking step machine.
//!
//! `BookingState` owns the step counter and the cross-field invariants; it
//! knows nothing about routes, payments or persistence. Those side effects
//! belong to the session controller, which is the only caller of the mutating
//! operations here.

use bevy_ecs::prelude::Resource;
use thiserror::Error;

use crate::billing::ChargeError;
use crate::stations::StationId;

/// Phase of the booking flow. Wire numbers 1-6 are the persisted form.
///
/// `Completed` (6) is a legacy terminal phase that still appears in old
/// persisted snapshots. No transition produces it anymore; the recovery
/// monitor normalizes it back to `SelectingDeparture` on session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BookingStep {
    SelectingDeparture,
    ConfirmingDeparture,
    SelectingArrival,
    ConfirmingArrival,
    TripActive,
    Completed,
}

impl BookingStep {
    pub fn as_number(self) -> u8 {
        match self {
            BookingStep::SelectingDeparture => 1,
            BookingStep::ConfirmingDeparture => 2,
            BookingStep::SelectingArrival => 3,
            BookingStep::ConfirmingArrival => 4,
            BookingStep::TripActive => 5,
            BookingStep::Completed => 6,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(BookingStep::SelectingDeparture),
            2 => Some(BookingStep::ConfirmingDeparture),
            3 => Some(BookingStep::SelectingArrival),
            4 => Some(BookingStep::ConfirmingArrival),
            5 => Some(BookingStep::TripActive),
            6 => Some(BookingStep::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BookingError {
    #[error("departure and arrival stations must differ")]
    SameStation,
    #[error("{op} is not allowed at step {}", .step.as_number())]
    WrongStep { op: &'static str, step: BookingStep },
    #[error("cannot move from step {} to step {}", .from.as_number(), .to.as_number())]
    IllegalTransition { from: BookingStep, to: BookingStep },
    #[error("unknown station {0:?}")]
    UnknownStation(StationId),
    #[error("identity verification incomplete")]
    VerificationIncomplete,
    #[error("no active trip")]
    NoActiveTrip,
    #[error(transparent)]
    Charge(#[from] ChargeError),
}

/// Singleton booking state for the session. Mutated exclusively through the
/// operations below; every reachable state keeps
/// `departure_station_id != arrival_station_id` whenever both are set.
#[derive(Debug, Clone, PartialEq, Resource)]
pub struct BookingState {
    step: BookingStep,
    departure_station_id: Option<StationId>,
    arrival_station_id: Option<StationId>,
    departure_date: Option<i64>,
    departure_time: Option<i64>,
    date_time_confirmed: bool,
}

impl Default for BookingState {
    fn default() -> Self {
        Self {
            step: BookingStep::SelectingDeparture,
            departure_station_id: None,
            arrival_station_id: None,
            departure_date: None,
            departure_time: None,
            date_time_confirmed: false,
        }
    }
}

impl BookingState {
    pub fn step(&self) -> BookingStep {
        self.step
    }

    pub fn departure_station_id(&self) -> Option<StationId> {
        self.departure_station_id
    }

    pub fn arrival_station_id(&self) -> Option<StationId> {
        self.arrival_station_id
    }

    pub fn departure_date(&self) -> Option<i64> {
        self.departure_date
    }

    pub fn departure_time(&self) -> Option<i64> {
        self.departure_time
    }

    pub fn date_time_confirmed(&self) -> bool {
        self.date_time_confirmed
    }

    /// Legal in steps 1-2. Rejects a departure equal to the current arrival;
    /// auto-advances 1 -> 2 on first selection.
    pub fn select_departure(&mut self, id: StationId) -> Result<(), BookingError> {
        if !matches!(
            self.step,
            BookingStep::SelectingDeparture | BookingStep::ConfirmingDeparture
        ) {
            return Err(BookingError::WrongStep {
                op: "select_departure",
                step: self.step,
            });
        }
        if self.arrival_station_id == Some(id) {
            return Err(BookingError::SameStation);
        }
        self.departure_station_id = Some(id);
        if self.step == BookingStep::SelectingDeparture {
            self.step = BookingStep::ConfirmingDeparture;
        }
        Ok(())
    }

    /// Legal in steps 3-4. Rejects an arrival equal to the current departure;
    /// auto-advances 3 -> 4 on first selection.
    pub fn select_arrival(&mut self, id: StationId) -> Result<(), BookingError> {
        if !matches!(
            self.step,
            BookingStep::SelectingArrival | BookingStep::ConfirmingArrival
        ) {
            return Err(BookingError::WrongStep {
                op: "select_arrival",
                step: self.step,
            });
        }
        if self.departure_station_id == Some(id) {
            return Err(BookingError::SameStation);
        }
        self.arrival_station_id = Some(id);
        if self.step == BookingStep::SelectingArrival {
            self.step = BookingStep::ConfirmingArrival;
        }
        Ok(())
    }

    /// Legal in steps 1-3. Unsets the departure and forces step 1.
    pub fn clear_departure(&mut self) -> Result<(), BookingError> {
        if self.step > BookingStep::SelectingArrival {
            return Err(BookingError::WrongStep {
                op: "clear_departure",
                step: self.step,
            });
        }
        self.departure_station_id = None;
        self.step = BookingStep::SelectingDeparture;
        Ok(())
    }

    /// Legal in steps 3-4. Unsets the arrival and forces step 3.
    pub fn clear_arrival(&mut self) -> Result<(), BookingError> {
        if !matches!(
            self.step,
            BookingStep::SelectingArrival | BookingStep::ConfirmingArrival
        ) {
            return Err(BookingError::WrongStep {
                op: "clear_arrival",
                step: self.step,
            });
        }
        self.arrival_station_id = None;
        self.step = BookingStep::SelectingArrival;
        Ok(())
    }

    /// Sets the confirmation flag without touching the step.
    pub fn confirm_date_time(&mut self, confirmed: bool) {
        self.date_time_confirmed = confirmed;
    }

    pub fn set_departure_date(&mut self, date: Option<i64>) {
        self.departure_date = date;
    }

    pub fn set_departure_time(&mut self, time: Option<i64>) {
        self.departure_time = time;
    }

    /// Forward-only step change. `Completed` is never a legal target; the
    /// canonical end of a trip is a reset to step 1.
    pub fn advance_step(&mut self, target: BookingStep) -> Result<(), BookingError> {
        if target <= self.step || target == BookingStep::Completed {
            return Err(BookingError::IllegalTransition {
                from: self.step,
                to: target,
            });
        }
        self.step = target;
        Ok(())
    }

    /// Unconditionally returns to step 1 and clears every field.
    pub fn reset_booking_flow(&mut self) {
        *self = Self::default();
    }

    /// Restores a persisted snapshot. Step 5/6 snapshots are accepted here;
    /// the recovery monitor decides whether they are still legitimate.
    pub(crate) fn restore(
        step: BookingStep,
        departure: Option<StationId>,
        arrival: Option<StationId>,
        date_time_confirmed: bool,
        departure_date: Option<i64>,
        departure_time: Option<i64>,
    ) -> Self {
        let mut state = Self {
            step,
            departure_station_id: departure,
            arrival_station_id: arrival,
            departure_date,
            departure_time,
            date_time_confirmed,
        };
        // A corrupt snapshot must not resurrect an invariant violation.
        if state.departure_station_id.is_some()
            && state.departure_station_id == state.arrival_station_id
        {
            state.arrival_station_id = None;
            if state.step > BookingStep::SelectingArrival {
                state.step = BookingStep::SelectingArrival;
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selecting_departure_advances_to_confirmation() {
        let mut state = BookingState::default();
        state.select_departure(StationId(5)).expect("select");
        assert_eq!(state.step(), BookingStep::ConfirmingDeparture);
        assert_eq!(state.departure_station_id(), Some(StationId(5)));
    }

    #[test]
    fn reselecting_departure_keeps_step_two() {
        let mut state = BookingState::default();
        state.select_departure(StationId(5)).expect("select");
        state.select_departure(StationId(7)).expect("reselect");
        assert_eq!(state.step(), BookingStep::ConfirmingDeparture);
        assert_eq!(state.departure_station_id(), Some(StationId(7)));
    }

    #[test]
    fn departure_matching_arrival_is_rejected_unchanged() {
        let mut state = BookingState::restore(
            BookingStep::ConfirmingDeparture,
            None,
            Some(StationId(5)),
            false,
            None,
            None,
        );
        let before = state.clone();
        assert_eq!(
            state.select_departure(StationId(5)),
            Err(BookingError::SameStation)
        );
        assert_eq!(state, before, "rejection must leave state untouched");
    }

    #[test]
    fn arrival_matching_departure_is_rejected() {
        let mut state = BookingState::default();
        state.select_departure(StationId(3)).expect("departure");
        state
            .advance_step(BookingStep::SelectingArrival)
            .expect("advance");
        assert_eq!(
            state.select_arrival(StationId(3)),
            Err(BookingError::SameStation)
        );
        assert_eq!(state.arrival_station_id(), None);
        assert_eq!(state.step(), BookingStep::SelectingArrival);
    }

    #[test]
    fn select_arrival_requires_arrival_phase() {
        let mut state = BookingState::default();
        let err = state.select_arrival(StationId(2)).unwrap_err();
        assert!(matches!(err, BookingError::WrongStep { .. }));
    }

    #[test]
    fn clear_departure_forces_step_one_and_keeps_arrival() {
        let mut state = BookingState::default();
        state.select_departure(StationId(1)).expect("departure");
        state
            .advance_step(BookingStep::SelectingArrival)
            .expect("advance");
        state.select_arrival(StationId(2)).expect("arrival");
        state.clear_arrival().expect("clear arrival");
        state.select_arrival(StationId(2)).expect("arrival again");

        // Step 4 is past the clear_departure window.
        assert!(state.clear_departure().is_err());

        state.clear_arrival().expect("back to step 3");
        state.clear_departure().expect("clear departure");
        assert_eq!(state.step(), BookingStep::SelectingDeparture);
        assert_eq!(state.departure_station_id(), None);
    }

    #[test]
    fn advance_step_is_forward_only_and_never_reaches_completed() {
        let mut state = BookingState::default();
        state.select_departure(StationId(1)).expect("departure");
        state
            .advance_step(BookingStep::SelectingArrival)
            .expect("forward");
        assert!(state.advance_step(BookingStep::SelectingDeparture).is_err());
        assert!(state.advance_step(BookingStep::SelectingArrival).is_err());
        assert_eq!(
            state.advance_step(BookingStep::Completed),
            Err(BookingError::IllegalTransition {
                from: BookingStep::SelectingArrival,
                to: BookingStep::Completed,
            })
        );
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = BookingState::default();
        state.select_departure(StationId(1)).expect("departure");
        state.confirm_date_time(true);
        state.set_departure_date(Some(1_700_000_000_000));
        state.reset_booking_flow();
        assert_eq!(state, BookingState::default());
    }

    #[test]
    fn restore_drops_duplicate_station_pair() {
        let state = BookingState::restore(
            BookingStep::ConfirmingArrival,
            Some(StationId(5)),
            Some(StationId(5)),
            true,
            None,
            None,
        );
        assert_eq!(state.departure_station_id(), Some(StationId(5)));
        assert_eq!(state.arrival_station_id(), None);
        assert_eq!(state.step(), BookingStep::SelectingArrival);
    }

    #[test]
    fn step_numbers_round_trip() {
        for n in 1..=6u8 {
            let step = BookingStep::from_number(n).expect("valid step");
            assert_eq!(step.as_number(), n);
        }
        assert_eq!(BookingStep::from_number(0), None);
        assert_eq!(BookingStep::from_number(7), None);
    }
}
