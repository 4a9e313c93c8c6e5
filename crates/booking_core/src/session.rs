//! Session controller: owns the world and the schedule, and is the only
//! writer of booking state.
//!
//! Every operation named by the booking flow lives here as a method; callers
//! never touch resources directly. Asynchronous work (debounced fetches,
//! network responses, trip ticks) is popped from [`SessionClock`] and routed
//! into the event-gated systems, one event at a time, so no two mutations
//! ever interleave.

use bevy_ecs::prelude::{Res, Schedule, World};
use bevy_ecs::schedule::IntoSystemConfigs;

use crate::billing::{
    ChargeReceipt, FareSchedule, PaymentGateway, PaymentGatewayResource, ScriptedGateway,
    TripSession,
};
use crate::booking::{BookingError, BookingState, BookingStep};
use crate::clock::{CurrentEvent, EventKind, EventSubject, SessionClock, ONE_SEC_MS};
use crate::geo::LatLng;
use crate::route_cache::{RouteCache, RouteKey, RouteLeg, DEBOUNCE_MS};
use crate::routing::{
    build_route_provider, LatencyModel, Route, RouteProvider, RouteProviderKind,
    RouteProviderResource,
};
use crate::snapshot::{
    BookingSnapshot, InMemorySnapshotStore, SnapshotStore, SnapshotStoreResource,
};
use crate::stations::{Station, StationDirectory, StationId};
use crate::systems::recovery::session_restore_system;
use crate::systems::route_debounce::route_debounce_fired_system;
use crate::systems::route_response::route_response_system;
use crate::systems::trip_tick::trip_tick_system;
use crate::telemetry::{
    ChargePurpose, ChargeRecord, CompletedTripRecord, SessionNotice, SessionTelemetry,
    SessionWarning,
};
use crate::verification::{VerificationGate, VerificationGates};

/// Who the session belongs to, and whether they are signed in. The recovery
/// monitor only repairs signed-in sessions.
#[derive(Debug, Clone, bevy_ecs::prelude::Resource)]
pub struct SessionAuth {
    pub user_id: String,
    pub signed_in: bool,
}

/// Parameters for building a booking session.
pub struct SessionParams {
    pub user_id: String,
    pub signed_in: bool,
    pub stations: Vec<Station>,
    pub fare: FareSchedule,
    pub debounce_ms: u64,
    /// Simulated network latency range in ms; equal bounds mean fixed.
    pub latency_ms: (u64, u64),
    /// Seed for latency jitter, for reproducibility.
    pub seed: u64,
    /// Which mapping backend to build when no provider is injected.
    pub provider_kind: RouteProviderKind,
    pub route_provider: Option<Box<dyn RouteProvider>>,
    pub payment_gateway: Option<Box<dyn PaymentGateway>>,
    pub snapshot_store: Option<Box<dyn SnapshotStore>>,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            user_id: "user-1".to_string(),
            signed_in: true,
            stations: Vec::new(),
            fare: FareSchedule::default(),
            debounce_ms: DEBOUNCE_MS,
            latency_ms: (150, 150),
            seed: 0,
            provider_kind: RouteProviderKind::default(),
            route_provider: None,
            payment_gateway: None,
            snapshot_store: None,
        }
    }
}

impl SessionParams {
    pub fn with_stations(mut self, stations: Vec<Station>) -> Self {
        self.stations = stations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_fare(mut self, fare: FareSchedule) -> Self {
        self.fare = fare;
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_fixed_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = (latency_ms, latency_ms);
        self
    }

    pub fn with_latency_range_ms(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_ms = (min_ms, max_ms);
        self
    }

    pub fn with_route_provider(mut self, provider: Box<dyn RouteProvider>) -> Self {
        self.route_provider = Some(provider);
        self
    }

    pub fn with_payment_gateway(mut self, gateway: Box<dyn PaymentGateway>) -> Self {
        self.payment_gateway = Some(gateway);
        self
    }

    pub fn with_snapshot_store(mut self, store: Box<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    pub fn signed_out(mut self) -> Self {
        self.signed_in = false;
        self
    }
}

// Condition functions for each event kind.
fn is_session_started(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::SessionStarted)
        .unwrap_or(false)
}

fn is_route_debounce_fired(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RouteDebounceFired)
        .unwrap_or(false)
}

fn is_route_response(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RouteResponse)
        .unwrap_or(false)
}

fn is_trip_tick(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::TripTick)
        .unwrap_or(false)
}

/// Builds the session schedule: all event-reacting systems, each gated on its
/// event kind so only the relevant one runs per step.
pub fn session_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((
        session_restore_system.run_if(is_session_started),
        route_debounce_fired_system.run_if(is_route_debounce_fired),
        route_response_system.run_if(is_route_response),
        trip_tick_system.run_if(is_trip_tick),
    ));
    schedule
}

pub struct SessionController {
    world: World,
    schedule: Schedule,
}

/// Builds a session: inserts all resources, restores the persisted snapshot,
/// runs the recovery monitor over it, and re-issues route fetches the
/// restored state calls for.
pub fn build_session(params: SessionParams) -> SessionController {
    let mut world = World::new();
    world.insert_resource(SessionClock::default());
    world.insert_resource(StationDirectory::new(params.stations));
    world.insert_resource(RouteCache::new(params.debounce_ms));
    world.insert_resource(if params.latency_ms.0 == params.latency_ms.1 {
        LatencyModel::fixed(params.latency_ms.0)
    } else {
        LatencyModel::jittered(params.latency_ms.0, params.latency_ms.1, params.seed)
    });
    world.insert_resource(params.fare);
    world.insert_resource(VerificationGates::default());
    world.insert_resource(SessionTelemetry::default());

    let provider = params
        .route_provider
        .unwrap_or_else(|| build_route_provider(&params.provider_kind));
    world.insert_resource(RouteProviderResource(provider));

    let gateway = params
        .payment_gateway
        .unwrap_or_else(|| Box::new(ScriptedGateway::always_approving()));
    world.insert_resource(PaymentGatewayResource(gateway));

    let store = params
        .snapshot_store
        .unwrap_or_else(|| Box::new(InMemorySnapshotStore::new()));

    // The snapshot is read exactly once, here. A snapshot that fails to load
    // or decode starts the flow over rather than failing the session.
    let booking = match store.load() {
        Ok(Some(snapshot)) => snapshot.restore().unwrap_or_default(),
        _ => BookingState::default(),
    };
    world.insert_resource(booking);
    world.insert_resource(SnapshotStoreResource(store));
    world.insert_resource(SessionAuth {
        user_id: params.user_id,
        signed_in: params.signed_in,
    });

    world
        .resource_mut::<SessionClock>()
        .schedule_at(0, EventKind::SessionStarted, None);

    let mut controller = SessionController {
        world,
        schedule: session_schedule(),
    };
    // Let the recovery monitor judge the restored state before anything else
    // happens, then re-request whatever routes the surviving state needs.
    controller.run_next_event();
    controller.refresh_route_requests();
    controller
}

impl SessionController {
    // -- booking step machine operations -----------------------------------

    /// Legal in steps 1-2. Rejections surface as telemetry warnings and leave
    /// the state untouched.
    pub fn select_departure(&mut self, id: StationId) -> Result<(), BookingError> {
        if !self.world.resource::<StationDirectory>().contains(id) {
            return Err(BookingError::UnknownStation(id));
        }
        let result = self
            .world
            .resource_mut::<BookingState>()
            .select_departure(id);
        match result {
            Ok(()) => {
                self.refresh_route_requests();
                self.persist();
                Ok(())
            }
            Err(err) => {
                self.note_rejection(&err, Some(id));
                Err(err)
            }
        }
    }

    /// Legal in steps 3-4.
    pub fn select_arrival(&mut self, id: StationId) -> Result<(), BookingError> {
        if !self.world.resource::<StationDirectory>().contains(id) {
            return Err(BookingError::UnknownStation(id));
        }
        let result = self.world.resource_mut::<BookingState>().select_arrival(id);
        match result {
            Ok(()) => {
                self.refresh_route_requests();
                self.persist();
                Ok(())
            }
            Err(err) => {
                self.note_rejection(&err, Some(id));
                Err(err)
            }
        }
    }

    /// Unsets the departure and returns to step 1; the dispatch route is
    /// invalidated along with any fetch still in its quiet window.
    pub fn clear_departure(&mut self) -> Result<(), BookingError> {
        if let Err(err) = self.world.resource_mut::<BookingState>().clear_departure() {
            self.note_rejection(&err, None);
            return Err(err);
        }
        self.refresh_route_requests();
        self.persist();
        Ok(())
    }

    /// Unsets the arrival and returns to step 3; the trip route is invalidated.
    pub fn clear_arrival(&mut self) -> Result<(), BookingError> {
        if let Err(err) = self.world.resource_mut::<BookingState>().clear_arrival() {
            self.note_rejection(&err, None);
            return Err(err);
        }
        self.refresh_route_requests();
        self.persist();
        Ok(())
    }

    pub fn confirm_date_time(&mut self, confirmed: bool) {
        self.world
            .resource_mut::<BookingState>()
            .confirm_date_time(confirmed);
        self.persist();
    }

    pub fn set_departure_date(&mut self, date: Option<i64>) {
        self.world
            .resource_mut::<BookingState>()
            .set_departure_date(date);
        self.persist();
    }

    pub fn set_departure_time(&mut self, time: Option<i64>) {
        self.world
            .resource_mut::<BookingState>()
            .set_departure_time(time);
        self.persist();
    }

    /// Forward-only step change. Advancing into step 5 goes through
    /// [`Self::begin_trip`] so the starting fare is always charged first.
    pub fn advance_step(&mut self, target: BookingStep) -> Result<(), BookingError> {
        if target == BookingStep::TripActive {
            return self.begin_trip();
        }
        if let Err(err) = self.world.resource_mut::<BookingState>().advance_step(target) {
            self.note_rejection(&err, None);
            return Err(err);
        }
        self.refresh_route_requests();
        self.persist();
        Ok(())
    }

    /// Unconditionally returns to step 1, clearing stations, routes and any
    /// trip session, and persists the cleared snapshot.
    pub fn reset_booking_flow(&mut self) {
        self.world.remove_resource::<TripSession>();
        self.world
            .resource_mut::<BookingState>()
            .reset_booking_flow();
        self.world.resource_mut::<RouteCache>().clear_all();
        self.persist();
    }

    // -- trip lifecycle ----------------------------------------------------

    /// Step 4 confirmation: pre-charges the flat starting fare, then enters
    /// step 5 with an idle trip session. On charge failure the booking stays
    /// at step 4 so the user can retry without re-selecting stations.
    pub fn begin_trip(&mut self) -> Result<(), BookingError> {
        let step = self.world.resource::<BookingState>().step();
        if step != BookingStep::ConfirmingArrival {
            let err = BookingError::WrongStep {
                op: "begin_trip",
                step,
            };
            self.note_rejection(&err, None);
            return Err(err);
        }

        let base_fare = self.world.resource::<FareSchedule>().base_fare_cents;
        self.charge(ChargePurpose::TripStart, base_fare)?;

        self.world
            .resource_mut::<BookingState>()
            .advance_step(BookingStep::TripActive)?;
        let now = self.world.resource::<SessionClock>().now();
        let verification = self.world.resource::<VerificationGates>().snapshot();
        self.world.insert_resource(TripSession::new(now, verification));
        self.persist();
        Ok(())
    }

    /// Starts the usage timer. Idempotent: a second call while already
    /// unlocked is a no-op. Blocked until all verification gates pass.
    pub fn unlock(&mut self) -> Result<(), BookingError> {
        let Some(session) = self.world.get_resource::<TripSession>() else {
            return Err(BookingError::NoActiveTrip);
        };
        if session.is_unlocked() {
            return Ok(());
        }
        if !self.world.resource::<VerificationGates>().is_complete() {
            return Err(BookingError::VerificationIncomplete);
        }

        let now = self.world.resource::<SessionClock>().now();
        let generation = {
            let mut session = self.world.resource_mut::<TripSession>();
            session.unlocked_at = Some(now);
            session.ticking = true;
            session.tick_generation
        };
        self.world.resource_mut::<SessionClock>().schedule_in(
            ONE_SEC_MS,
            EventKind::TripTick,
            Some(EventSubject::Tick(generation)),
        );
        Ok(())
    }

    /// Ends the trip: stops the tick, bills started minutes, and on charge
    /// success resets the whole flow to step 1. On failure the trip stays
    /// active (timer stopped) pending a retry of this call.
    pub fn end_trip(&mut self) -> Result<u32, BookingError> {
        let minutes = {
            let Some(mut session) = self.world.get_resource_mut::<TripSession>() else {
                return Err(BookingError::NoActiveTrip);
            };
            session.ticking = false;
            session.tick_generation = session.tick_generation.wrapping_add(1);
            session.minutes_used()
        };

        let usage_fare = self
            .world
            .resource::<FareSchedule>()
            .usage_fare_cents(minutes);
        self.charge(ChargePurpose::TripUsage, usage_fare)?;

        let ended_at = self.world.resource::<SessionClock>().now();
        let session = match self.world.remove_resource::<TripSession>() {
            Some(session) => session,
            None => return Err(BookingError::NoActiveTrip),
        };
        let (departure, arrival) = {
            let booking = self.world.resource::<BookingState>();
            (booking.departure_station_id(), booking.arrival_station_id())
        };
        {
            let mut telemetry = self.world.resource_mut::<SessionTelemetry>();
            telemetry.completed_trips.push(CompletedTripRecord {
                departure,
                arrival,
                unlocked_at: session.unlocked_at,
                ended_at,
                minutes_used: minutes,
                additional_fare_cents: usage_fare,
            });
            telemetry
                .notices
                .push(SessionNotice::TripCompleted { at: ended_at });
        }
        self.reset_booking_flow();
        Ok(usage_fare)
    }

    // -- verification ------------------------------------------------------

    pub fn set_verification_gate(&mut self, gate: VerificationGate, approved: bool) {
        self.world
            .resource_mut::<VerificationGates>()
            .set(gate, approved);
    }

    pub fn verification_gates(&self) -> VerificationGates {
        *self.world.resource::<VerificationGates>()
    }

    // -- station ranking ---------------------------------------------------

    /// Stations ordered by proximity to `reference` (geolocation fix or
    /// reference-point change). Memoized per reference; never touches the
    /// network.
    pub fn ranked_stations(&mut self, reference: LatLng) -> Vec<Station> {
        let ids: Vec<StationId> = self
            .world
            .resource_mut::<StationDirectory>()
            .ranked_from(reference)
            .to_vec();
        let directory = self.world.resource::<StationDirectory>();
        ids.iter()
            .filter_map(|id| directory.get(*id).cloned())
            .collect()
    }

    /// Address search: geocodes the query through the mapping provider and
    /// ranks stations around the hit. `None` when geocoding fails.
    pub fn search_address(&mut self, query: &str) -> Option<Vec<Station>> {
        let point = self
            .world
            .resource::<RouteProviderResource>()
            .0
            .geocode(query)?;
        Some(self.ranked_stations(point))
    }

    // -- reads -------------------------------------------------------------

    pub fn booking(&self) -> &BookingState {
        self.world.resource::<BookingState>()
    }

    pub fn telemetry(&self) -> &SessionTelemetry {
        self.world.resource::<SessionTelemetry>()
    }

    pub fn trip_session(&self) -> Option<&TripSession> {
        self.world.get_resource::<TripSession>()
    }

    pub fn now(&self) -> u64 {
        self.world.resource::<SessionClock>().now()
    }

    /// The fetched departure -> arrival route, if the current station pair
    /// has one.
    pub fn trip_route(&self) -> Option<Route> {
        let booking = self.world.resource::<BookingState>();
        let (dep, arr) = (booking.departure_station_id()?, booking.arrival_station_id()?);
        self.world
            .resource::<RouteCache>()
            .trip_route(dep, arr)
            .cloned()
    }

    /// The current dispatch route (nearest vehicle hub -> departure), if any.
    pub fn dispatch_route(&self) -> Option<Route> {
        self.world
            .resource::<RouteCache>()
            .leg_route(RouteLeg::Dispatch)
            .cloned()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    // -- event pump --------------------------------------------------------

    /// Pops the next event, publishes it as [`CurrentEvent`], and runs the
    /// schedule. Returns `false` when the queue is empty.
    pub fn run_next_event(&mut self) -> bool {
        let event = match self.world.resource_mut::<SessionClock>().pop_next() {
            Some(event) => event,
            None => return false,
        };
        self.world.insert_resource(CurrentEvent(event));
        self.schedule.run(&mut self.world);
        true
    }

    /// Drains the queue (bounded by `max_steps`, since an unlocked trip ticks
    /// forever). Returns the number of events processed.
    pub fn run_until_idle(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && self.run_next_event() {
            steps += 1;
        }
        steps
    }

    /// Processes every event due at or before `until_ms`, leaving later ones
    /// queued. This is how tests let "wall time" pass deterministically.
    pub fn run_until(&mut self, until_ms: u64) -> usize {
        let mut steps = 0;
        loop {
            let due = self
                .world
                .resource::<SessionClock>()
                .next_event_time()
                .map_or(false, |t| t <= until_ms);
            if !due || !self.run_next_event() {
                break;
            }
            steps += 1;
        }
        steps
    }

    // -- internals ---------------------------------------------------------

    /// Reconciles the route cache with the current booking state: each leg
    /// either keeps/refreshes its one desired key or is invalidated outright.
    fn refresh_route_requests(&mut self) {
        let (step, departure, arrival) = {
            let booking = self.world.resource::<BookingState>();
            (
                booking.step(),
                booking.departure_station_id(),
                booking.arrival_station_id(),
            )
        };

        // Dispatch leg: a departure without a co-located vehicle needs one.
        let dispatch_key = departure.and_then(|dep| {
            let directory = self.world.resource::<StationDirectory>();
            match directory.get(dep) {
                Some(station) if station.has_virtual_car => None,
                Some(_) => directory
                    .nearest_vehicle_hub(dep)
                    .map(|hub| RouteKey::dispatch(hub, dep)),
                None => None,
            }
        });
        self.reconcile_leg(RouteLeg::Dispatch, dispatch_key);

        // Trip leg: both ends, once the arrival phase has begun.
        let trip_key = match (departure, arrival) {
            (Some(dep), Some(arr)) if step >= BookingStep::SelectingArrival => {
                Some(RouteKey::trip(dep, arr))
            }
            _ => None,
        };
        self.reconcile_leg(RouteLeg::Trip, trip_key);
    }

    fn reconcile_leg(&mut self, leg: RouteLeg, desired: Option<RouteKey>) {
        match desired {
            Some(key) => {
                let (token, debounce_ms) = {
                    let mut cache = self.world.resource_mut::<RouteCache>();
                    cache.retain_latest_key(leg, key);
                    (cache.request_fetch(key), cache.debounce_ms())
                };
                if let Some(token) = token {
                    self.world.resource_mut::<SessionClock>().schedule_in(
                        debounce_ms,
                        EventKind::RouteDebounceFired,
                        Some(EventSubject::Request(token)),
                    );
                }
            }
            None => {
                self.world.resource_mut::<RouteCache>().invalidate_leg(leg);
            }
        }
    }

    fn charge(
        &mut self,
        purpose: ChargePurpose,
        amount_cents: u32,
    ) -> Result<ChargeReceipt, BookingError> {
        let user_id = self.world.resource::<SessionAuth>().user_id.clone();
        let outcome = self
            .world
            .resource::<PaymentGatewayResource>()
            .0
            .charge(&user_id, amount_cents);
        let at = self.world.resource::<SessionClock>().now();
        match outcome {
            Ok(receipt) => {
                self.world
                    .resource_mut::<SessionTelemetry>()
                    .charges
                    .push(ChargeRecord {
                        purpose,
                        amount_cents,
                        transaction_id: receipt.transaction_id.clone(),
                        at,
                    });
                Ok(receipt)
            }
            Err(err) => {
                self.world
                    .resource_mut::<SessionTelemetry>()
                    .warnings
                    .push(SessionWarning::ChargeFailed {
                        amount_cents,
                        reason: err.to_string(),
                        at,
                    });
                Err(BookingError::Charge(err))
            }
        }
    }

    /// Validation rejections surface as user-facing warnings on top of the
    /// returned error; the state itself is never touched.
    fn note_rejection(&mut self, err: &BookingError, station: Option<StationId>) {
        let at = self.world.resource::<SessionClock>().now();
        let warning = match (err, station) {
            (BookingError::SameStation, Some(station)) => {
                SessionWarning::SameStationRejected { station, at }
            }
            (
                BookingError::WrongStep { .. } | BookingError::IllegalTransition { .. },
                _,
            ) => SessionWarning::OperationRejected {
                reason: err.to_string(),
                at,
            },
            _ => return,
        };
        self.world
            .resource_mut::<SessionTelemetry>()
            .warnings
            .push(warning);
    }

    fn persist(&mut self) {
        let snapshot = BookingSnapshot::capture(self.world.resource::<BookingState>());
        let result = self.world.resource::<SnapshotStoreResource>().0.save(&snapshot);
        if let Err(err) = result {
            let at = self.world.resource::<SessionClock>().now();
            self.world
                .resource_mut::<SessionTelemetry>()
                .warnings
                .push(SessionWarning::PersistenceFailed {
                    reason: err.to_string(),
                    at,
                });
        }
    }
}
