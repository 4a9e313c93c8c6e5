//! One-second trip timer.
//!
//! Each tick increments `elapsed_seconds` and schedules the next tick. A tick
//! is honored only while the session is ticking and the event carries the
//! current generation; ticks left in the queue after `end_trip` are ignored
//! and never reschedule, so the interval cannot leak.

use bevy_ecs::prelude::{Res, ResMut};

use crate::billing::TripSession;
use crate::clock::{CurrentEvent, EventKind, EventSubject, SessionClock, ONE_SEC_MS};

pub fn trip_tick_system(
    mut clock: ResMut<SessionClock>,
    event: Res<CurrentEvent>,
    session: Option<ResMut<TripSession>>,
) {
    if event.0.kind != EventKind::TripTick {
        return;
    }
    let Some(EventSubject::Tick(generation)) = event.0.subject else {
        return;
    };
    let Some(mut session) = session else {
        return;
    };
    if !session.ticking || session.tick_generation != generation || !session.is_unlocked() {
        return;
    }

    session.elapsed_seconds += 1;
    clock.schedule_in(
        ONE_SEC_MS,
        EventKind::TripTick,
        Some(EventSubject::Tick(generation)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::{Schedule, World};

    use crate::verification::VerificationGates;

    fn unlocked_session(now: u64) -> TripSession {
        let mut session = TripSession::new(now, VerificationGates::all_approved().snapshot());
        session.unlocked_at = Some(now);
        session.ticking = true;
        session
    }

    fn run_tick(world: &mut World, timestamp: u64, generation: u32) {
        world.insert_resource(CurrentEvent(crate::clock::Event {
            timestamp,
            kind: EventKind::TripTick,
            subject: Some(EventSubject::Tick(generation)),
        }));
        let mut schedule = Schedule::default();
        schedule.add_systems(trip_tick_system);
        schedule.run(world);
    }

    #[test]
    fn tick_increments_elapsed_and_reschedules() {
        let mut world = World::new();
        world.insert_resource(SessionClock::default());
        world.insert_resource(unlocked_session(0));

        run_tick(&mut world, ONE_SEC_MS, 0);

        assert_eq!(world.resource::<TripSession>().elapsed_seconds, 1);
        let next = world
            .resource_mut::<SessionClock>()
            .pop_next()
            .expect("next tick");
        assert_eq!(next.kind, EventKind::TripTick);
    }

    #[test]
    fn stopped_session_ignores_leftover_ticks() {
        let mut world = World::new();
        world.insert_resource(SessionClock::default());
        let mut session = unlocked_session(0);
        session.ticking = false;
        session.tick_generation = 1;
        world.insert_resource(session);

        // A tick scheduled before the stop still carries generation 0.
        run_tick(&mut world, ONE_SEC_MS, 0);

        assert_eq!(world.resource::<TripSession>().elapsed_seconds, 0);
        assert!(
            world.resource::<SessionClock>().is_empty(),
            "ignored tick must not reschedule"
        );
    }

    #[test]
    fn tick_without_session_is_a_no_op() {
        let mut world = World::new();
        world.insert_resource(SessionClock::default());
        run_tick(&mut world, ONE_SEC_MS, 0);
        assert!(world.resource::<SessionClock>().is_empty());
    }
}
