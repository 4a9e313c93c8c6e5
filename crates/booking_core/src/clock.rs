use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::Resource;

use crate::route_cache::RequestToken;

pub const ONE_SEC_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    /// Session start / reload. Drives the recovery monitor.
    SessionStarted,
    /// A debounced route fetch reached the end of its quiet window.
    RouteDebounceFired,
    /// A route response "arrived" from the mapping provider.
    RouteResponse,
    /// One-second trip timer tick while the vehicle is unlocked.
    TripTick,
}

/// Identifies what an event is about, so systems can ignore events that were
/// superseded after scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventSubject {
    Request(RequestToken),
    Tick(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by timestamp.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.kind.cmp(&self.kind))
            .then_with(|| other.subject.cmp(&self.subject))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event currently being processed. Inserted by the controller before
/// running the schedule; systems read it to decide whether to act.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

/// Session-local event clock: a monotonic millisecond counter plus a min-heap
/// of scheduled callbacks. All asynchronous work (debounce firings, network
/// responses, timer ticks) resolves through this queue in timestamp order,
/// which keeps the whole session single-threaded and deterministic.
#[derive(Debug, Default, Resource)]
pub struct SessionClock {
    now: u64,
    events: BinaryHeap<Event>,
}

impl SessionClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule_at(&mut self, timestamp: u64, kind: EventKind, subject: Option<EventSubject>) {
        debug_assert!(
            timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        self.events.push(Event {
            timestamp,
            kind,
            subject,
        });
    }

    pub fn schedule_in(&mut self, delay_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(self.now + delay_ms, kind, subject);
    }

    pub fn schedule_in_secs(&mut self, delay_secs: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_in(delay_secs * ONE_SEC_MS, kind, subject);
    }

    /// Pops the next event and advances the clock to its timestamp.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|e| e.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
