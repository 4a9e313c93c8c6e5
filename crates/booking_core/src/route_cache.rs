//! Route cache: debounced fetches, token-ordered responses, station-keyed
//! invalidation.
//!
//! Every fetch request gets a monotonically increasing [`RequestToken`]. A
//! response is applied only when its token is still the latest issued for its
//! key, so a slow stale reply can never overwrite a newer result, whatever
//! order the responses arrive in. Requests sit in a debounce window before
//! they are actually sent; a new request for the same leg within the window
//! supersedes the pending one and the superseded fetch never fires.
//!
//! Entries are invalidated by station-identity change only, never by time.
//! A failed fetch leaves the entry unset rather than poisoning it.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;

use crate::routing::Route;
use crate::stations::StationId;

/// Quiet window before a fetch request actually goes out.
pub const DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(pub u64);

/// Which of the two cached legs a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RouteLeg {
    /// Departure -> arrival.
    Trip,
    /// Nearest vehicle hub -> departure.
    Dispatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub leg: RouteLeg,
    pub origin: StationId,
    pub destination: StationId,
}

impl RouteKey {
    pub fn trip(departure: StationId, arrival: StationId) -> Self {
        Self {
            leg: RouteLeg::Trip,
            origin: departure,
            destination: arrival,
        }
    }

    pub fn dispatch(hub: StationId, departure: StationId) -> Self {
        Self {
            leg: RouteLeg::Dispatch,
            origin: hub,
            destination: departure,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteCacheEntry {
    pub route: Route,
    pub token: RequestToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingFetch {
    key: RouteKey,
    token: RequestToken,
}

#[derive(Debug, Clone, PartialEq)]
struct InFlight {
    key: RouteKey,
    response: Option<Route>,
}

/// Outcome of applying a response, mostly for tests and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Response stored for its key.
    Stored(RouteKey),
    /// Fetch failed; the entry was left unset.
    Failed(RouteKey),
    /// A newer token exists for the key; the response was discarded.
    Stale,
    /// Token unknown (already consumed or invalidated away).
    Unknown,
}

#[derive(Debug, Resource)]
pub struct RouteCache {
    debounce_ms: u64,
    next_token: u64,
    entries: HashMap<RouteKey, RouteCacheEntry>,
    /// Latest token issued per key; the stale-discard reference.
    latest: HashMap<RouteKey, RequestToken>,
    /// At most one request per leg waits out the debounce window.
    debounce: HashMap<RouteLeg, PendingFetch>,
    /// Responses travelling back from the provider, keyed by token.
    in_flight: HashMap<RequestToken, InFlight>,
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new(DEBOUNCE_MS)
    }
}

impl RouteCache {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            next_token: 0,
            entries: HashMap::new(),
            latest: HashMap::new(),
            debounce: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    /// Requests a fetch for `key`. Returns the token to schedule a debounce
    /// event for, or `None` when an identical request is already underway
    /// (still debouncing, or already sent and awaiting its response) and the
    /// caller should share its result. A pending request for the same leg but
    /// a different key is superseded and will never fire.
    pub fn request_fetch(&mut self, key: RouteKey) -> Option<RequestToken> {
        if let Some(pending) = self.debounce.get(&key.leg) {
            if pending.key == key {
                return None;
            }
        }
        // One outstanding request per key: a response already travelling back
        // for this exact key is shared, not raced against.
        if let Some(latest) = self.latest.get(&key) {
            if self.in_flight.contains_key(latest) {
                return None;
            }
        }
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.latest.insert(key, token);
        self.debounce.insert(key.leg, PendingFetch { key, token });
        Some(token)
    }

    /// Consumes the pending fetch when its debounce window elapses. Returns
    /// `None` if the request was superseded or invalidated in the meantime,
    /// in which case nothing must be sent.
    pub fn take_due_fetch(&mut self, token: RequestToken) -> Option<RouteKey> {
        let leg = self
            .debounce
            .iter()
            .find(|(_, pending)| pending.token == token)
            .map(|(leg, _)| *leg)?;
        let pending = self.debounce.remove(&leg)?;
        Some(pending.key)
    }

    /// Records a provider response travelling back. `None` models a failed
    /// fetch. The caller schedules the matching response event.
    pub fn begin_response(&mut self, token: RequestToken, key: RouteKey, response: Option<Route>) {
        self.in_flight.insert(token, InFlight { key, response });
    }

    /// Applies an arrived response. Discards it when a newer token has been
    /// issued for the key since the request went out.
    pub fn apply_response(&mut self, token: RequestToken) -> Applied {
        let Some(in_flight) = self.in_flight.remove(&token) else {
            return Applied::Unknown;
        };
        if self.latest.get(&in_flight.key) != Some(&token) {
            return Applied::Stale;
        }
        match in_flight.response {
            Some(route) => {
                self.entries
                    .insert(in_flight.key, RouteCacheEntry { route, token });
                Applied::Stored(in_flight.key)
            }
            None => {
                // Failure leaves the entry unset; a stale route must not
                // survive behind a failed refresh.
                self.entries.remove(&in_flight.key);
                Applied::Failed(in_flight.key)
            }
        }
    }

    pub fn route_for(&self, key: &RouteKey) -> Option<&Route> {
        self.entries.get(key).map(|entry| &entry.route)
    }

    pub fn trip_route(&self, departure: StationId, arrival: StationId) -> Option<&Route> {
        self.route_for(&RouteKey::trip(departure, arrival))
    }

    pub fn dispatch_route(&self, hub: StationId, departure: StationId) -> Option<&Route> {
        self.route_for(&RouteKey::dispatch(hub, departure))
    }

    /// Any entry stored for the given leg, regardless of key. Consumers that
    /// only care about "the current dispatch route" read through this.
    pub fn leg_route(&self, leg: RouteLeg) -> Option<&Route> {
        self.entries
            .iter()
            .find(|(key, _)| key.leg == leg)
            .map(|(_, entry)| &entry.route)
    }

    /// Drops everything stored for a leg except `keep`. Used when the leg's
    /// desired key changes: old keys are invalidated, while a pending fetch
    /// for `keep` itself survives so identical re-triggers keep coalescing.
    pub fn retain_latest_key(&mut self, leg: RouteLeg, keep: RouteKey) {
        self.entries.retain(|key, _| key.leg != leg || *key == keep);
        self.latest.retain(|key, _| key.leg != leg || *key == keep);
        if let Some(pending) = self.debounce.get(&leg) {
            if pending.key != keep {
                self.debounce.remove(&leg);
            }
        }
    }

    /// Drops everything known for a leg: entries, the pending debounce, and
    /// the latest-token marks (so in-flight responses resolve as stale).
    pub fn invalidate_leg(&mut self, leg: RouteLeg) {
        self.entries.retain(|key, _| key.leg != leg);
        self.latest.retain(|key, _| key.leg != leg);
        self.debounce.remove(&leg);
    }

    pub fn clear_dispatch_route(&mut self) {
        self.invalidate_leg(RouteLeg::Dispatch);
    }

    pub fn clear_trip_route(&mut self) {
        self.invalidate_leg(RouteLeg::Trip);
    }

    pub fn clear_all(&mut self) {
        self.invalidate_leg(RouteLeg::Trip);
        self.invalidate_leg(RouteLeg::Dispatch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLng;

    fn route(meters: u32) -> Route {
        Route {
            distance_meters: meters,
            duration_seconds: meters / 10,
            polyline: String::new(),
        }
    }

    fn key_ab() -> RouteKey {
        RouteKey::trip(StationId(1), StationId(2))
    }

    #[test]
    fn tokens_increase_monotonically() {
        let mut cache = RouteCache::default();
        let t1 = cache.request_fetch(key_ab()).expect("token");
        cache.take_due_fetch(t1).expect("fires");
        let t2 = cache.request_fetch(key_ab()).expect("token");
        assert!(t2 > t1);
    }

    #[test]
    fn same_key_within_window_shares_the_pending_fetch() {
        let mut cache = RouteCache::default();
        let first = cache.request_fetch(key_ab());
        assert!(first.is_some());
        // Second trigger for the identical key coalesces; no new request.
        assert_eq!(cache.request_fetch(key_ab()), None);
    }

    #[test]
    fn superseded_debounce_never_fires() {
        let mut cache = RouteCache::default();
        let to_b = cache.request_fetch(key_ab()).expect("token");
        let to_c = cache
            .request_fetch(RouteKey::trip(StationId(1), StationId(3)))
            .expect("token");

        // Only the (A, C) request is actually sent.
        assert_eq!(cache.take_due_fetch(to_b), None);
        assert_eq!(
            cache.take_due_fetch(to_c),
            Some(RouteKey::trip(StationId(1), StationId(3)))
        );
    }

    #[test]
    fn stale_response_does_not_overwrite_newer_result() {
        let mut cache = RouteCache::default();
        let key = key_ab();

        let first = cache.request_fetch(key).expect("token");
        cache.take_due_fetch(first).expect("fires");
        cache.begin_response(first, key, Some(route(1000)));

        // The leg is re-keyed away and back while the first response still
        // travels, so a fresh request for the original key goes out.
        cache.retain_latest_key(RouteLeg::Trip, RouteKey::trip(StationId(1), StationId(3)));
        let second = cache.request_fetch(key).expect("token");
        cache.take_due_fetch(second).expect("fires");
        cache.begin_response(second, key, Some(route(2000)));

        // Newer response lands first; the older one must be discarded.
        assert_eq!(cache.apply_response(second), Applied::Stored(key));
        assert_eq!(cache.apply_response(first), Applied::Stale);
        assert_eq!(cache.route_for(&key), Some(&route(2000)));
    }

    #[test]
    fn same_key_in_flight_is_shared_not_duplicated() {
        let mut cache = RouteCache::default();
        let key = key_ab();

        let token = cache.request_fetch(key).expect("token");
        cache.take_due_fetch(token).expect("fires");
        cache.begin_response(token, key, Some(route(1000)));

        // Identical re-trigger while the response travels shares it.
        assert_eq!(cache.request_fetch(key), None);

        assert_eq!(cache.apply_response(token), Applied::Stored(key));
        // Resolved; the next trigger may fetch afresh.
        assert!(cache.request_fetch(key).is_some());
    }

    #[test]
    fn failed_fetch_leaves_entry_unset() {
        let mut cache = RouteCache::default();
        let key = key_ab();

        let first = cache.request_fetch(key).expect("token");
        cache.take_due_fetch(first).expect("fires");
        cache.begin_response(first, key, Some(route(1000)));
        assert_eq!(cache.apply_response(first), Applied::Stored(key));

        let second = cache.request_fetch(key).expect("token");
        cache.take_due_fetch(second).expect("fires");
        cache.begin_response(second, key, None);
        assert_eq!(cache.apply_response(second), Applied::Failed(key));
        assert_eq!(cache.route_for(&key), None, "no stale route after failure");
    }

    #[test]
    fn invalidated_leg_discards_in_flight_responses() {
        let mut cache = RouteCache::default();
        let key = RouteKey::dispatch(StationId(7), StationId(1));

        let token = cache.request_fetch(key).expect("token");
        cache.take_due_fetch(token).expect("fires");
        cache.begin_response(token, key, Some(route(500)));

        cache.clear_dispatch_route();
        assert_eq!(cache.apply_response(token), Applied::Stale);
        assert_eq!(cache.route_for(&key), None);
    }

    #[test]
    fn legs_are_independent() {
        let mut cache = RouteCache::default();
        let trip = key_ab();
        let dispatch = RouteKey::dispatch(StationId(7), StationId(1));

        for key in [trip, dispatch] {
            let token = cache.request_fetch(key).expect("token");
            cache.take_due_fetch(token).expect("fires");
            cache.begin_response(token, key, Some(route(1000)));
            cache.apply_response(token);
        }

        cache.clear_dispatch_route();
        assert!(cache.route_for(&trip).is_some());
        assert!(cache.route_for(&dispatch).is_none());
    }

    #[test]
    fn great_circle_routes_store_cleanly() {
        // Smoke check that provider output shapes flow through the cache.
        let mut cache = RouteCache::default();
        let key = key_ab();
        let token = cache.request_fetch(key).expect("token");
        cache.take_due_fetch(token).expect("fires");
        let synthesized =
            Route::great_circle(LatLng::new(22.28, 114.15), LatLng::new(22.30, 114.17));
        cache.begin_response(token, key, Some(synthesized.clone()));
        cache.apply_response(token);
        assert_eq!(cache.trip_route(StationId(1), StationId(2)), Some(&synthesized));
    }
}
