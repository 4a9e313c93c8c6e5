//! Fires debounced route fetches.
//!
//! When a `RouteDebounceFired` event arrives, the pending fetch is consumed
//! if it is still the latest for its leg (otherwise it was superseded and
//! nothing is sent). The provider is queried, the result parked in-flight,
//! and the matching `RouteResponse` scheduled one network latency later.

use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SessionClock};
use crate::route_cache::RouteCache;
use crate::routing::{LatencyModel, RouteProviderResource};
use crate::stations::StationDirectory;

pub fn route_debounce_fired_system(
    mut clock: ResMut<SessionClock>,
    event: Res<CurrentEvent>,
    mut cache: ResMut<RouteCache>,
    mut latency: ResMut<LatencyModel>,
    provider: Res<RouteProviderResource>,
    directory: Res<StationDirectory>,
) {
    if event.0.kind != EventKind::RouteDebounceFired {
        return;
    }
    let Some(EventSubject::Request(token)) = event.0.subject else {
        return;
    };
    let Some(key) = cache.take_due_fetch(token) else {
        // Superseded or invalidated during the quiet window; never sent.
        return;
    };

    let endpoints = directory
        .get(key.origin)
        .map(|s| s.position)
        .zip(directory.get(key.destination).map(|s| s.position));
    let response = match endpoints {
        Some((origin, destination)) => provider.0.route(origin, destination),
        // A station that vanished from the directory is a failed fetch.
        None => None,
    };

    cache.begin_response(token, key, response);
    clock.schedule_in(
        latency.sample(),
        EventKind::RouteResponse,
        Some(EventSubject::Request(token)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::{Schedule, World};

    use crate::route_cache::RouteKey;
    use crate::routing::GreatCircleRouteProvider;
    use crate::stations::{Station, StationId};

    fn world_with_stations() -> World {
        let mut world = World::new();
        world.insert_resource(SessionClock::default());
        world.insert_resource(RouteCache::default());
        world.insert_resource(LatencyModel::fixed(100));
        world.insert_resource(RouteProviderResource(Box::new(GreatCircleRouteProvider)));
        world.insert_resource(StationDirectory::new(vec![
            Station::new(1, 22.28, 114.15, "Harbour"),
            Station::new(2, 22.30, 114.17, "Uptown"),
        ]));
        world
    }

    #[test]
    fn due_fetch_queries_provider_and_schedules_response() {
        let mut world = world_with_stations();
        let key = RouteKey::trip(StationId(1), StationId(2));
        let token = world
            .resource_mut::<RouteCache>()
            .request_fetch(key)
            .expect("token");
        world.insert_resource(CurrentEvent(crate::clock::Event {
            timestamp: 500,
            kind: EventKind::RouteDebounceFired,
            subject: Some(EventSubject::Request(token)),
        }));

        let mut schedule = Schedule::default();
        schedule.add_systems(route_debounce_fired_system);
        schedule.run(&mut world);

        let response = world
            .resource_mut::<SessionClock>()
            .pop_next()
            .expect("response event");
        assert_eq!(response.kind, EventKind::RouteResponse);
        assert_eq!(response.subject, Some(EventSubject::Request(token)));
    }

    #[test]
    fn superseded_fetch_sends_nothing() {
        let mut world = world_with_stations();
        let first = world
            .resource_mut::<RouteCache>()
            .request_fetch(RouteKey::trip(StationId(1), StationId(2)))
            .expect("token");
        // Station change within the quiet window supersedes the fetch.
        world
            .resource_mut::<RouteCache>()
            .request_fetch(RouteKey::trip(StationId(2), StationId(1)))
            .expect("token");

        world.insert_resource(CurrentEvent(crate::clock::Event {
            timestamp: 500,
            kind: EventKind::RouteDebounceFired,
            subject: Some(EventSubject::Request(first)),
        }));

        let mut schedule = Schedule::default();
        schedule.add_systems(route_debounce_fired_system);
        schedule.run(&mut world);

        assert!(
            world.resource::<SessionClock>().is_empty(),
            "superseded fetch must not schedule a response"
        );
    }
}
