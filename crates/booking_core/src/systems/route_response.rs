//! Applies arrived route responses, discarding stale ones by token.

use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject};
use crate::route_cache::RouteCache;

pub fn route_response_system(event: Res<CurrentEvent>, mut cache: ResMut<RouteCache>) {
    if event.0.kind != EventKind::RouteResponse {
        return;
    }
    let Some(EventSubject::Request(token)) = event.0.subject else {
        return;
    };
    cache.apply_response(token);
}
