#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use booking_core::billing::ScriptedGateway;
use booking_core::geo::LatLng;
use booking_core::routing::{Route, RouteProvider};
use booking_core::session::{build_session, SessionController, SessionParams};
use booking_core::test_helpers::test_params;

/// Great-circle provider that records every routing call.
pub struct CountingProvider {
    pub calls: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<(LatLng, LatLng)>>>,
}

impl CountingProvider {
    pub fn new() -> (Self, Arc<AtomicUsize>, Arc<Mutex<Vec<(LatLng, LatLng)>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: calls.clone(),
                requests: requests.clone(),
            },
            calls,
            requests,
        )
    }
}

impl RouteProvider for CountingProvider {
    fn route(&self, origin: LatLng, destination: LatLng) -> Option<Route> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((origin, destination));
        }
        Some(Route::great_circle(origin, destination))
    }
}

/// Provider whose every fetch fails.
pub struct FailingProvider;

impl RouteProvider for FailingProvider {
    fn route(&self, _origin: LatLng, _destination: LatLng) -> Option<Route> {
        None
    }
}

/// Session over the standard test stations with a scripted gateway the test
/// keeps a handle to.
pub fn controller_with_gateway() -> (SessionController, Arc<ScriptedGateway>) {
    let gateway = Arc::new(ScriptedGateway::always_approving());
    let controller =
        build_session(test_params().with_payment_gateway(Box::new(gateway.clone())));
    (controller, gateway)
}

pub fn controller_with_params(params: SessionParams) -> (SessionController, Arc<ScriptedGateway>) {
    let gateway = Arc::new(ScriptedGateway::always_approving());
    let controller = build_session(params.with_payment_gateway(Box::new(gateway.clone())));
    (controller, gateway)
}
