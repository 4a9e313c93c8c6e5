//! Shared fixtures for tests and demos.
//!
//! The station set is a small Hong Kong Island / Kowloon layout with real
//! coordinates, so distance-ordered assertions stay human-checkable.

use crate::geo::LatLng;
use crate::session::SessionParams;
use crate::stations::Station;

/// Central pier area, the usual test reference point.
pub fn central_point() -> LatLng {
    LatLng::new(22.2855, 114.1577)
}

/// Four stations at increasing distance from [`central_point`]. Station 3
/// (Causeway Bay) holds a vehicle and serves as the dispatch hub.
pub fn test_stations() -> Vec<Station> {
    vec![
        Station::new(1, 22.2820, 114.1588, "Admiralty"),
        Station::new(2, 22.2783, 114.1747, "Wan Chai"),
        Station::new(3, 22.2800, 114.1860, "Causeway Bay").with_virtual_car(),
        Station::new(4, 22.2988, 114.1722, "Tsim Sha Tsui"),
    ]
}

/// Params with the test stations, fixed latency and a zero debounce-friendly
/// seed. Tests override what they care about through the builder methods.
pub fn test_params() -> SessionParams {
    SessionParams::default()
        .with_stations(test_stations())
        .with_fixed_latency_ms(150)
        .with_seed(42)
}
