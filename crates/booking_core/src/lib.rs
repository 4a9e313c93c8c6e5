pub mod billing;
pub mod booking;
pub mod clock;
pub mod geo;
pub mod route_cache;
pub mod routing;
pub mod session;
pub mod snapshot;
pub mod stations;
pub mod systems;
pub mod telemetry;
pub mod verification;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
