pub mod recovery;
pub mod route_debounce;
pub mod route_response;
pub mod trip_tick;
