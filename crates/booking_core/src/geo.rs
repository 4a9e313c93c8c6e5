//! Great-circle distance and proximity estimates.
//!
//! `distance_km` is the haversine formula with the conventional 6371 km Earth
//! radius. The walk/drive estimates are deliberately simple linear models used
//! for sorting and display, not routed travel times.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Walking pace used for proximity display: 12 min per km (~5 km/h).
pub const WALK_MINUTES_PER_KM: f64 = 12.0;

/// Free-flow city driving speed used for duration estimates.
pub const DRIVE_SPEED_KMH: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Haversine distance between two coordinates in kilometres.
pub fn distance_km(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Walking time estimate: `round(distance_km * 12)` minutes.
pub fn estimate_walk_minutes(distance_km: f64) -> u32 {
    (distance_km * WALK_MINUTES_PER_KM).round() as u32
}

/// Driving time estimate at free-flow city speed, in minutes.
pub fn estimate_drive_minutes(distance_km: f64) -> u32 {
    (distance_km / DRIVE_SPEED_KMH * 60.0).round() as u32
}

/// Driving time estimate in seconds, used when synthesizing a route without a
/// road network behind it.
pub fn estimate_drive_seconds(distance_km: f64) -> u32 {
    (distance_km / DRIVE_SPEED_KMH * 3600.0).round() as u32
}
