//! Pluggable mapping providers: trait abstraction for the route/geocode
//! boundary.
//!
//! Implementations, selectable via [`RouteProviderKind`]:
//!
//! - **`GreatCircleRouteProvider`**: haversine distance + free-flow duration
//!   estimate. Zero dependencies, always available.
//! - **`FixedRouteProvider`**: in-memory route/place tables, for tests.
//! - **`OsrmRouteProvider`** (feature `osrm`): calls an OSRM HTTP endpoint,
//!   optionally paired with a Nominatim-style geocoder.
//!
//! The provider is stored as a `Box<dyn RouteProvider>` ECS resource. The
//! [`CachedRouteProvider`] wrapper memoizes results per coordinate pair.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use bevy_ecs::prelude::Resource;
use lru::LruCache;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::geo::{distance_km, estimate_drive_seconds, LatLng};

/// A fetched route between two coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub distance_meters: u32,
    pub duration_seconds: u32,
    pub polyline: String,
}

impl Route {
    /// Synthesizes a straight-line route between two points at free-flow city
    /// speed. Used when no road network backs the provider.
    pub fn great_circle(origin: LatLng, destination: LatLng) -> Self {
        let km = distance_km(origin, destination);
        Self {
            distance_meters: (km * 1000.0).round() as u32,
            duration_seconds: estimate_drive_seconds(km),
            polyline: format!(
                "{:.5},{:.5};{:.5},{:.5}",
                origin.lat, origin.lng, destination.lat, destination.lng
            ),
        }
    }
}

/// Which mapping backend to use.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RouteProviderKind {
    /// Haversine estimate, zero external dependencies.
    #[default]
    GreatCircle,
    /// OSRM HTTP endpoint (e.g. `"http://localhost:5000"`).
    #[cfg(feature = "osrm")]
    Osrm { endpoint: String },
}

/// The mapping/geocoding boundary. Implementations must be `Send + Sync` so
/// the provider can be stored as a shared ECS resource. Failure is expressed
/// as `None`; the route cache leaves the entry unset rather than poisoning it.
pub trait RouteProvider: Send + Sync {
    fn route(&self, origin: LatLng, destination: LatLng) -> Option<Route>;

    /// Resolves a free-form address query to coordinates. Providers without a
    /// geocoder report `None`.
    fn geocode(&self, query: &str) -> Option<LatLng> {
        let _ = query;
        None
    }
}

/// ECS resource wrapping a boxed mapping provider.
#[derive(Resource)]
pub struct RouteProviderResource(pub Box<dyn RouteProvider>);

/// Straight-line provider: always succeeds, never geocodes.
pub struct GreatCircleRouteProvider;

impl RouteProvider for GreatCircleRouteProvider {
    fn route(&self, origin: LatLng, destination: LatLng) -> Option<Route> {
        Some(Route::great_circle(origin, destination))
    }
}

/// Coordinates quantized to ~0.1 m so they can key hash maps.
fn quantize(point: LatLng) -> (i64, i64) {
    (
        (point.lat * 1e6).round() as i64,
        (point.lng * 1e6).round() as i64,
    )
}

/// In-memory provider for tests: routes and places are looked up in tables,
/// anything absent is a failed fetch.
#[derive(Default)]
pub struct FixedRouteProvider {
    routes: HashMap<((i64, i64), (i64, i64)), Route>,
    places: HashMap<String, LatLng>,
}

impl FixedRouteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_route(&mut self, origin: LatLng, destination: LatLng, route: Route) {
        self.routes
            .insert((quantize(origin), quantize(destination)), route);
    }

    pub fn insert_place(&mut self, query: &str, point: LatLng) {
        self.places.insert(query.to_string(), point);
    }
}

impl RouteProvider for FixedRouteProvider {
    fn route(&self, origin: LatLng, destination: LatLng) -> Option<Route> {
        self.routes
            .get(&(quantize(origin), quantize(destination)))
            .cloned()
    }

    fn geocode(&self, query: &str) -> Option<LatLng> {
        self.places.get(query).copied()
    }
}

// ---------------------------------------------------------------------------
// OSRM provider (behind `osrm` feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "osrm")]
pub mod osrm {
    use super::*;
    use reqwest::blocking::Client;
    use std::time::Duration;

    /// Routes via an OSRM HTTP endpoint; geocodes via an optional
    /// Nominatim-compatible search endpoint.
    pub struct OsrmRouteProvider {
        client: Client,
        endpoint: String,
        geocode_endpoint: Option<String>,
    }

    impl OsrmRouteProvider {
        pub fn new(endpoint: &str) -> Self {
            let client = Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build HTTP client");
            Self {
                client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                geocode_endpoint: None,
            }
        }

        pub fn with_geocoder(mut self, endpoint: &str) -> Self {
            self.geocode_endpoint = Some(endpoint.trim_end_matches('/').to_string());
            self
        }
    }

    /// Minimal OSRM JSON response structures.
    #[derive(Deserialize)]
    struct OsrmResponse {
        code: String,
        routes: Option<Vec<OsrmRoute>>,
    }

    #[derive(Deserialize)]
    struct OsrmRoute {
        distance: f64, // metres
        duration: f64, // seconds
        geometry: String,
    }

    #[derive(Deserialize)]
    struct NominatimPlace {
        lat: String,
        lon: String,
    }

    impl RouteProvider for OsrmRouteProvider {
        fn route(&self, origin: LatLng, destination: LatLng) -> Option<Route> {
            let url = format!(
                "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=polyline",
                self.endpoint, origin.lng, origin.lat, destination.lng, destination.lat,
            );

            let resp: OsrmResponse = match self.client.get(&url).send() {
                Ok(r) => match r.json() {
                    Ok(j) => j,
                    Err(_) => return None,
                },
                Err(_) => return None,
            };

            if resp.code != "Ok" {
                return None;
            }

            let route = resp.routes?.into_iter().next()?;
            Some(Route {
                distance_meters: route.distance.round() as u32,
                duration_seconds: route.duration.round() as u32,
                polyline: route.geometry,
            })
        }

        fn geocode(&self, query: &str) -> Option<LatLng> {
            let endpoint = self.geocode_endpoint.as_ref()?;
            let url = format!("{}/search?q={}&format=json&limit=1", endpoint, query);
            let places: Vec<NominatimPlace> = match self.client.get(&url).send() {
                Ok(r) => match r.json() {
                    Ok(j) => j,
                    Err(_) => return None,
                },
                Err(_) => return None,
            };
            let place = places.into_iter().next()?;
            let lat = place.lat.parse::<f64>().ok()?;
            let lng = place.lon.parse::<f64>().ok()?;
            Some(LatLng::new(lat, lng))
        }
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

/// LRU-cached wrapper around any [`RouteProvider`].
///
/// Cache key is the quantized coordinate pair (directional). On cache miss the
/// inner provider is queried; failures are not cached, so the next trigger
/// retries.
pub struct CachedRouteProvider {
    inner: Box<dyn RouteProvider>,
    cache: Mutex<LruCache<((i64, i64), (i64, i64)), Route>>,
}

impl CachedRouteProvider {
    pub fn new(inner: Box<dyn RouteProvider>, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }
}

impl RouteProvider for CachedRouteProvider {
    fn route(&self, origin: LatLng, destination: LatLng) -> Option<Route> {
        let key = (quantize(origin), quantize(destination));

        {
            let mut cache = self.cache.lock().ok()?;
            if let Some(cached) = cache.get(&key) {
                return Some(cached.clone());
            }
        }

        let result = self.inner.route(origin, destination);
        if let Some(ref route) = result {
            if let Ok(mut cache) = self.cache.lock() {
                cache.put(key, route.clone());
            }
        }
        result
    }

    fn geocode(&self, query: &str) -> Option<LatLng> {
        self.inner.geocode(query)
    }
}

/// Default provider-level memoization capacity.
const DEFAULT_PROVIDER_CACHE_CAPACITY: usize = 1_000;

/// Construct a boxed [`RouteProvider`] from a [`RouteProviderKind`] descriptor.
pub fn build_route_provider(kind: &RouteProviderKind) -> Box<dyn RouteProvider> {
    match kind {
        RouteProviderKind::GreatCircle => Box::new(GreatCircleRouteProvider),

        #[cfg(feature = "osrm")]
        RouteProviderKind::Osrm { endpoint } => {
            let inner = Box::new(osrm::OsrmRouteProvider::new(endpoint));
            Box::new(CachedRouteProvider::new(
                inner,
                DEFAULT_PROVIDER_CACHE_CAPACITY,
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated network latency
// ---------------------------------------------------------------------------

/// Delay between issuing a request and its response event arriving. Seeded for
/// reproducibility; `fixed` keeps tests exact.
#[derive(Debug, Resource)]
pub struct LatencyModel {
    min_ms: u64,
    max_ms: u64,
    rng: StdRng,
}

impl LatencyModel {
    pub fn fixed(ms: u64) -> Self {
        Self {
            min_ms: ms,
            max_ms: ms,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn jittered(min_ms: u64, max_ms: u64, seed: u64) -> Self {
        debug_assert!(min_ms <= max_ms, "latency range must be ordered");
        Self {
            min_ms,
            max_ms,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn sample(&mut self) -> u64 {
        if self.min_ms == self.max_ms {
            self.min_ms
        } else {
            self.rng.gen_range(self.min_ms..=self.max_ms)
        }
    }
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self::fixed(150)
    }
}
