//! Stations and the read-mostly station cache.
//!
//! The directory is loaded once per session and refreshed wholesale by the
//! external data source. Ranking results are memoized per reference point so
//! re-reads never recompute unless the reference actually moved.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::geo::{distance_km, LatLng};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StationId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: StationId,
    pub position: LatLng,
    pub name: String,
    pub address: String,
    /// Typical dispatch wait at this station, when known.
    pub wait_minutes: Option<u32>,
    /// A vehicle is already co-located here; picking this station skips dispatch.
    pub has_virtual_car: bool,
}

impl Station {
    pub fn new(id: u32, lat: f64, lng: f64, name: &str) -> Self {
        Self {
            id: StationId(id),
            position: LatLng::new(lat, lng),
            name: name.to_string(),
            address: String::new(),
            wait_minutes: None,
            has_virtual_car: false,
        }
    }

    pub fn with_virtual_car(mut self) -> Self {
        self.has_virtual_car = true;
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    pub fn with_wait_minutes(mut self, minutes: u32) -> Self {
        self.wait_minutes = Some(minutes);
        self
    }
}

/// Sorts stations ascending by great-circle distance to `reference`.
/// Ties break on station id so the order is deterministic.
pub fn rank_stations(stations: &[Station], reference: LatLng) -> Vec<Station> {
    let mut ranked: Vec<Station> = stations.to_vec();
    ranked.sort_by(|a, b| {
        distance_km(a.position, reference)
            .total_cmp(&distance_km(b.position, reference))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

#[derive(Debug, Default, Resource)]
pub struct StationDirectory {
    stations: Vec<Station>,
    by_id: HashMap<StationId, usize>,
    /// Last ranking reference point and the resulting order.
    ranked: Option<(LatLng, Vec<StationId>)>,
}

impl StationDirectory {
    pub fn new(stations: Vec<Station>) -> Self {
        let by_id = stations
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
        Self {
            stations,
            by_id,
            ranked: None,
        }
    }

    pub fn get(&self, id: StationId) -> Option<&Station> {
        self.by_id.get(&id).map(|&i| &self.stations[i])
    }

    pub fn contains(&self, id: StationId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Replaces the whole directory (periodic re-fetch from the external
    /// source) and drops the memoized ranking.
    pub fn replace_all(&mut self, stations: Vec<Station>) {
        *self = Self::new(stations);
    }

    /// Station ids ordered by proximity to `reference`. The order is memoized
    /// and only recomputed when the reference point changes.
    pub fn ranked_from(&mut self, reference: LatLng) -> &[StationId] {
        let stale = match &self.ranked {
            Some((cached_ref, _)) => *cached_ref != reference,
            None => true,
        };
        if stale {
            let order = rank_stations(&self.stations, reference)
                .into_iter()
                .map(|s| s.id)
                .collect();
            self.ranked = Some((reference, order));
        }
        self.ranked
            .as_ref()
            .map(|(_, order)| order.as_slice())
            .unwrap_or(&[])
    }

    /// Nearest station holding a vehicle, excluding `departure` itself. This is
    /// the dispatch origin when the chosen departure has no co-located vehicle.
    pub fn nearest_vehicle_hub(&self, departure: StationId) -> Option<StationId> {
        let target = self.get(departure)?.position;
        self.stations
            .iter()
            .filter(|s| s.has_virtual_car && s.id != departure)
            .min_by(|a, b| {
                distance_km(a.position, target)
                    .total_cmp(&distance_km(b.position, target))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|s| s.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_stations() -> Vec<Station> {
        vec![
            Station::new(1, 22.28, 114.15, "Harbour"),
            Station::new(2, 22.30, 114.17, "Uptown"),
        ]
    }

    #[test]
    fn ranks_by_distance_to_reference() {
        let ranked = rank_stations(&two_stations(), LatLng::new(22.28, 114.15));
        assert_eq!(ranked[0].id, StationId(1));
        assert_eq!(ranked[1].id, StationId(2));

        let ranked = rank_stations(&two_stations(), LatLng::new(22.30, 114.17));
        assert_eq!(ranked[0].id, StationId(2));
    }

    #[test]
    fn equidistant_stations_rank_by_id() {
        let stations = vec![
            Station::new(9, 22.30, 114.17, "B"),
            Station::new(4, 22.30, 114.17, "A"),
        ];
        let ranked = rank_stations(&stations, LatLng::new(22.28, 114.15));
        assert_eq!(ranked[0].id, StationId(4));
        assert_eq!(ranked[1].id, StationId(9));
    }

    #[test]
    fn directory_memoizes_ranking_per_reference() {
        let mut directory = StationDirectory::new(two_stations());
        let reference = LatLng::new(22.28, 114.15);

        let first: Vec<StationId> = directory.ranked_from(reference).to_vec();
        assert_eq!(first, vec![StationId(1), StationId(2)]);

        // Same reference reuses the cached order.
        let again: Vec<StationId> = directory.ranked_from(reference).to_vec();
        assert_eq!(first, again);

        // Moving the reference recomputes.
        let moved: Vec<StationId> = directory
            .ranked_from(LatLng::new(22.30, 114.17))
            .to_vec();
        assert_eq!(moved, vec![StationId(2), StationId(1)]);
    }

    #[test]
    fn nearest_vehicle_hub_skips_departure_itself() {
        let stations = vec![
            Station::new(1, 22.28, 114.15, "Harbour").with_virtual_car(),
            Station::new(2, 22.285, 114.155, "Midline").with_virtual_car(),
            Station::new(3, 22.30, 114.17, "Uptown"),
        ];
        let directory = StationDirectory::new(stations);

        assert_eq!(
            directory.nearest_vehicle_hub(StationId(1)),
            Some(StationId(2))
        );
        assert_eq!(
            directory.nearest_vehicle_hub(StationId(3)),
            Some(StationId(2))
        );
    }

    #[test]
    fn nearest_vehicle_hub_none_without_vehicles() {
        let directory = StationDirectory::new(two_stations());
        assert_eq!(directory.nearest_vehicle_hub(StationId(1)), None);
    }
}
