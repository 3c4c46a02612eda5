//! Great-circle geometry and the haversine travel estimator.
//!
//! `HaversineMatrix` ignores the road/transit network but is always
//! available, so it backs every estimate the planner makes before (or
//! instead of) live routing data.

use crate::error::RoutingError;
use crate::model::Coordinate;
use crate::traits::{DistanceMatrixProvider, MatrixEstimate, RouteLeg, RoutingProvider};

/// Average door-to-door urban speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 20.0;

/// Straight-line to network distance ratio.
const DEFAULT_DETOUR_FACTOR: f64 = 1.3;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points in meters.
pub fn haversine_meters(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Equirectangular projection to local planar meters around a reference
/// latitude. Good enough for grid bucketing at city scale.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    meters_per_deg_lat: f64,
    meters_per_deg_lng: f64,
}

impl LocalProjection {
    pub fn around<'a>(coordinates: impl IntoIterator<Item = &'a Coordinate>) -> Self {
        let (sum, count) = coordinates
            .into_iter()
            .fold((0.0, 0usize), |(sum, count), c| (sum + c.lat, count + 1));
        let ref_lat = if count == 0 { 0.0 } else { sum / count as f64 };
        let meters_per_deg_lat = EARTH_RADIUS_M.to_radians();

        Self {
            meters_per_deg_lat,
            // Clamp so polar inputs still produce a usable x axis.
            meters_per_deg_lng: meters_per_deg_lat * ref_lat.to_radians().cos().max(1e-6),
        }
    }

    /// `(x, y)` in meters.
    pub fn project(&self, coordinate: Coordinate) -> (f64, f64) {
        (
            coordinate.lng * self.meters_per_deg_lng,
            coordinate.lat * self.meters_per_deg_lat,
        )
    }
}

/// Haversine-based distance/duration estimator.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average travel speed in km/h.
    pub speed_kmh: f64,
    /// Multiplier applied to straight-line distance.
    pub detour_factor: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
            detour_factor: DEFAULT_DETOUR_FACTOR,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64, detour_factor: f64) -> Self {
        Self {
            speed_kmh,
            detour_factor,
        }
    }

    /// Estimated network distance in meters.
    pub fn distance_meters(&self, from: Coordinate, to: Coordinate) -> f64 {
        haversine_meters(from, to) * self.detour_factor
    }

    /// Convert meters to whole travel minutes at the assumed speed.
    pub fn meters_to_minutes(&self, meters: f64) -> u32 {
        let hours = meters / 1000.0 / self.speed_kmh;
        (hours * 60.0).round() as u32
    }
}

impl DistanceMatrixProvider for HaversineMatrix {
    fn matrix_for(&self, locations: &[Coordinate]) -> Result<MatrixEstimate, RoutingError> {
        let n = locations.len();
        let mut distances = vec![vec![0.0; n]; n];
        let mut durations = vec![vec![0; n]; n];

        for (i, from) in locations.iter().enumerate() {
            for (j, to) in locations.iter().enumerate() {
                if i != j {
                    let meters = self.distance_meters(*from, *to);
                    distances[i][j] = meters;
                    durations[i][j] = self.meters_to_minutes(meters);
                }
            }
        }

        Ok(MatrixEstimate {
            distances,
            durations,
        })
    }
}

impl RoutingProvider for HaversineMatrix {
    fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteLeg, RoutingError> {
        let meters = self.distance_meters(from, to);
        Ok(RouteLeg {
            distance_meters: meters,
            duration_minutes: self.meters_to_minutes(meters),
            polyline: None,
            transit: None,
        })
    }
}
