//! Route geometry for enriched travel segments.
//!
//! Geometry is kept decoded. Any compact encoding belongs to whoever renders
//! the map, not to the planner.

use serde::{Deserialize, Serialize};

use crate::geo::haversine_meters;
use crate::model::Coordinate;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Builds from GeoJSON-ordered `[lng, lat]` pairs.
    pub fn from_lng_lat(pairs: &[[f64; 2]]) -> Self {
        Self {
            points: pairs.iter().map(|[lng, lat]| Coordinate::new(*lat, *lng)).collect(),
        }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Great-circle length along the vertices, in meters.
    pub fn length_meters(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| haversine_meters(pair[0], pair[1]))
            .sum()
    }
}
