//! Collaborator interfaces for travel data.
//!
//! The planner never talks to the network itself; it asks these traits for
//! distance/duration estimates and, after a route is chosen, for richer
//! per-segment detail. Concrete providers live in [`crate::osrm`] and
//! [`crate::geo`].

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::model::{Coordinate, TransitDetail};
use crate::polyline::Polyline;

/// Square distance/duration tables for a location list, indexed by that
/// list's order. Not assumed symmetric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixEstimate {
    /// Meters.
    pub distances: Vec<Vec<f64>>,
    /// Minutes.
    pub durations: Vec<Vec<u32>>,
}

impl MatrixEstimate {
    /// True when both tables are `n x n`.
    pub fn is_square(&self, n: usize) -> bool {
        self.distances.len() == n
            && self.durations.len() == n
            && self.distances.iter().all(|row| row.len() == n)
            && self.durations.iter().all(|row| row.len() == n)
    }
}

/// Provides a distance/duration matrix for a set of locations.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[Coordinate]) -> Result<MatrixEstimate, RoutingError>;
}

/// One routed leg between two coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    pub distance_meters: f64,
    pub duration_minutes: u32,
    pub polyline: Option<Polyline>,
    pub transit: Option<TransitDetail>,
}

/// Point-to-point routing. Must be safe to call from many threads at once.
pub trait RoutingProvider: Sync {
    fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteLeg, RoutingError>;
}

impl<T: RoutingProvider + ?Sized> RoutingProvider for &T {
    fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteLeg, RoutingError> {
        (**self).route(from, to)
    }
}
