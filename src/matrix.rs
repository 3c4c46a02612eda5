//! Distance matrix arena addressed by a stable place-id ordering.
//!
//! The id to index map is fixed when the matrix is built. Enrichment writes
//! into existing cells; nothing resizes the arena during a run.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{PlannerError, Result};
use crate::geo::HaversineMatrix;
use crate::model::{Coordinate, TransitDetail};
use crate::polyline::Polyline;
use crate::traits::{DistanceMatrixProvider, MatrixEstimate, RouteLeg};

#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    coordinates: Vec<Coordinate>,
    distances: Vec<Vec<f64>>,
    durations: Vec<Vec<u32>>,
    polylines: Vec<Vec<Option<Polyline>>>,
    transit_details: Vec<Vec<Option<TransitDetail>>>,
    enriched: Vec<Vec<bool>>,
}

/// Borrowed view of one directed cell.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub distance_meters: f64,
    pub duration_minutes: u32,
    pub polyline: Option<&'a Polyline>,
    pub transit: Option<&'a TransitDetail>,
    /// Set once a routed leg has replaced the estimate.
    pub enriched: bool,
}

impl DistanceMatrix {
    /// Asks `provider` for estimates over `places`, falling back to the
    /// haversine estimator when it fails or returns the wrong shape.
    pub fn build<M>(places: Vec<(String, Coordinate)>, provider: &M) -> Result<Self>
    where
        M: DistanceMatrixProvider + ?Sized,
    {
        let coordinates: Vec<Coordinate> = places.iter().map(|(_, c)| *c).collect();
        let n = coordinates.len();

        let estimate = match provider.matrix_for(&coordinates) {
            Ok(estimate) if estimate.is_square(n) => estimate,
            Ok(_) => {
                warn!(places = n, "matrix provider returned a malformed table, using haversine estimate");
                haversine_estimate(&coordinates)
            }
            Err(err) => {
                warn!(places = n, error = %err, "matrix provider failed, using haversine estimate");
                haversine_estimate(&coordinates)
            }
        };

        Self::from_estimate(places, estimate)
    }

    pub fn from_estimate(places: Vec<(String, Coordinate)>, estimate: MatrixEstimate) -> Result<Self> {
        let n = places.len();
        if !estimate.is_square(n) {
            return Err(PlannerError::invalid_input(format!(
                "matrix estimate does not cover {n} places"
            )));
        }

        let mut index = HashMap::with_capacity(n);
        let mut ids = Vec::with_capacity(n);
        let mut coordinates = Vec::with_capacity(n);
        for (i, (id, coordinate)) in places.into_iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(PlannerError::invalid_input(format!("duplicate place id '{id}'")));
            }
            ids.push(id);
            coordinates.push(coordinate);
        }

        Ok(Self {
            ids,
            index,
            coordinates,
            distances: estimate.distances,
            durations: estimate.durations,
            polylines: vec![vec![None; n]; n],
            transit_details: vec![vec![None; n]; n],
            enriched: vec![vec![false; n]; n],
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn coordinate(&self, id: &str) -> Option<Coordinate> {
        self.index_of(id).map(|i| self.coordinates[i])
    }

    /// Meters between two indices.
    pub fn distance_at(&self, from: usize, to: usize) -> f64 {
        self.distances[from][to]
    }

    pub fn distance(&self, from: &str, to: &str) -> Option<f64> {
        Some(self.distance_at(self.index_of(from)?, self.index_of(to)?))
    }

    pub fn segment(&self, from: &str, to: &str) -> Option<Segment<'_>> {
        Some(self.segment_at(self.index_of(from)?, self.index_of(to)?))
    }

    pub fn segment_at(&self, from: usize, to: usize) -> Segment<'_> {
        Segment {
            distance_meters: self.distances[from][to],
            duration_minutes: self.durations[from][to],
            polyline: self.polylines[from][to].as_ref(),
            transit: self.transit_details[from][to].as_ref(),
            enriched: self.enriched[from][to],
        }
    }

    /// Overwrites the `from -> to` cell with a routed leg.
    pub fn apply_leg(&mut self, from: &str, to: &str, leg: RouteLeg) -> Result<()> {
        let i = self
            .index_of(from)
            .ok_or_else(|| PlannerError::unknown_place(from))?;
        let j = self.index_of(to).ok_or_else(|| PlannerError::unknown_place(to))?;

        self.distances[i][j] = leg.distance_meters;
        self.durations[i][j] = leg.duration_minutes;
        self.polylines[i][j] = leg.polyline;
        self.transit_details[i][j] = leg.transit;
        self.enriched[i][j] = true;
        Ok(())
    }
}

fn haversine_estimate(coordinates: &[Coordinate]) -> MatrixEstimate {
    let n = coordinates.len();
    HaversineMatrix::default()
        .matrix_for(coordinates)
        .unwrap_or_else(|_| MatrixEstimate {
            distances: vec![vec![0.0; n]; n],
            durations: vec![vec![0; n]; n],
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingError;

    struct BrokenProvider;

    impl DistanceMatrixProvider for BrokenProvider {
        fn matrix_for(&self, _locations: &[Coordinate]) -> std::result::Result<MatrixEstimate, RoutingError> {
            Err(RoutingError::Status("503".to_string()))
        }
    }

    struct ShortProvider;

    impl DistanceMatrixProvider for ShortProvider {
        fn matrix_for(&self, _locations: &[Coordinate]) -> std::result::Result<MatrixEstimate, RoutingError> {
            Ok(MatrixEstimate::default())
        }
    }

    fn places() -> Vec<(String, Coordinate)> {
        vec![
            ("a".to_string(), Coordinate::new(37.5665, 126.9780)),
            ("b".to_string(), Coordinate::new(37.5796, 126.9770)),
        ]
    }

    #[test]
    fn test_failing_provider_falls_back_to_haversine() {
        let matrix = DistanceMatrix::build(places(), &BrokenProvider).unwrap();
        let d = matrix.distance("a", "b").unwrap();
        assert!(d > 1000.0 && d < 2500.0, "expected ~1.9km, got {}", d);
    }

    #[test]
    fn test_malformed_provider_falls_back_to_haversine() {
        let matrix = DistanceMatrix::build(places(), &ShortProvider).unwrap();
        assert!(matrix.distance("b", "a").unwrap() > 0.0);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut places = places();
        places.push(("a".to_string(), Coordinate::new(0.0, 0.0)));
        assert!(DistanceMatrix::build(places, &HaversineMatrix::default()).is_err());
    }

    #[test]
    fn test_apply_leg_writes_one_direction() {
        let mut matrix = DistanceMatrix::build(places(), &HaversineMatrix::default()).unwrap();
        let before = matrix.segment("b", "a").unwrap().duration_minutes;

        let leg = RouteLeg {
            distance_meters: 2500.0,
            duration_minutes: 17,
            polyline: Some(Polyline::new(vec![Coordinate::new(37.5665, 126.9780)])),
            transit: None,
        };
        matrix.apply_leg("a", "b", leg).unwrap();

        let forward = matrix.segment("a", "b").unwrap();
        assert_eq!(forward.duration_minutes, 17);
        assert_eq!(forward.distance_meters, 2500.0);
        assert!(forward.polyline.is_some());
        assert!(forward.enriched);
        let backward = matrix.segment("b", "a").unwrap();
        assert_eq!(backward.duration_minutes, before);
        assert!(!backward.enriched);
        assert_eq!(matrix.len(), 2);
    }

    #[test]
    fn test_apply_leg_unknown_place() {
        let mut matrix = DistanceMatrix::build(places(), &HaversineMatrix::default()).unwrap();
        let leg = RouteLeg {
            distance_meters: 1.0,
            duration_minutes: 1,
            polyline: None,
            transit: None,
        };
        assert!(matches!(matrix.apply_leg("a", "zzz", leg), Err(PlannerError::UnknownPlace(_))));
    }
}
