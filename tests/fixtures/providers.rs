//! Stand-in providers for tests that must not touch the network.

use std::sync::atomic::{AtomicUsize, Ordering};

use itinerary_planner::error::RoutingError;
use itinerary_planner::model::{Coordinate, TransitDetail, TransportMode};
use itinerary_planner::traits::{DistanceMatrixProvider, MatrixEstimate, RouteLeg, RoutingProvider};

/// Answers every leg with a fixed subway ride, except legs leaving
/// `fail_from`, which error.
pub struct ScriptedTransit {
    pub fail_from: Option<Coordinate>,
    pub fare: u32,
    pub duration_minutes: u32,
    calls: AtomicUsize,
}

impl ScriptedTransit {
    pub fn new(fail_from: Option<Coordinate>) -> Self {
        Self {
            fail_from,
            fare: 1_400,
            duration_minutes: 7,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingProvider for ScriptedTransit {
    fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteLeg, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_from == Some(from) {
            return Err(RoutingError::Status("NoRoute".to_string()));
        }

        Ok(RouteLeg {
            distance_meters: 2_500.0,
            duration_minutes: self.duration_minutes,
            polyline: None,
            transit: Some(TransitDetail {
                mode: Some(TransportMode::Transit),
                fare: Some(self.fare),
                description: Some("Line 3".to_string()),
                lines: vec!["3".to_string()],
            }),
        })
    }
}

/// A matrix backend that is always down.
pub struct UnavailableMatrix;

impl DistanceMatrixProvider for UnavailableMatrix {
    fn matrix_for(&self, _locations: &[Coordinate]) -> Result<MatrixEstimate, RoutingError> {
        Err(RoutingError::Status("ServiceUnavailable".to_string()))
    }
}
