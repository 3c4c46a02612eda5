//! itinerary-planner core
//!
//! Turns a bag of waypoints plus fixed-time commitments into a per-day
//! itinerary: spatial zoning, day assignment, in-day ordering and time
//! stamping, with optional routed enrichment of the final legs.

pub mod error;
pub mod time;
pub mod model;
pub mod traits;
pub mod geo;
pub mod polyline;
pub mod matrix;
pub mod constraints;
pub mod zoning;
pub mod splitting;
pub mod assign;
pub mod ordering;
pub mod schedule;
pub mod enrich;
pub mod osrm;
pub mod planner;

pub use error::{PlannerError, Result, RoutingError};
pub use planner::{Planner, PlannerOptions, TripInput, TripPlan};
