//! Error types for the itinerary planner.

use thiserror::Error;

/// Failures reported by a routing collaborator (matrix or point-to-point).
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing provider returned status {0}")]
    Status(String),
    #[error("malformed routing response: {0}")]
    Malformed(String),
    #[error("routing request cancelled")]
    Cancelled,
}

/// Fatal planner errors. Constraint conflicts are not errors; see
/// [`crate::constraints::Conflict`].
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown place reference: {0}")]
    UnknownPlace(String),
    #[error("internal invariant broken: {0}")]
    Invariant(String),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("failed to build enrichment worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, PlannerError>;

impl PlannerError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unknown_place(id: impl Into<String>) -> Self {
        Self::UnknownPlace(id.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }
}
