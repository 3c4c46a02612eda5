//! Test fixtures for itinerary-planner.
//!
//! Provides realistic test data including:
//! - Real Seoul landmarks grouped by neighbourhood (from OpenStreetMap)
//! - Builders for trips and commitments
//! - A scripted routing provider for enrichment tests

#![allow(dead_code)]

pub mod providers;
pub mod seoul_locations;

pub use providers::*;
pub use seoul_locations::*;
