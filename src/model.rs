//! Trip data model: waypoints, commitments, zones, day clusters and the
//! produced daily itineraries.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::time::ClockTime;

pub const ORIGIN_ID: &str = "anchor:origin";
pub const LODGING_ID: &str = "anchor:lodging";
pub const DESTINATION_ID: &str = "anchor:destination";

/// Waypoint lookup by id.
pub type WaypointMap<'a> = HashMap<&'a str, &'a Waypoint>;

/// Resolved 0-based day index for every fixed waypoint that has one.
pub type FixedDays = HashMap<String, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

/// A point of interest to be visited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub id: String,
    pub name: String,
    pub coordinate: Coordinate,
    pub stay_minutes: u32,
    /// 1 (low) to 5 (high); only used to break ordering ties.
    pub importance: u8,
    pub is_fixed: bool,
    /// 1-based day this waypoint is locked to.
    pub day_lock: Option<u32>,
}

impl Waypoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            coordinate,
            stay_minutes: 60,
            importance: 3,
            is_fixed: false,
            day_lock: None,
        }
    }

    pub fn stay(mut self, minutes: u32) -> Self {
        self.stay_minutes = minutes;
        self
    }

    pub fn importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.is_fixed = true;
        self
    }

    pub fn locked_to_day(mut self, day: u32) -> Self {
        self.is_fixed = true;
        self.day_lock = Some(day);
        self
    }

    /// Flagged fixed, or pinned to a day by a commitment.
    pub fn is_pinned(&self, fixed_days: &FixedDays) -> bool {
        self.is_fixed || fixed_days.contains_key(&self.id)
    }
}

/// A must-visit-at-time entry. The end time is derived from the waypoint's
/// stay and never supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedCommitment {
    pub id: String,
    pub waypoint_id: String,
    pub date: NaiveDate,
    pub start_time: ClockTime,
}

/// A spatially coherent group of waypoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub zone_id: String,
    pub waypoint_ids: Vec<String>,
    pub centroid: Coordinate,
    /// Sum of member stay times; a capacity proxy, not travel time.
    pub estimated_minutes: u32,
    pub has_fixed: bool,
    pub fixed_day_index: Option<usize>,
}

impl Zone {
    /// Builds a zone over `members`, which must be non-empty.
    pub fn from_members(zone_id: impl Into<String>, members: &[&Waypoint], fixed_days: &FixedDays) -> Self {
        let count = members.len().max(1) as f64;
        let (lat_sum, lng_sum) = members.iter().fold((0.0, 0.0), |(lat, lng), waypoint| {
            (lat + waypoint.coordinate.lat, lng + waypoint.coordinate.lng)
        });

        Self {
            zone_id: zone_id.into(),
            waypoint_ids: members.iter().map(|waypoint| waypoint.id.clone()).collect(),
            centroid: Coordinate::new(lat_sum / count, lng_sum / count),
            estimated_minutes: members.iter().map(|waypoint| waypoint.stay_minutes).sum(),
            has_fixed: members.iter().any(|waypoint| waypoint.is_pinned(fixed_days)),
            fixed_day_index: members
                .iter()
                .find_map(|waypoint| fixed_days.get(&waypoint.id).copied()),
        }
    }

    pub fn len(&self) -> usize {
        self.waypoint_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoint_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub id: String,
    pub coordinate: Coordinate,
}

impl AnchorPoint {
    pub fn new(id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            id: id.into(),
            coordinate,
        }
    }
}

/// Where a day begins and ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub start: Option<AnchorPoint>,
    pub end: Option<AnchorPoint>,
}

impl Anchor {
    pub fn points(&self) -> impl Iterator<Item = &AnchorPoint> {
        self.start.iter().chain(self.end.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Per-day anchors: day 1 starts at the origin, the last day ends at the
/// destination, and every other boundary falls back to the lodging.
pub fn build_day_anchors(
    days: usize,
    origin: Coordinate,
    lodging: Option<Coordinate>,
    destination: Option<Coordinate>,
) -> Vec<Anchor> {
    let lodging = lodging.map(|coordinate| AnchorPoint::new(LODGING_ID, coordinate));

    (0..days)
        .map(|day| {
            let start = if day == 0 {
                Some(AnchorPoint::new(ORIGIN_ID, origin))
            } else {
                lodging.clone()
            };
            let end = if day + 1 == days {
                destination.map(|coordinate| AnchorPoint::new(DESTINATION_ID, coordinate))
            } else {
                lodging.clone()
            };
            Anchor { start, end }
        })
        .collect()
}

/// One day's finalized membership.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub day_index: usize,
    pub zone_ids: Vec<String>,
    pub waypoint_ids: Vec<String>,
    pub anchor: Anchor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Walk,
    Transit,
    Drive,
}

/// Richer transit breakdown supplied by the routing collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitDetail {
    pub mode: Option<TransportMode>,
    pub fare: Option<u32>,
    pub description: Option<String>,
    pub lines: Vec<String>,
}

/// Travel from one stop (or anchor) to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSegment {
    pub mode: TransportMode,
    pub distance_meters: f64,
    pub duration_minutes: u32,
    pub fare: Option<u32>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    pub order: usize,
    pub place_id: String,
    pub arrival_time: ClockTime,
    pub departure_time: ClockTime,
    /// Stay in minutes.
    pub duration: u32,
    pub is_fixed: bool,
    pub transport_to_next: Option<TransportSegment>,
}

impl ScheduleItem {
    /// An item awaiting timestamps from the recalculator.
    pub fn pending(order: usize, place_id: impl Into<String>, duration: u32, is_fixed: bool) -> Self {
        Self {
            order,
            place_id: place_id.into(),
            arrival_time: ClockTime::MIDNIGHT,
            departure_time: ClockTime::MIDNIGHT,
            duration,
            is_fixed,
            transport_to_next: None,
        }
    }
}

/// Non-fatal timing problems found while stamping a day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimingIssue {
    LateForFixed { place_id: String, minutes_late: u32 },
    OverlapsCommitment { place_id: String },
    ExceedsDayWindow { minutes_over: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyItinerary {
    pub day_number: u32,
    pub date: NaiveDate,
    pub items: Vec<ScheduleItem>,
    /// Leg from the day's start anchor to the first stop.
    pub start_transport: Option<TransportSegment>,
    /// Leg from the last stop to the day's end anchor.
    pub end_transport: Option<TransportSegment>,
    pub total_distance: f64,
    pub total_duration: u32,
    pub total_stay_duration: u32,
    pub place_count: usize,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub issues: Vec<TimingIssue>,
}
