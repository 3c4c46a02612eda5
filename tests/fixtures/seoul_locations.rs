//! Real Seoul landmarks for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap. Each group is a walkable
//! neighbourhood; groups are several kilometres apart.

use chrono::NaiveDate;

use itinerary_planner::model::{Coordinate, FixedCommitment, Waypoint};
use itinerary_planner::planner::TripInput;
use itinerary_planner::time::ClockTime;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub id: &'static str,
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(id: &'static str, name: &'static str, lat: f64, lng: f64) -> Self {
        Self { id, name, lat, lng }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }

    pub fn waypoint(&self) -> Waypoint {
        Waypoint::new(self.id, self.name, self.coordinate())
    }
}

// ============================================================================
// Jongno / Palaces
// ============================================================================

pub const PALACES: &[Location] = &[
    Location::new("gyeongbokgung", "Gyeongbokgung Palace", 37.5796, 126.9770),
    Location::new("folk-museum", "National Folk Museum", 37.5820, 126.9794),
    Location::new("bukchon", "Bukchon Hanok Village", 37.5826, 126.9830),
    Location::new("changdeokgung", "Changdeokgung Palace", 37.5794, 126.9910),
    Location::new("insadong", "Insadong", 37.5740, 126.9850),
];

// ============================================================================
// Myeongdong / Namsan
// ============================================================================

pub const NAMSAN: &[Location] = &[
    Location::new("myeongdong", "Myeongdong Street", 37.5636, 126.9834),
    Location::new("namdaemun", "Namdaemun Market", 37.5592, 126.9774),
    Location::new("n-seoul-tower", "N Seoul Tower", 37.5512, 126.9882),
    Location::new("namsangol", "Namsangol Hanok Village", 37.5594, 126.9945),
];

// ============================================================================
// Gangnam / Jamsil
// ============================================================================

pub const GANGNAM: &[Location] = &[
    Location::new("coex", "COEX Mall", 37.5125, 127.0590),
    Location::new("bongeunsa", "Bongeunsa Temple", 37.5148, 127.0576),
    Location::new("lotte-tower", "Lotte World Tower", 37.5125, 127.1025),
    Location::new("seokchon-lake", "Seokchon Lake", 37.5090, 127.1050),
];

// ============================================================================
// Anchors
// ============================================================================

pub const SEOUL_STATION: Location = Location::new("seoul-station", "Seoul Station", 37.5547, 126.9707);
pub const HOTEL_JUNG_GU: Location = Location::new("hotel", "Hotel in Jung-gu", 37.5651, 126.9895);

/// Returns all landmarks as a single list.
pub fn all_locations() -> Vec<Location> {
    PALACES.iter().chain(NAMSAN).chain(GANGNAM).cloned().collect()
}

pub fn trip_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

/// A trip over every landmark, starting at Seoul Station and sleeping at the hotel.
pub fn seoul_trip(days: u32) -> TripInput {
    TripInput {
        days,
        start_date: trip_start(),
        start: SEOUL_STATION.coordinate(),
        end: Some(SEOUL_STATION.coordinate()),
        lodging: Some(HOTEL_JUNG_GU.coordinate()),
        daily_max_minutes: None,
        waypoints: all_locations().iter().map(Location::waypoint).collect(),
    }
}

/// Commitment on day `day` (1-based) of the fixture trip.
pub fn commitment(id: &str, waypoint_id: &str, day: u32, hour: u32, minute: u32) -> FixedCommitment {
    FixedCommitment {
        id: id.to_string(),
        waypoint_id: waypoint_id.to_string(),
        date: trip_start() + chrono::Days::new(u64::from(day - 1)),
        start_time: ClockTime::from_hm(hour, minute),
    }
}
