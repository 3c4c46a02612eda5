//! Greedy placement of zones onto trip days.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlannerError, Result};
use crate::geo::haversine_meters;
use crate::model::{Anchor, Coordinate, Zone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignOptions {
    /// Score added per minute a day would run over its budget, in meters.
    pub overload_penalty_per_minute: f64,
}

impl Default for AssignOptions {
    fn default() -> Self {
        Self {
            overload_penalty_per_minute: 200.0,
        }
    }
}

/// Running state of one day during assignment.
#[derive(Debug, Default)]
struct DayLoad {
    zones: Vec<Zone>,
    minutes: u32,
}

impl DayLoad {
    fn push(&mut self, zone: Zone) {
        self.minutes += zone.estimated_minutes;
        self.zones.push(zone);
    }

    /// Mean of the assigned zones' centroids, weighted by member count.
    fn centroid(&self) -> Option<Coordinate> {
        let count: usize = self.zones.iter().map(Zone::len).sum();
        if count == 0 {
            return None;
        }
        let (lat, lng) = self.zones.iter().fold((0.0, 0.0), |(lat, lng), zone| {
            let w = zone.len() as f64;
            (lat + zone.centroid.lat * w, lng + zone.centroid.lng * w)
        });
        Some(Coordinate::new(lat / count as f64, lng / count as f64))
    }
}

/// Places every zone on exactly one day.
///
/// Pinned zones go straight to their day. The rest are taken largest first
/// (ties by zone id) and put on the day minimizing
/// `distance(centroid, anchor) + overload penalty`, ties going to the day
/// with fewer zones, then the earlier day. Days without anchors measure
/// against the zones already placed there, or score zero while empty.
pub fn assign_zones_to_days(
    zones: Vec<Zone>,
    anchors: &[Anchor],
    daily_max_minutes: u32,
    options: &AssignOptions,
) -> Result<Vec<Vec<Zone>>> {
    let days = anchors.len();
    if days == 0 {
        return Err(PlannerError::invalid_input("trip must span at least one day"));
    }

    let mut loads: Vec<DayLoad> = (0..days).map(|_| DayLoad::default()).collect();
    let mut free = Vec::new();

    for zone in zones {
        match zone.fixed_day_index {
            Some(day) if day < days => loads[day].push(zone),
            Some(day) => {
                return Err(PlannerError::invalid_input(format!(
                    "zone {} is pinned to day {} of a {}-day trip",
                    zone.zone_id,
                    day + 1,
                    days
                )));
            }
            None => free.push(zone),
        }
    }

    free.sort_by(|a, b| {
        b.estimated_minutes
            .cmp(&a.estimated_minutes)
            .then_with(|| a.zone_id.cmp(&b.zone_id))
    });

    for zone in free {
        let mut best_day = 0;
        let mut best_score = f64::INFINITY;

        for (day, load) in loads.iter().enumerate() {
            let score = proximity(&zone, &anchors[day], load)
                + overload_penalty(load.minutes, zone.estimated_minutes, daily_max_minutes, options);

            let better = match score.total_cmp(&best_score) {
                Ordering::Less => true,
                Ordering::Equal => load.zones.len() < loads[best_day].zones.len(),
                Ordering::Greater => false,
            };
            if better {
                best_day = day;
                best_score = score;
            }
        }

        debug!(zone = %zone.zone_id, day = best_day + 1, score = best_score, "assigned zone");
        loads[best_day].push(zone);
    }

    Ok(loads.into_iter().map(|load| load.zones).collect())
}

fn proximity(zone: &Zone, anchor: &Anchor, load: &DayLoad) -> f64 {
    let anchored = anchor
        .points()
        .map(|point| haversine_meters(zone.centroid, point.coordinate))
        .min_by(f64::total_cmp);

    anchored
        .or_else(|| load.centroid().map(|c| haversine_meters(zone.centroid, c)))
        .unwrap_or(0.0)
}

fn overload_penalty(current: u32, adding: u32, daily_max_minutes: u32, options: &AssignOptions) -> f64 {
    let over = (current + adding).saturating_sub(daily_max_minutes);
    f64::from(over) * options.overload_penalty_per_minute
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnchorPoint, FixedDays, Waypoint};

    fn zone(id: &str, lat: f64, lng: f64, members: usize, stay: u32) -> Zone {
        let waypoints: Vec<Waypoint> = (0..members)
            .map(|i| Waypoint::new(format!("{id}-{i}"), "", Coordinate::new(lat, lng)).stay(stay))
            .collect();
        let refs: Vec<&Waypoint> = waypoints.iter().collect();
        Zone::from_members(id, &refs, &FixedDays::new())
    }

    fn anchor_at(lat: f64, lng: f64) -> Anchor {
        Anchor {
            start: Some(AnchorPoint::new("anchor", Coordinate::new(lat, lng))),
            end: None,
        }
    }

    fn ids(days: &[Vec<Zone>]) -> Vec<Vec<&str>> {
        days.iter()
            .map(|day| day.iter().map(|z| z.zone_id.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_zone_goes_to_nearest_anchor() {
        let anchors = vec![anchor_at(37.57, 126.98), anchor_at(37.40, 127.10)];
        let zones = vec![zone("big", 37.41, 127.09, 4, 60), zone("small", 37.56, 126.99, 2, 60)];

        let days = assign_zones_to_days(zones, &anchors, 480, &AssignOptions::default()).unwrap();

        assert_eq!(ids(&days), vec![vec!["small"], vec!["big"]]);
    }

    #[test]
    fn test_fixed_zone_pinned() {
        let anchors = vec![anchor_at(37.57, 126.98), anchor_at(37.40, 127.10)];
        let mut pinned = zone("pinned", 37.57, 126.98, 2, 60);
        pinned.fixed_day_index = Some(1);

        let days = assign_zones_to_days(vec![pinned], &anchors, 480, &AssignOptions::default()).unwrap();

        assert!(days[0].is_empty());
        assert_eq!(days[1][0].zone_id, "pinned");
    }

    #[test]
    fn test_pinned_out_of_range_rejected() {
        let anchors = vec![anchor_at(37.57, 126.98)];
        let mut pinned = zone("pinned", 37.57, 126.98, 1, 60);
        pinned.fixed_day_index = Some(3);
        assert!(assign_zones_to_days(vec![pinned], &anchors, 480, &AssignOptions::default()).is_err());
    }

    #[test]
    fn test_overload_pushes_to_other_day() {
        // Both zones sit on day 1's anchor, but together they overflow it.
        let anchors = vec![anchor_at(37.57, 126.98), anchor_at(37.50, 127.00)];
        let zones = vec![zone("a", 37.57, 126.98, 4, 100), zone("b", 37.57, 126.98, 4, 90)];

        let days = assign_zones_to_days(zones, &anchors, 480, &AssignOptions::default()).unwrap();

        assert_eq!(ids(&days), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn test_overload_tolerated_when_distance_dominates() {
        let anchors = vec![anchor_at(37.57, 126.98), anchor_at(35.10, 129.04)];
        let zones = vec![zone("a", 37.57, 126.98, 4, 100), zone("b", 37.57, 126.98, 1, 100)];

        let days = assign_zones_to_days(zones, &anchors, 480, &AssignOptions::default()).unwrap();

        assert_eq!(ids(&days), vec![vec!["a", "b"], vec![]]);
    }

    #[test]
    fn test_ties_spread_across_anchorless_days() {
        let anchors = vec![Anchor::default(), Anchor::default(), Anchor::default()];
        let zones = vec![
            zone("z1", 37.50, 127.00, 1, 60),
            zone("z2", 37.60, 127.00, 1, 60),
            zone("z3", 37.70, 127.00, 1, 60),
        ];

        let days = assign_zones_to_days(zones, &anchors, 480, &AssignOptions::default()).unwrap();

        assert_eq!(ids(&days), vec![vec!["z1"], vec!["z2"], vec!["z3"]]);
    }

    #[test]
    fn test_more_days_than_zones_leaves_days_empty() {
        let anchors = vec![anchor_at(37.57, 126.98); 4];
        let days = assign_zones_to_days(vec![zone("only", 37.57, 126.98, 1, 60)], &anchors, 480, &AssignOptions::default()).unwrap();
        assert_eq!(days.len(), 4);
        assert_eq!(days.iter().filter(|d| d.is_empty()).count(), 3);
    }

    #[test]
    fn test_deterministic() {
        let anchors = vec![anchor_at(37.57, 126.98), anchor_at(37.50, 127.05), Anchor::default()];
        let make = || {
            vec![
                zone("z1", 37.52, 127.02, 3, 60),
                zone("z2", 37.58, 126.97, 2, 90),
                zone("z3", 37.49, 127.06, 5, 45),
                zone("z4", 37.55, 127.00, 1, 120),
            ]
        };
        let first = assign_zones_to_days(make(), &anchors, 300, &AssignOptions::default()).unwrap();
        let second = assign_zones_to_days(make(), &anchors, 300, &AssignOptions::default()).unwrap();
        assert_eq!(first, second);
    }
}
