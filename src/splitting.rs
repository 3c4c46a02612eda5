//! Breaking oversized zones into day-sized sub-zones.
//!
//! Splits only ever partition a zone's own members; a waypoint never moves
//! to a different original zone.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlannerError, Result};
use crate::geo::haversine_meters;
use crate::model::{FixedDays, Waypoint, WaypointMap, Zone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    /// A zone is split once its minutes exceed `daily_max * minutes_factor`.
    pub minutes_factor: f64,
    /// Hard member cap is `ceil(target_per_day * size_factor)`.
    pub size_factor: f64,
    /// Sub-zones holding a fixed member are capped at `daily_max * fixed_share`.
    pub fixed_share: f64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            minutes_factor: 1.2,
            size_factor: 1.5,
            fixed_share: 0.5,
        }
    }
}

impl SplitOptions {
    pub fn max_size(&self, target_per_day: f64) -> usize {
        ((target_per_day * self.size_factor).ceil() as usize).max(1)
    }
}

fn members_of<'a>(zone: &Zone, waypoints: &WaypointMap<'a>) -> Result<Vec<&'a Waypoint>> {
    zone.waypoint_ids
        .iter()
        .map(|id| {
            waypoints
                .get(id.as_str())
                .copied()
                .ok_or_else(|| PlannerError::invariant(format!("zone {} references unknown waypoint {}", zone.zone_id, id)))
        })
        .collect()
}

/// Separates a zone whose fixed members are pinned to different days.
///
/// Each pinned member seeds a group for its day; every other member joins
/// the group of its nearest pinned member. Zones with at most one distinct
/// pinned day come back unchanged.
pub fn separate_fixed_days(zone: Zone, waypoints: &WaypointMap<'_>, fixed_days: &FixedDays) -> Result<Vec<Zone>> {
    let members = members_of(&zone, waypoints)?;
    let pinned: Vec<(&Waypoint, usize)> = members
        .iter()
        .filter_map(|w| fixed_days.get(&w.id).map(|day| (*w, *day)))
        .collect();

    let mut days: Vec<usize> = pinned.iter().map(|(_, day)| *day).collect();
    days.sort_unstable();
    days.dedup();
    if days.len() <= 1 {
        return Ok(vec![zone]);
    }

    let mut groups: Vec<Vec<&Waypoint>> = vec![Vec::new(); days.len()];
    for member in &members {
        let day = match fixed_days.get(&member.id) {
            Some(day) => *day,
            None => nearest_pinned_day(member, &pinned),
        };
        if let Ok(slot) = days.binary_search(&day) {
            groups[slot].push(member);
        }
    }

    debug!(zone = %zone.zone_id, days = days.len(), "separated zone by fixed day");

    Ok(days
        .iter()
        .zip(groups)
        .map(|(day, group)| Zone::from_members(format!("{}-d{}", zone.zone_id, day + 1), &group, fixed_days))
        .collect())
}

fn nearest_pinned_day(member: &Waypoint, pinned: &[(&Waypoint, usize)]) -> usize {
    let mut best = pinned[0];
    let mut best_distance = f64::INFINITY;
    for candidate in pinned {
        let d = haversine_meters(member.coordinate, candidate.0.coordinate);
        if d < best_distance {
            best = *candidate;
            best_distance = d;
        }
    }
    best.1
}

/// Splits `zone` when it clearly exceeds the daily budget or member cap.
///
/// Recursive bisection: seed the two most separated members (a fixed member
/// always seeds its own side) and hand every other member to the nearer
/// seed, until each part fits. A zone that already fits is returned as-is.
pub fn split_zone(
    zone: &Zone,
    waypoints: &WaypointMap<'_>,
    fixed_days: &FixedDays,
    daily_max_minutes: u32,
    max_size: usize,
    options: &SplitOptions,
) -> Result<Vec<Zone>> {
    let members = members_of(zone, waypoints)?;
    let limits = Limits {
        fixed_days,
        free_minutes: f64::from(daily_max_minutes) * options.minutes_factor,
        fixed_minutes: f64::from(daily_max_minutes) * options.fixed_share,
        max_size: max_size.max(1),
    };

    let mut parts = Vec::new();
    bisect(members, &limits, &mut parts);

    if parts.len() == 1 {
        return Ok(vec![zone.clone()]);
    }

    debug!(zone = %zone.zone_id, parts = parts.len(), "split oversized zone");

    Ok(parts
        .iter()
        .enumerate()
        .map(|(i, part)| Zone::from_members(format!("{}.{}", zone.zone_id, i + 1), part, fixed_days))
        .collect())
}

struct Limits<'a> {
    fixed_days: &'a FixedDays,
    free_minutes: f64,
    fixed_minutes: f64,
    max_size: usize,
}

impl Limits<'_> {
    fn fits(&self, members: &[&Waypoint]) -> bool {
        let minutes: u32 = members.iter().map(|w| w.stay_minutes).sum();
        let cap = if members.iter().any(|w| w.is_pinned(self.fixed_days)) {
            self.fixed_minutes
        } else {
            self.free_minutes
        };
        members.len() <= self.max_size && f64::from(minutes) <= cap
    }
}

fn bisect<'a>(members: Vec<&'a Waypoint>, limits: &Limits<'_>, out: &mut Vec<Vec<&'a Waypoint>>) {
    if members.len() <= 1 || limits.fits(&members) {
        out.push(members);
        return;
    }

    let (seed_a, seed_b) = seeds(&members, limits.fixed_days);
    let (near_a, near_b) = if haversine_meters(members[seed_a].coordinate, members[seed_b].coordinate) == 0.0 {
        // Coincident seeds cannot separate anything; halve by position.
        let mut left = members;
        let right = left.split_off(left.len() / 2);
        (left, right)
    } else {
        let a = members[seed_a].coordinate;
        let b = members[seed_b].coordinate;
        let mut near_a = Vec::new();
        let mut near_b = Vec::new();
        for (i, member) in members.into_iter().enumerate() {
            let to_b = i == seed_b
                || (i != seed_a && haversine_meters(member.coordinate, b) < haversine_meters(member.coordinate, a));
            if to_b {
                near_b.push(member);
            } else {
                near_a.push(member);
            }
        }
        (near_a, near_b)
    };

    bisect(near_a, limits, out);
    bisect(near_b, limits, out);
}

/// Indices of the two seeds. With a pinned member present it becomes the
/// first seed and the second is the member farthest from it. Otherwise a
/// double sweep (farthest from the first member, then farthest from that)
/// picks a near-diameter pair in linear time.
fn seeds(members: &[&Waypoint], fixed_days: &FixedDays) -> (usize, usize) {
    if let Some(pinned) = members.iter().position(|w| w.is_pinned(fixed_days)) {
        return (pinned, farthest_from(members, pinned));
    }

    let a = farthest_from(members, 0);
    let b = farthest_from(members, a);
    (a.min(b), a.max(b))
}

fn farthest_from(members: &[&Waypoint], origin: usize) -> usize {
    let mut best = if origin == 0 { 1 } else { 0 };
    let mut best_distance = -1.0;
    for (i, member) in members.iter().enumerate() {
        if i == origin {
            continue;
        }
        let d = haversine_meters(members[origin].coordinate, member.coordinate);
        if d > best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}
