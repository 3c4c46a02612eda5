//! Intra-day visiting order.
//!
//! Free stops are chained nearest-neighbour from the start anchor and then
//! untangled with a bounded 2-opt. Timed (committed) stops are inserted
//! afterwards in commitment order, each at the cheapest position that still
//! reaches it on time. Reachability is judged with the same leg times the
//! day is later stamped with.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::geo::haversine_meters;
use crate::matrix::DistanceMatrix;
use crate::model::{Anchor, Coordinate, Waypoint, WaypointMap};
use crate::schedule::TransportOptions;
use crate::time::ClockTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingOptions {
    /// Maximum full 2-opt sweeps over the free sequence.
    pub two_opt_passes: usize,
    /// Meters-equivalent charged per minute spent waiting for a timed stop.
    pub wait_penalty_per_minute: f64,
}

impl Default for OrderingOptions {
    fn default() -> Self {
        Self {
            two_opt_passes: 50,
            wait_penalty_per_minute: 50.0,
        }
    }
}

/// Inputs for ordering one day.
pub struct DayOrderRequest<'a> {
    pub waypoint_ids: &'a [String],
    pub anchor: &'a Anchor,
    pub waypoints: &'a WaypointMap<'a>,
    /// Commitment start for timed stops on this day.
    pub fixed_starts: &'a HashMap<String, ClockTime>,
    pub day_start: ClockTime,
    pub transport: &'a TransportOptions,
}

struct Stop<'a> {
    waypoint: &'a Waypoint,
    index: usize,
    fixed_start: Option<ClockTime>,
}

/// Orders one day's waypoints into a single visiting sequence.
pub fn order_day(request: &DayOrderRequest<'_>, matrix: &DistanceMatrix, options: &OrderingOptions) -> Result<Vec<String>> {
    let mut free = Vec::new();
    let mut timed = Vec::new();
    for id in request.waypoint_ids {
        let waypoint = request
            .waypoints
            .get(id.as_str())
            .copied()
            .ok_or_else(|| PlannerError::unknown_place(id))?;
        let index = matrix.index_of(id).ok_or_else(|| PlannerError::unknown_place(id))?;
        let stop = Stop {
            waypoint,
            index,
            fixed_start: request.fixed_starts.get(id).copied(),
        };
        if stop.fixed_start.is_some() {
            timed.push(stop);
        } else {
            free.push(stop);
        }
    }

    let start = anchor_index(request.anchor.start.as_ref().map(|p| p.id.as_str()), matrix)?;
    let end = anchor_index(request.anchor.end.as_ref().map(|p| p.id.as_str()), matrix)?;
    let route = Route {
        matrix,
        transport: request.transport,
        start,
        end,
    };

    let mut sequence = route.nearest_neighbour(free, request.anchor);
    route.two_opt(&mut sequence, options.two_opt_passes);

    timed.sort_by(|a, b| {
        (a.fixed_start, &a.waypoint.id).cmp(&(b.fixed_start, &b.waypoint.id))
    });
    let mut min_position = 0;
    for stop in timed {
        let position = route.timed_position(&sequence, &stop, min_position, request.day_start, options);
        sequence.insert(position, stop);
        min_position = position + 1;
    }

    Ok(sequence.into_iter().map(|stop| stop.waypoint.id.clone()).collect())
}

fn anchor_index(id: Option<&str>, matrix: &DistanceMatrix) -> Result<Option<usize>> {
    id.map(|id| matrix.index_of(id).ok_or_else(|| PlannerError::unknown_place(id)))
        .transpose()
}

/// Ranks candidates at equal distance: more important first, then by id.
fn tie_break(a: &Waypoint, b: &Waypoint) -> Ordering {
    b.importance.cmp(&a.importance).then_with(|| a.id.cmp(&b.id))
}

struct Route<'m> {
    matrix: &'m DistanceMatrix,
    transport: &'m TransportOptions,
    start: Option<usize>,
    end: Option<usize>,
}

impl Route<'_> {
    fn distance(&self, from: Option<usize>, to: Option<usize>) -> f64 {
        match (from, to) {
            (Some(i), Some(j)) => self.matrix.distance_at(i, j),
            _ => 0.0,
        }
    }

    fn nearest_neighbour<'a>(&self, mut remaining: Vec<Stop<'a>>, anchor: &Anchor) -> Vec<Stop<'a>> {
        let mut sequence = Vec::with_capacity(remaining.len());
        if remaining.is_empty() {
            return sequence;
        }

        let mut current = match self.start {
            Some(start) => Some(start),
            None => {
                let seed = seed_without_start(&remaining, anchor);
                let stop = remaining.remove(seed);
                let index = stop.index;
                sequence.push(stop);
                Some(index)
            }
        };

        while !remaining.is_empty() {
            let mut best = 0;
            for candidate in 1..remaining.len() {
                let d_best = self.distance(current, Some(remaining[best].index));
                let d_candidate = self.distance(current, Some(remaining[candidate].index));
                let closer = match d_candidate.total_cmp(&d_best) {
                    Ordering::Less => true,
                    Ordering::Equal => {
                        tie_break(remaining[candidate].waypoint, remaining[best].waypoint) == Ordering::Less
                    }
                    Ordering::Greater => false,
                };
                if closer {
                    best = candidate;
                }
            }
            let stop = remaining.remove(best);
            current = Some(stop.index);
            sequence.push(stop);
        }

        sequence
    }

    /// First-improvement 2-opt over segment reversals, bounded by `passes`.
    ///
    /// The matrix is directional, so reversing `i..=j` changes the two
    /// boundary edges and flips every edge inside the span. Both inner sums
    /// are carried along as `j` grows, keeping each move check O(1).
    fn two_opt(&self, sequence: &mut [Stop<'_>], passes: usize) {
        let n = sequence.len();
        if n < 2 {
            return;
        }

        for _ in 0..passes {
            let mut improved = false;
            for i in 0..n - 1 {
                let before = if i == 0 { self.start } else { Some(sequence[i - 1].index) };
                let mut forward = 0.0;
                let mut backward = 0.0;
                for j in i + 1..n {
                    let (a, b) = (sequence[j - 1].index, sequence[j].index);
                    forward += self.matrix.distance_at(a, b);
                    backward += self.matrix.distance_at(b, a);

                    let first = Some(sequence[i].index);
                    let last = Some(sequence[j].index);
                    let after = sequence.get(j + 1).map(|s| s.index).or(self.end);
                    let current = self.distance(before, first) + forward + self.distance(last, after);
                    let reversed = self.distance(before, last) + backward + self.distance(first, after);

                    if reversed + 1e-6 < current {
                        sequence[i..=j].reverse();
                        std::mem::swap(&mut forward, &mut backward);
                        improved = true;
                    }
                }
            }
            if !improved {
                break;
            }
        }
    }

    /// Estimated arrival at `stop` if inserted at `position`.
    fn arrival_at(&self, sequence: &[Stop<'_>], stop: &Stop<'_>, position: usize, day_start: ClockTime) -> ClockTime {
        let mut clock = day_start;
        let mut prev = self.start;
        for visited in &sequence[..position] {
            clock = clock.add_minutes(self.minutes(prev, visited.index));
            if let Some(fixed) = visited.fixed_start {
                clock = clock.max(fixed);
            }
            clock = clock.add_minutes(visited.waypoint.stay_minutes);
            prev = Some(visited.index);
        }
        clock.add_minutes(self.minutes(prev, stop.index))
    }

    fn minutes(&self, from: Option<usize>, to: usize) -> u32 {
        from.map_or(0, |i| self.transport.leg_minutes(self.matrix, i, to))
    }

    /// Cheapest position at or after `min_position` that reaches the stop by
    /// its commitment; if none does, the position with least lateness.
    fn timed_position(
        &self,
        sequence: &[Stop<'_>],
        stop: &Stop<'_>,
        min_position: usize,
        day_start: ClockTime,
        options: &OrderingOptions,
    ) -> usize {
        let Some(fixed_start) = stop.fixed_start else {
            return sequence.len();
        };

        let mut best_feasible: Option<(usize, f64)> = None;
        let mut least_late: Option<(usize, u32)> = None;

        for position in min_position.min(sequence.len())..=sequence.len() {
            let arrival = self.arrival_at(sequence, stop, position, day_start);
            if arrival <= fixed_start {
                let prev = if position == 0 { self.start } else { Some(sequence[position - 1].index) };
                let next = sequence.get(position).map(|s| s.index).or(self.end);
                let detour = self.distance(prev, Some(stop.index)) + self.distance(Some(stop.index), next)
                    - self.distance(prev, next);
                let wait = f64::from(arrival.minutes_until(fixed_start));
                let score = detour + wait * options.wait_penalty_per_minute;
                if best_feasible.is_none_or(|(_, best)| score < best) {
                    best_feasible = Some((position, score));
                }
            } else {
                let late = fixed_start.minutes_until(arrival);
                if least_late.is_none_or(|(_, best)| late < best) {
                    least_late = Some((position, late));
                }
            }
        }

        best_feasible
            .map(|(position, _)| position)
            .or(least_late.map(|(position, _)| position))
            .unwrap_or(sequence.len())
    }
}

/// Without a start anchor, begin at the stop farthest from the end anchor,
/// or from the group centroid when there is no end either.
fn seed_without_start(stops: &[Stop<'_>], anchor: &Anchor) -> usize {
    let reference = anchor.end.as_ref().map(|p| p.coordinate).unwrap_or_else(|| {
        let n = stops.len() as f64;
        let (lat, lng) = stops.iter().fold((0.0, 0.0), |(lat, lng), s| {
            (lat + s.waypoint.coordinate.lat, lng + s.waypoint.coordinate.lng)
        });
        Coordinate::new(lat / n, lng / n)
    });

    let mut best = 0;
    for candidate in 1..stops.len() {
        let d_best = haversine_meters(stops[best].waypoint.coordinate, reference);
        let d_candidate = haversine_meters(stops[candidate].waypoint.coordinate, reference);
        let farther = match d_candidate.total_cmp(&d_best) {
            Ordering::Greater => true,
            Ordering::Equal => tie_break(stops[candidate].waypoint, stops[best].waypoint) == Ordering::Less,
            Ordering::Less => false,
        };
        if farther {
            best = candidate;
        }
    }
    best
}
