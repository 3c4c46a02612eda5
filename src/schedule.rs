//! Time recalculation for one day's ordered stops.
//!
//! A pass walks the stops once from the day's start, stamping arrival and
//! departure and rebuilding every transport leg and aggregate from scratch.
//! Feeding a pass its own output with unchanged order and segment data
//! reproduces it exactly.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constraints::{DayConstraint, DayWindow};
use crate::error::{PlannerError, Result};
use crate::matrix::{DistanceMatrix, Segment};
use crate::model::{Anchor, DailyItinerary, ScheduleItem, TimingIssue, TransportMode, TransportSegment};
use crate::time::ClockTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Legs up to this length are walked.
    pub walk_threshold_meters: f64,
    pub walk_speed_kmh: f64,
    /// Mode for legs beyond walking range.
    pub default_mode: TransportMode,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            walk_threshold_meters: 800.0,
            walk_speed_kmh: 4.5,
            default_mode: TransportMode::Transit,
        }
    }
}

impl TransportOptions {
    fn walking_minutes(&self, meters: f64) -> u32 {
        let meters_per_minute = self.walk_speed_kmh * 1000.0 / 60.0;
        (meters / meters_per_minute).ceil() as u32
    }

    fn is_walk(&self, segment: &Segment<'_>) -> bool {
        segment.transit.is_none() && segment.distance_meters <= self.walk_threshold_meters
    }

    pub fn mode_for(&self, segment: &Segment<'_>) -> TransportMode {
        match segment.transit {
            Some(transit) => transit.mode.unwrap_or(self.default_mode),
            None if self.is_walk(segment) => TransportMode::Walk,
            None => self.default_mode,
        }
    }

    /// Minutes a stamped day charges for `segment`. Short estimated legs are
    /// re-timed at walking speed; routed legs keep their duration.
    pub fn minutes_for(&self, segment: &Segment<'_>) -> u32 {
        if self.is_walk(segment) && !segment.enriched {
            self.walking_minutes(segment.distance_meters)
        } else {
            segment.duration_minutes
        }
    }

    /// Leg time between two matrix indices.
    pub fn leg_minutes(&self, matrix: &DistanceMatrix, from: usize, to: usize) -> u32 {
        self.minutes_for(&matrix.segment_at(from, to))
    }
}

/// Everything about a day besides its stops.
#[derive(Debug, Clone, Copy)]
pub struct DayContext<'a> {
    pub day_number: u32,
    pub date: NaiveDate,
    pub anchor: &'a Anchor,
    pub window: DayWindow,
    /// Commitment start per fixed place on this day.
    pub fixed_starts: &'a HashMap<String, ClockTime>,
    pub constraint: Option<&'a DayConstraint>,
}

/// Builds the leg `from -> to` from the matrix, preferring enriched transit
/// detail when present.
pub fn transport_segment(
    from: &str,
    to: &str,
    matrix: &DistanceMatrix,
    options: &TransportOptions,
) -> Result<TransportSegment> {
    let segment = matrix
        .segment(from, to)
        .ok_or_else(|| PlannerError::unknown_place(format!("{from} -> {to}")))?;

    Ok(TransportSegment {
        mode: options.mode_for(&segment),
        distance_meters: segment.distance_meters,
        duration_minutes: options.minutes_for(&segment),
        fare: segment.transit.and_then(|transit| transit.fare),
        description: segment.transit.and_then(|transit| transit.description.clone()),
    })
}

/// Stamps `items` (taken in slice order) and recomputes the day aggregates.
pub fn recalculate_day(
    items: &[ScheduleItem],
    day: &DayContext<'_>,
    matrix: &DistanceMatrix,
    transport: &TransportOptions,
) -> Result<DailyItinerary> {
    let mut issues = Vec::new();
    let mut clock = day.window.start;

    let start_transport = match (&day.anchor.start, items.first()) {
        (Some(anchor), Some(first)) => Some(transport_segment(&anchor.id, &first.place_id, matrix, transport)?),
        _ => None,
    };
    if let Some(leg) = &start_transport {
        clock = clock.add_minutes(leg.duration_minutes);
    }

    let mut stamped = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let mut arrival = clock;
        let fixed_start = day.fixed_starts.get(&item.place_id).copied();

        if let Some(fixed) = fixed_start {
            if arrival > fixed {
                let minutes_late = fixed.minutes_until(arrival);
                warn!(day = day.day_number, place = %item.place_id, minutes_late, "fixed stop cannot be reached on time");
                issues.push(TimingIssue::LateForFixed {
                    place_id: item.place_id.clone(),
                    minutes_late,
                });
            } else {
                arrival = fixed;
            }
        } else if day
            .constraint
            .is_some_and(|constraint| constraint.overlaps_blocked(arrival, item.duration))
        {
            issues.push(TimingIssue::OverlapsCommitment {
                place_id: item.place_id.clone(),
            });
        }

        let departure = arrival.add_minutes(item.duration);
        let transport_to_next = items
            .get(i + 1)
            .map(|next| transport_segment(&item.place_id, &next.place_id, matrix, transport))
            .transpose()?;
        clock = departure.add_minutes(transport_to_next.as_ref().map_or(0, |leg| leg.duration_minutes));

        stamped.push(ScheduleItem {
            order: i + 1,
            place_id: item.place_id.clone(),
            arrival_time: arrival,
            departure_time: departure,
            duration: item.duration,
            is_fixed: item.is_fixed || fixed_start.is_some(),
            transport_to_next,
        });
    }

    let end_transport = match (&day.anchor.end, items.last()) {
        (Some(anchor), Some(last)) => Some(transport_segment(&last.place_id, &anchor.id, matrix, transport)?),
        _ => None,
    };

    let end_time = match (stamped.last(), &end_transport) {
        (Some(last), Some(leg)) => last.departure_time.add_minutes(leg.duration_minutes),
        (Some(last), None) => last.departure_time,
        (None, _) => day.window.start,
    };
    if end_time > day.window.end {
        issues.push(TimingIssue::ExceedsDayWindow {
            minutes_over: day.window.end.minutes_until(end_time),
        });
    }

    let legs: Vec<&TransportSegment> = start_transport
        .iter()
        .chain(stamped.iter().filter_map(|item| item.transport_to_next.as_ref()))
        .chain(end_transport.iter())
        .collect();

    Ok(DailyItinerary {
        day_number: day.day_number,
        date: day.date,
        total_distance: legs.iter().map(|leg| leg.distance_meters).sum(),
        total_duration: legs.iter().map(|leg| leg.duration_minutes).sum(),
        total_stay_duration: stamped.iter().map(|item| item.duration).sum(),
        place_count: stamped.len(),
        start_time: day.window.start,
        end_time,
        items: stamped,
        start_transport,
        end_transport,
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnchorPoint, Coordinate, TransitDetail, ORIGIN_ID};
    use crate::traits::{MatrixEstimate, RouteLeg};

    /// origin, a, b, c with hand-written directional tables.
    fn matrix() -> DistanceMatrix {
        let places = vec![
            (ORIGIN_ID.to_string(), Coordinate::new(37.55, 127.00)),
            ("a".to_string(), Coordinate::new(37.55, 127.01)),
            ("b".to_string(), Coordinate::new(37.55, 127.02)),
            ("c".to_string(), Coordinate::new(37.55, 127.03)),
        ];
        let estimate = MatrixEstimate {
            distances: vec![
                vec![0.0, 2000.0, 4000.0, 6000.0],
                vec![2000.0, 0.0, 500.0, 4000.0],
                vec![4000.0, 500.0, 0.0, 3000.0],
                vec![6000.0, 4000.0, 3000.0, 0.0],
            ],
            durations: vec![
                vec![0, 15, 25, 35],
                vec![15, 0, 5, 25],
                vec![25, 5, 0, 20],
                vec![35, 25, 20, 0],
            ],
        };
        DistanceMatrix::from_estimate(places, estimate).unwrap()
    }

    fn anchor() -> Anchor {
        Anchor {
            start: Some(AnchorPoint::new(ORIGIN_ID, Coordinate::new(37.55, 127.00))),
            end: Some(AnchorPoint::new(ORIGIN_ID, Coordinate::new(37.55, 127.00))),
        }
    }

    fn items(order: &[(&str, u32)]) -> Vec<ScheduleItem> {
        order
            .iter()
            .enumerate()
            .map(|(i, (id, stay))| ScheduleItem::pending(i + 1, *id, *stay, false))
            .collect()
    }

    fn context<'a>(anchor: &'a Anchor, fixed: &'a HashMap<String, ClockTime>) -> DayContext<'a> {
        DayContext {
            day_number: 1,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            anchor,
            window: DayWindow::default(),
            fixed_starts: fixed,
            constraint: None,
        }
    }

    #[test]
    fn test_timestamps_and_totals() {
        let anchor = anchor();
        let fixed = HashMap::new();
        let day = recalculate_day(
            &items(&[("a", 60), ("b", 30), ("c", 45)]),
            &context(&anchor, &fixed),
            &matrix(),
            &TransportOptions::default(),
        )
        .unwrap();

        let times: Vec<(String, String)> = day
            .items
            .iter()
            .map(|i| (i.arrival_time.to_string(), i.departure_time.to_string()))
            .collect();
        // start 09:00 + 15 transit; a->b is 500 m, walked in 7 minutes
        assert_eq!(
            times,
            vec![
                ("09:15".to_string(), "10:15".to_string()),
                ("10:22".to_string(), "10:52".to_string()),
                ("11:12".to_string(), "11:57".to_string()),
            ]
        );
        assert_eq!(day.items[0].transport_to_next.as_ref().unwrap().mode, TransportMode::Walk);
        assert_eq!(day.items[1].transport_to_next.as_ref().unwrap().mode, TransportMode::Transit);
        assert!(day.items[2].transport_to_next.is_none());
        assert_eq!(day.end_time.to_string(), "12:32");
        assert_eq!(day.total_distance, 2000.0 + 500.0 + 3000.0 + 6000.0);
        assert_eq!(day.total_duration, 15 + 7 + 20 + 35);
        assert_eq!(day.total_stay_duration, 135);
        assert_eq!(day.place_count, 3);
        assert!(day.issues.is_empty());
        assert_eq!(day.items.iter().map(|i| i.order).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let anchor = anchor();
        let fixed = HashMap::from([("b".to_string(), ClockTime::from_hm(11, 0))]);
        let first = recalculate_day(
            &items(&[("a", 60), ("b", 30), ("c", 45)]),
            &context(&anchor, &fixed),
            &matrix(),
            &TransportOptions::default(),
        )
        .unwrap();
        let second = recalculate_day(&first.items, &context(&anchor, &fixed), &matrix(), &TransportOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fixed_stop_waits_for_commitment() {
        let anchor = anchor();
        let fixed = HashMap::from([("b".to_string(), ClockTime::from_hm(11, 0))]);
        let day = recalculate_day(
            &items(&[("a", 60), ("b", 30)]),
            &context(&anchor, &fixed),
            &matrix(),
            &TransportOptions::default(),
        )
        .unwrap();

        assert_eq!(day.items[1].arrival_time, ClockTime::from_hm(11, 0));
        assert!(day.items[1].is_fixed);
        assert!(day.issues.is_empty());
    }

    #[test]
    fn test_late_for_fixed_reported() {
        let anchor = anchor();
        let fixed = HashMap::from([("b".to_string(), ClockTime::from_hm(10, 0))]);
        let day = recalculate_day(
            &items(&[("a", 60), ("b", 30)]),
            &context(&anchor, &fixed),
            &matrix(),
            &TransportOptions::default(),
        )
        .unwrap();

        // the clock never runs backwards to meet a missed commitment
        assert_eq!(day.items[1].arrival_time, ClockTime::from_hm(10, 22));
        assert!(day.items[1].arrival_time >= day.items[0].departure_time);
        assert_eq!(
            day.issues,
            vec![TimingIssue::LateForFixed {
                place_id: "b".to_string(),
                minutes_late: 22
            }]
        );
    }

    #[test]
    fn test_day_window_overrun() {
        let anchor = anchor();
        let fixed = HashMap::new();
        let mut ctx = context(&anchor, &fixed);
        ctx.window = DayWindow {
            start: ClockTime::from_hm(9, 0),
            end: ClockTime::from_hm(10, 0),
        };
        let day = recalculate_day(&items(&[("a", 60)]), &ctx, &matrix(), &TransportOptions::default()).unwrap();
        // 09:15 + 60 + 15 back
        assert_eq!(day.issues, vec![TimingIssue::ExceedsDayWindow { minutes_over: 30 }]);
    }

    #[test]
    fn test_empty_day() {
        let anchor = anchor();
        let fixed = HashMap::new();
        let day = recalculate_day(&[], &context(&anchor, &fixed), &matrix(), &TransportOptions::default()).unwrap();
        assert_eq!(day.place_count, 0);
        assert_eq!(day.end_time, day.start_time);
        assert!(day.start_transport.is_none());
        assert_eq!(day.total_distance, 0.0);
    }

    #[test]
    fn test_enriched_transit_detail_wins() {
        let mut matrix = matrix();
        matrix
            .apply_leg(
                "b",
                "c",
                RouteLeg {
                    distance_meters: 3200.0,
                    duration_minutes: 18,
                    polyline: None,
                    transit: Some(TransitDetail {
                        mode: Some(TransportMode::Transit),
                        fare: Some(1400),
                        description: Some("Line 2".to_string()),
                        lines: vec!["2".to_string()],
                    }),
                },
            )
            .unwrap();

        let segment = transport_segment("b", "c", &matrix, &TransportOptions::default()).unwrap();
        assert_eq!(segment.duration_minutes, 18);
        assert_eq!(segment.fare, Some(1400));
        assert_eq!(segment.description.as_deref(), Some("Line 2"));
    }

    #[test]
    fn test_routed_short_leg_keeps_its_duration() {
        let mut matrix = matrix();
        matrix
            .apply_leg(
                "a",
                "b",
                RouteLeg {
                    distance_meters: 450.0,
                    duration_minutes: 3,
                    polyline: None,
                    transit: None,
                },
            )
            .unwrap();

        let anchor = anchor();
        let fixed = HashMap::new();
        let day = recalculate_day(
            &items(&[("a", 60), ("b", 30)]),
            &context(&anchor, &fixed),
            &matrix,
            &TransportOptions::default(),
        )
        .unwrap();

        let leg = day.items[0].transport_to_next.as_ref().unwrap();
        assert_eq!(leg.mode, TransportMode::Walk);
        assert_eq!(leg.duration_minutes, 3);
        assert_eq!(day.items[1].arrival_time, ClockTime::from_hm(10, 18));

        // the reverse cell is still an estimate and is re-timed at walking pace
        let back = transport_segment("b", "a", &matrix, &TransportOptions::default()).unwrap();
        assert_eq!(back.duration_minutes, 7);
    }

    #[test]
    fn test_leg_minutes_match_stamped_legs() {
        let matrix = matrix();
        let options = TransportOptions::default();
        let a = matrix.index_of("a").unwrap();
        let b = matrix.index_of("b").unwrap();
        let c = matrix.index_of("c").unwrap();
        assert_eq!(options.leg_minutes(&matrix, a, b), 7);
        assert_eq!(options.leg_minutes(&matrix, b, c), 20);
        assert_eq!(
            options.leg_minutes(&matrix, a, b),
            transport_segment("a", "b", &matrix, &options).unwrap().duration_minutes
        );
    }

    #[test]
    fn test_unknown_place_is_an_error() {
        let anchor = anchor();
        let fixed = HashMap::new();
        let result = recalculate_day(&items(&[("nowhere", 10)]), &context(&anchor, &fixed), &matrix(), &TransportOptions::default());
        assert!(matches!(result, Err(PlannerError::UnknownPlace(_))));
    }
}
