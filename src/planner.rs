//! End-to-end itinerary planning.
//!
//! `Planner::plan` runs the CPU-only pipeline (validate commitments, zone,
//! split, assign days, order, stamp times) and never touches the network
//! beyond the one matrix request. `TripPlan::enrich` is the only I/O-heavy
//! step and is run separately once the route is final.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assign::{AssignOptions, assign_zones_to_days};
use crate::constraints::{
    Conflict, ConflictKind, DailyConstraints, DayWindow, ResolvedCommitment, TripWindow, calculate_daily_constraints,
    detect_daily_limit_conflicts, detect_out_of_hours_conflicts, detect_schedule_conflicts, resolve_commitments,
};
use crate::enrich::{
    EnrichmentControl, EnrichmentOptions, EnrichmentReport, collect_segments, day_segment_keys, enrich_segments,
};
use crate::error::{PlannerError, Result};
use crate::matrix::DistanceMatrix;
use crate::model::{
    Anchor, Cluster, Coordinate, DailyItinerary, FixedCommitment, FixedDays, ScheduleItem, Waypoint, WaypointMap, Zone,
    build_day_anchors,
};
use crate::ordering::{DayOrderRequest, OrderingOptions, order_day};
use crate::schedule::{DayContext, TransportOptions, recalculate_day};
use crate::splitting::{SplitOptions, separate_fixed_days, split_zone};
use crate::time::{ClockTime, date_range, day_index};
use crate::traits::{DistanceMatrixProvider, RoutingProvider};
use crate::zoning::{ZoningOptions, build_zones};

const DEFAULT_DAILY_MAX_MINUTES: u32 = 480;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerOptions {
    pub zoning: ZoningOptions,
    pub split: SplitOptions,
    pub assign: AssignOptions,
    pub ordering: OrderingOptions,
    pub transport: TransportOptions,
    pub enrichment: EnrichmentOptions,
    pub window: DayWindow,
    /// Used when the trip does not set its own budget.
    pub daily_max_minutes: u32,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            zoning: ZoningOptions::default(),
            split: SplitOptions::default(),
            assign: AssignOptions::default(),
            ordering: OrderingOptions::default(),
            transport: TransportOptions::default(),
            enrichment: EnrichmentOptions::default(),
            window: DayWindow::default(),
            daily_max_minutes: DEFAULT_DAILY_MAX_MINUTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripInput {
    pub days: u32,
    pub start_date: NaiveDate,
    pub start: Coordinate,
    pub end: Option<Coordinate>,
    pub lodging: Option<Coordinate>,
    pub daily_max_minutes: Option<u32>,
    pub waypoints: Vec<Waypoint>,
}

/// A planned trip plus what is needed to re-stamp days after edits.
#[derive(Debug, Clone)]
pub struct TripPlan {
    pub itineraries: Vec<DailyItinerary>,
    pub clusters: Vec<Cluster>,
    pub conflicts: Vec<Conflict>,
    pub constraints: DailyConstraints,
    pub matrix: DistanceMatrix,
    fixed_starts: Vec<HashMap<String, ClockTime>>,
    window: DayWindow,
    transport: TransportOptions,
    enrichment: EnrichmentOptions,
}

pub struct Planner<M> {
    matrix_provider: M,
    options: PlannerOptions,
}

impl<M: DistanceMatrixProvider> Planner<M> {
    pub fn new(matrix_provider: M) -> Self {
        Self::with_options(matrix_provider, PlannerOptions::default())
    }

    pub fn with_options(matrix_provider: M, options: PlannerOptions) -> Self {
        Self {
            matrix_provider,
            options,
        }
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    pub fn plan(&self, input: &TripInput, commitments: &[FixedCommitment]) -> Result<TripPlan> {
        validate_input(input)?;
        let options = &self.options;
        let days = input.days as usize;
        let daily_max = input.daily_max_minutes.unwrap_or(options.daily_max_minutes);
        let waypoints: WaypointMap<'_> = input.waypoints.iter().map(|w| (w.id.as_str(), w)).collect();

        let resolved = resolve_commitments(commitments, &waypoints)?;
        let pinning = pin_commitments(input, &resolved);
        let mut conflicts = pinning.outside_trip;
        conflicts.extend(detect_schedule_conflicts(&pinning.in_trip));
        conflicts.extend(detect_out_of_hours_conflicts(
            &pinning.in_trip,
            options.window.start,
            options.window.end,
        ));
        conflicts.extend(detect_daily_limit_conflicts(&pinning.in_trip, daily_max));

        let dates = date_range(input.start_date, input.days);
        let trip_window = TripWindow {
            start_date: input.start_date,
            end_date: dates.last().copied().unwrap_or(input.start_date),
            day: options.window,
        };
        let constraints = calculate_daily_constraints(&pinning.in_trip, &trip_window);

        let anchors = build_day_anchors(days, input.start, input.lodging, input.end);
        let matrix = DistanceMatrix::build(matrix_places(input, &anchors), &self.matrix_provider)?;

        let zones = self.zones(input, &waypoints, &pinning.fixed_days, daily_max)?;
        let assigned = assign_zones_to_days(zones, &anchors, daily_max, &options.assign)?;
        verify_partition(assigned.iter().flatten().flat_map(|z| &z.waypoint_ids), &input.waypoints, "day assignment")?;

        let clusters: Vec<Cluster> = assigned
            .iter()
            .zip(&anchors)
            .enumerate()
            .map(|(day, (zones, anchor))| Cluster {
                day_index: day,
                zone_ids: zones.iter().map(|z| z.zone_id.clone()).collect(),
                waypoint_ids: zones.iter().flat_map(|z| z.waypoint_ids.iter().cloned()).collect(),
                anchor: anchor.clone(),
            })
            .collect();

        let mut plan = TripPlan {
            itineraries: Vec::with_capacity(days),
            clusters: Vec::with_capacity(days),
            conflicts,
            constraints,
            matrix,
            fixed_starts: pinning.fixed_starts,
            window: options.window,
            transport: options.transport.clone(),
            enrichment: options.enrichment.clone(),
        };

        for (cluster, date) in clusters.into_iter().zip(dates) {
            let request = DayOrderRequest {
                waypoint_ids: &cluster.waypoint_ids,
                anchor: &cluster.anchor,
                waypoints: &waypoints,
                fixed_starts: &plan.fixed_starts[cluster.day_index],
                day_start: options.window.start,
                transport: &options.transport,
            };
            let order = order_day(&request, &plan.matrix, &options.ordering)?;
            let items = order
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let waypoint = waypoints
                        .get(id.as_str())
                        .ok_or_else(|| PlannerError::unknown_place(id))?;
                    let is_fixed = waypoint.is_fixed || plan.fixed_starts[cluster.day_index].contains_key(id);
                    Ok(ScheduleItem::pending(i + 1, id.clone(), waypoint.stay_minutes, is_fixed))
                })
                .collect::<Result<Vec<_>>>()?;

            let itinerary = plan.stamp(cluster.day_index, date, &cluster.anchor, &items)?;
            debug!(
                day = itinerary.day_number,
                places = itinerary.place_count,
                end = %itinerary.end_time,
                "day scheduled"
            );
            plan.itineraries.push(itinerary);
            plan.clusters.push(cluster);
        }

        verify_partition(
            plan.itineraries.iter().flat_map(|d| d.items.iter().map(|i| &i.place_id)),
            &input.waypoints,
            "ordering",
        )?;

        info!(
            days,
            waypoints = input.waypoints.len(),
            conflicts = plan.conflicts.len(),
            "itinerary planned"
        );

        Ok(plan)
    }

    /// Zones covering every waypoint, each fitting one day where possible.
    fn zones(
        &self,
        input: &TripInput,
        waypoints: &WaypointMap<'_>,
        fixed_days: &FixedDays,
        daily_max: u32,
    ) -> Result<Vec<Zone>> {
        let options = &self.options;
        let target_per_day = input.waypoints.len() as f64 / f64::from(input.days);
        let max_size = options.split.max_size(target_per_day);

        let mut zones = Vec::new();
        for zone in build_zones(&input.waypoints, fixed_days, &options.zoning) {
            for separated in separate_fixed_days(zone, waypoints, fixed_days)? {
                zones.extend(split_zone(
                    &separated,
                    waypoints,
                    fixed_days,
                    daily_max,
                    max_size,
                    &options.split,
                )?);
            }
        }

        verify_partition(zones.iter().flat_map(|z| &z.waypoint_ids), &input.waypoints, "zoning")?;
        info!(zones = zones.len(), max_size, "zones ready");
        Ok(zones)
    }
}

impl TripPlan {
    fn stamp(&self, day: usize, date: NaiveDate, anchor: &Anchor, items: &[ScheduleItem]) -> Result<DailyItinerary> {
        let context = DayContext {
            day_number: day as u32 + 1,
            date,
            anchor,
            window: self.window,
            fixed_starts: &self.fixed_starts[day],
            constraint: self.constraints.day(date),
        };
        recalculate_day(items, &context, &self.matrix, &self.transport)
    }

    /// Re-stamps one day from its current item order.
    fn recalculate(&mut self, day: usize) -> Result<()> {
        let itinerary = &self.itineraries[day];
        let updated = self.stamp(day, itinerary.date, &self.clusters[day].anchor, &itinerary.items)?;
        self.itineraries[day] = updated;
        Ok(())
    }

    fn day_slot(&self, day_number: u32) -> Result<usize> {
        let day = (day_number as usize).wrapping_sub(1);
        if day < self.itineraries.len() {
            Ok(day)
        } else {
            Err(PlannerError::invalid_input(format!("no day {day_number} in this trip")))
        }
    }

    fn locate(&self, place_id: &str) -> Result<(usize, usize)> {
        self.itineraries
            .iter()
            .enumerate()
            .find_map(|(day, itinerary)| {
                itinerary
                    .items
                    .iter()
                    .position(|item| item.place_id == place_id)
                    .map(|position| (day, position))
            })
            .ok_or_else(|| PlannerError::unknown_place(place_id))
    }

    /// Applies a manual order to one day. `order` must list exactly that
    /// day's places. Other days are untouched.
    pub fn reorder_day(&mut self, day_number: u32, order: &[String]) -> Result<()> {
        let day = self.day_slot(day_number)?;
        let current = &self.itineraries[day].items;

        let current_ids: HashSet<&str> = current.iter().map(|i| i.place_id.as_str()).collect();
        let requested_ids: HashSet<&str> = order.iter().map(String::as_str).collect();
        if order.len() != current.len() || current_ids != requested_ids {
            return Err(PlannerError::invalid_input(format!(
                "new order for day {day_number} must list exactly its {} places",
                current.len()
            )));
        }

        let mut by_id: HashMap<&str, &ScheduleItem> = current.iter().map(|i| (i.place_id.as_str(), i)).collect();
        let items: Vec<ScheduleItem> = order
            .iter()
            .filter_map(|id| by_id.remove(id.as_str()).cloned())
            .collect();

        self.itineraries[day].items = items;
        self.sync_cluster(day);
        self.recalculate(day)
    }

    /// Moves a place to `position` on another (or the same) day and
    /// re-stamps the affected days. Places with a commitment cannot move.
    pub fn move_place(&mut self, place_id: &str, to_day_number: u32, position: usize) -> Result<()> {
        let to_day = self.day_slot(to_day_number)?;
        let (from_day, from_position) = self.locate(place_id)?;
        if self.fixed_starts[from_day].contains_key(place_id) && from_day != to_day {
            return Err(PlannerError::invalid_input(format!(
                "{place_id} has a fixed commitment on day {}",
                from_day + 1
            )));
        }

        let item = self.itineraries[from_day].items.remove(from_position);
        let target = &mut self.itineraries[to_day].items;
        target.insert(position.min(target.len()), item);

        self.sync_cluster(from_day);
        self.recalculate(from_day)?;
        if to_day != from_day {
            self.sync_cluster(to_day);
            self.recalculate(to_day)?;
        }
        Ok(())
    }

    /// Drops a place from the plan and re-stamps its day.
    pub fn remove_place(&mut self, place_id: &str) -> Result<()> {
        let (day, position) = self.locate(place_id)?;
        self.itineraries[day].items.remove(position);
        self.fixed_starts[day].remove(place_id);
        self.sync_cluster(day);
        self.recalculate(day)
    }

    fn sync_cluster(&mut self, day: usize) {
        self.clusters[day].waypoint_ids = self.itineraries[day]
            .items
            .iter()
            .map(|item| item.place_id.clone())
            .collect();
    }

    /// Batching and pacing `enrich` runs with, taken from the planner.
    pub fn enrichment_options(&self) -> &EnrichmentOptions {
        &self.enrichment
    }

    /// Enriches every segment the plan uses, writes the results into the
    /// matrix and re-stamps all days with the corrected legs.
    pub fn enrich<R>(&mut self, provider: &R, control: EnrichmentControl<'_>) -> Result<EnrichmentReport>
    where
        R: RoutingProvider + ?Sized,
    {
        let keys = self
            .clusters
            .iter()
            .zip(&self.itineraries)
            .flat_map(|(cluster, itinerary)| day_segment_keys(&cluster.anchor, itinerary));
        let segments = collect_segments(keys, &self.matrix)?;

        let report = enrich_segments(&segments, provider, &self.enrichment, control)?;
        let applied = report.apply_to(&mut self.matrix)?;

        for day in 0..self.itineraries.len() {
            self.recalculate(day)?;
        }

        info!(segments = segments.len(), applied, "plan enriched");
        Ok(report)
    }
}

fn validate_input(input: &TripInput) -> Result<()> {
    if input.days == 0 {
        return Err(PlannerError::invalid_input("trip must span at least one day"));
    }
    if input.waypoints.is_empty() {
        return Err(PlannerError::invalid_input("trip has no waypoints"));
    }

    let mut seen = HashSet::new();
    for waypoint in &input.waypoints {
        if !seen.insert(waypoint.id.as_str()) {
            return Err(PlannerError::invalid_input(format!("duplicate waypoint id '{}'", waypoint.id)));
        }
        if let Some(day) = waypoint.day_lock {
            if day == 0 || day > input.days {
                return Err(PlannerError::invalid_input(format!(
                    "waypoint '{}' is locked to day {} of a {}-day trip",
                    waypoint.id, day, input.days
                )));
            }
        }
    }
    Ok(())
}

struct Pinning {
    fixed_days: FixedDays,
    fixed_starts: Vec<HashMap<String, ClockTime>>,
    in_trip: Vec<ResolvedCommitment>,
    outside_trip: Vec<Conflict>,
}

/// Works out which day each fixed waypoint belongs to. A commitment's date
/// wins over a contradicting day lock; a commitment outside the trip is
/// reported and its waypoint falls back to its lock, or to free planning.
fn pin_commitments(input: &TripInput, commitments: &[ResolvedCommitment]) -> Pinning {
    let mut fixed_days: FixedDays = input
        .waypoints
        .iter()
        .filter_map(|w| w.day_lock.map(|day| (w.id.clone(), day as usize - 1)))
        .collect();
    let mut fixed_starts: Vec<HashMap<String, ClockTime>> = vec![HashMap::new(); input.days as usize];
    let mut in_trip = Vec::new();
    let mut outside_trip = Vec::new();
    let mut committed: HashSet<&str> = HashSet::new();

    let mut ordered: Vec<&ResolvedCommitment> = commitments.iter().collect();
    ordered.sort_by(|a, b| (a.date, a.start, &a.id).cmp(&(b.date, b.start, &b.id)));

    for commitment in ordered {
        let Some(day) = day_index(input.start_date, input.days, commitment.date) else {
            warn!(commitment = %commitment.id, date = %commitment.date, "commitment outside trip dates");
            outside_trip.push(Conflict {
                kind: ConflictKind::OutsideTrip,
                date: commitment.date,
                commitment_ids: vec![commitment.id.clone()],
                message: format!("{} on {} is outside the trip", commitment.id, commitment.date),
            });
            continue;
        };

        in_trip.push(commitment.clone());
        if !committed.insert(commitment.waypoint_id.as_str()) {
            warn!(commitment = %commitment.id, "waypoint already committed, later entry not pinned");
            continue;
        }
        if let Some(locked) = fixed_days.get(&commitment.waypoint_id) {
            if *locked != day {
                warn!(
                    waypoint = %commitment.waypoint_id,
                    locked_day = locked + 1,
                    committed_day = day + 1,
                    "commitment date overrides day lock"
                );
            }
        }
        fixed_days.insert(commitment.waypoint_id.clone(), day);
        fixed_starts[day].insert(commitment.waypoint_id.clone(), commitment.start);
    }

    Pinning {
        fixed_days,
        fixed_starts,
        in_trip,
        outside_trip,
    }
}

/// Waypoints followed by each distinct anchor point.
fn matrix_places(input: &TripInput, anchors: &[Anchor]) -> Vec<(String, Coordinate)> {
    let mut places: Vec<(String, Coordinate)> = input
        .waypoints
        .iter()
        .map(|w| (w.id.clone(), w.coordinate))
        .collect();

    let mut seen = HashSet::new();
    for point in anchors.iter().flat_map(Anchor::points) {
        if seen.insert(point.id.clone()) {
            places.push((point.id.clone(), point.coordinate));
        }
    }
    places
}

/// Every input waypoint must appear exactly once in `ids`.
fn verify_partition<'a>(ids: impl Iterator<Item = &'a String>, waypoints: &[Waypoint], stage: &str) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(PlannerError::invariant(format!("{stage}: waypoint {id} placed twice")));
        }
    }
    for waypoint in waypoints {
        if !seen.contains(waypoint.id.as_str()) {
            return Err(PlannerError::invariant(format!("{stage}: waypoint {} was dropped", waypoint.id)));
        }
    }
    if seen.len() != waypoints.len() {
        return Err(PlannerError::invariant(format!("{stage}: unknown waypoint placed")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::HaversineMatrix;

    fn input(waypoints: Vec<Waypoint>, days: u32) -> TripInput {
        TripInput {
            days,
            start_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            start: Coordinate::new(37.5547, 126.9707),
            end: None,
            lodging: None,
            daily_max_minutes: None,
            waypoints,
        }
    }

    fn wp(id: &str, lat: f64, lng: f64) -> Waypoint {
        Waypoint::new(id, id, Coordinate::new(lat, lng))
    }

    #[test]
    fn test_rejects_empty_and_zero_days() {
        let planner = Planner::new(HaversineMatrix::default());
        assert!(matches!(planner.plan(&input(vec![], 1), &[]), Err(PlannerError::InvalidInput(_))));
        assert!(matches!(
            planner.plan(&input(vec![wp("a", 37.5, 127.0)], 0), &[]),
            Err(PlannerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids_and_bad_lock() {
        let planner = Planner::new(HaversineMatrix::default());
        let dupes = input(vec![wp("a", 37.5, 127.0), wp("a", 37.6, 127.0)], 1);
        assert!(planner.plan(&dupes, &[]).is_err());

        let bad_lock = input(vec![wp("a", 37.5, 127.0).locked_to_day(3)], 2);
        assert!(planner.plan(&bad_lock, &[]).is_err());
    }

    #[test]
    fn test_unknown_commitment_waypoint() {
        let planner = Planner::new(HaversineMatrix::default());
        let commitment = FixedCommitment {
            id: "c1".to_string(),
            waypoint_id: "ghost".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            start_time: ClockTime::from_hm(10, 0),
        };
        let result = planner.plan(&input(vec![wp("a", 37.5, 127.0)], 1), &[commitment]);
        assert!(matches!(result, Err(PlannerError::UnknownPlace(_))));
    }

    #[test]
    fn test_verify_partition() {
        let waypoints = vec![wp("a", 0.0, 0.0), wp("b", 0.0, 0.0)];
        let ids = ["a".to_string(), "b".to_string()];
        assert!(verify_partition(ids.iter(), &waypoints, "test").is_ok());

        let twice = ["a".to_string(), "a".to_string(), "b".to_string()];
        assert!(matches!(
            verify_partition(twice.iter(), &waypoints, "test"),
            Err(PlannerError::Invariant(_))
        ));

        let dropped = ["a".to_string()];
        assert!(verify_partition(dropped.iter(), &waypoints, "test").is_err());
    }

    #[test]
    fn test_commitment_date_pins_day() {
        let mut trip = input(vec![wp("a", 37.5, 127.0).fixed(), wp("b", 37.51, 127.01)], 3);
        trip.waypoints[0].day_lock = Some(1);
        let commitments = vec![FixedCommitment {
            id: "c1".to_string(),
            waypoint_id: "a".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            start_time: ClockTime::from_hm(14, 0),
        }];
        let waypoints: WaypointMap<'_> = trip.waypoints.iter().map(|w| (w.id.as_str(), w)).collect();
        let resolved = resolve_commitments(&commitments, &waypoints).unwrap();

        let pinning = pin_commitments(&trip, &resolved);

        assert_eq!(pinning.fixed_days.get("a"), Some(&2));
        assert_eq!(pinning.fixed_starts[2].get("a"), Some(&ClockTime::from_hm(14, 0)));
        assert!(pinning.outside_trip.is_empty());
    }

    #[test]
    fn test_options_fill_missing_fields_with_defaults() {
        let options: PlannerOptions =
            serde_json::from_str(r#"{"daily_max_minutes": 360, "window": {"start": "08:00"}}"#).unwrap();
        assert_eq!(options.daily_max_minutes, 360);
        assert_eq!(options.window.start, ClockTime::from_hm(8, 0));
        assert_eq!(options.window.end, ClockTime::from_hm(21, 0));
        assert_eq!(options.zoning, ZoningOptions::default());
    }
}
