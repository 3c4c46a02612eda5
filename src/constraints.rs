//! Fixed-commitment validation and per-day free/blocked time slots.
//!
//! Every detector here is pure and returns conflicts as values. Whether a
//! conflict blocks planning is the caller's decision.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::model::{FixedCommitment, WaypointMap};
use crate::time::{ClockTime, dates_between};

/// A commitment with its derived end time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCommitment {
    pub id: String,
    pub waypoint_id: String,
    pub date: NaiveDate,
    pub start: ClockTime,
    pub end: ClockTime,
}

impl ResolvedCommitment {
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.start, self.end)
    }

    pub fn duration(&self) -> u32 {
        self.start.minutes_until(self.end)
    }
}

/// Derives `end = start + stay` for every commitment. A commitment naming an
/// unknown waypoint is an input error.
pub fn resolve_commitments(
    commitments: &[FixedCommitment],
    waypoints: &WaypointMap<'_>,
) -> Result<Vec<ResolvedCommitment>> {
    commitments
        .iter()
        .map(|commitment| {
            let waypoint = waypoints
                .get(commitment.waypoint_id.as_str())
                .ok_or_else(|| PlannerError::unknown_place(&commitment.waypoint_id))?;
            Ok(ResolvedCommitment {
                id: commitment.id.clone(),
                waypoint_id: commitment.waypoint_id.clone(),
                date: commitment.date,
                start: commitment.start_time,
                end: commitment.start_time.add_minutes(waypoint.stay_minutes),
            })
        })
        .collect()
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeSlot {
    pub fn new(start: ClockTime, end: ClockTime) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> u32 {
        self.start.minutes_until(self.end)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when `[start, start + duration)` lies inside this slot.
    pub fn fits(&self, start: ClockTime, duration: u32) -> bool {
        self.start <= start && start.add_minutes(duration) <= self.end
    }

    /// Touching intervals do not overlap.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// The operating hours of a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayWindow {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl Default for DayWindow {
    fn default() -> Self {
        Self {
            start: ClockTime::from_hm(9, 0),
            end: ClockTime::from_hm(21, 0),
        }
    }
}

impl DayWindow {
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.start, self.end)
    }
}

/// Inclusive date range plus daily operating hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day: DayWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictKind {
    Overlap,
    OutOfHours,
    DailyLimit { total_minutes: u32, limit_minutes: u32 },
    OutsideTrip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ConflictKind,
    pub date: NaiveDate,
    pub commitment_ids: Vec<String>,
    pub message: String,
}

/// Reports every pair of commitments overlapping on the same date.
///
/// Sorted sweep: each commitment is compared only against those still open at
/// its start, so the cost is `O(n log n + k)` for `k` reported pairs.
pub fn detect_schedule_conflicts(commitments: &[ResolvedCommitment]) -> Vec<Conflict> {
    let mut sorted: Vec<&ResolvedCommitment> = commitments.iter().collect();
    sorted.sort_by(|a, b| {
        (a.date, a.start, a.end, &a.id).cmp(&(b.date, b.start, b.end, &b.id))
    });

    let mut conflicts = Vec::new();
    let mut open: Vec<&ResolvedCommitment> = Vec::new();
    let mut current_date: Option<NaiveDate> = None;

    for commitment in sorted {
        if current_date != Some(commitment.date) {
            open.clear();
            current_date = Some(commitment.date);
        }
        open.retain(|earlier| earlier.end > commitment.start);

        for earlier in &open {
            if earlier.slot().overlaps(&commitment.slot()) {
                conflicts.push(Conflict {
                    kind: ConflictKind::Overlap,
                    date: commitment.date,
                    commitment_ids: vec![earlier.id.clone(), commitment.id.clone()],
                    message: format!(
                        "{} ({}-{}) overlaps {} ({}-{})",
                        earlier.id, earlier.start, earlier.end, commitment.id, commitment.start, commitment.end
                    ),
                });
            }
        }
        open.push(commitment);
    }

    conflicts
}

/// Flags commitments starting before `day_start` or ending after `day_end`.
pub fn detect_out_of_hours_conflicts(
    commitments: &[ResolvedCommitment],
    day_start: ClockTime,
    day_end: ClockTime,
) -> Vec<Conflict> {
    commitments
        .iter()
        .filter(|c| c.start < day_start || c.end > day_end)
        .map(|c| Conflict {
            kind: ConflictKind::OutOfHours,
            date: c.date,
            commitment_ids: vec![c.id.clone()],
            message: format!(
                "{} ({}-{}) falls outside operating hours {}-{}",
                c.id, c.start, c.end, day_start, day_end
            ),
        })
        .collect()
}

/// Flags dates whose committed minutes exceed `max_daily_minutes`.
pub fn detect_daily_limit_conflicts(commitments: &[ResolvedCommitment], max_daily_minutes: u32) -> Vec<Conflict> {
    let mut per_date: BTreeMap<NaiveDate, (u32, Vec<String>)> = BTreeMap::new();
    for c in commitments {
        let entry = per_date.entry(c.date).or_default();
        entry.0 += c.duration();
        entry.1.push(c.id.clone());
    }

    per_date
        .into_iter()
        .filter(|(_, (total, _))| *total > max_daily_minutes)
        .map(|(date, (total, ids))| Conflict {
            kind: ConflictKind::DailyLimit {
                total_minutes: total,
                limit_minutes: max_daily_minutes,
            },
            date,
            commitment_ids: ids,
            message: format!("{total} committed minutes on {date} exceed the {max_daily_minutes} minute limit"),
        })
        .collect()
}

/// Free and blocked time for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayConstraint {
    pub date: NaiveDate,
    /// Sorted, disjoint, never adjacent.
    pub free_slots: Vec<TimeSlot>,
    /// Commitments clipped to the window, merged.
    pub blocked_slots: Vec<TimeSlot>,
}

impl DayConstraint {
    pub fn can_place_at(&self, start: ClockTime, duration: u32) -> bool {
        self.free_slots.iter().any(|slot| slot.fits(start, duration))
    }

    /// Earliest start at or after `preferred_start` that fits. Failing that,
    /// the latest start in an earlier slot large enough to hold `duration`.
    pub fn find_available_slot(&self, duration: u32, preferred_start: Option<ClockTime>) -> Option<ClockTime> {
        let preferred = preferred_start.unwrap_or(ClockTime::MIDNIGHT);

        let forward = self.free_slots.iter().find_map(|slot| {
            let candidate = slot.start.max(preferred);
            slot.fits(candidate, duration).then_some(candidate)
        });
        if forward.is_some() {
            return forward;
        }

        self.free_slots
            .iter()
            .rev()
            .filter(|slot| slot.start < preferred && slot.duration() >= duration)
            .map(|slot| ClockTime::from_minutes(slot.end.minutes() - duration))
            .next()
    }

    pub fn overlaps_blocked(&self, start: ClockTime, duration: u32) -> bool {
        let probe = TimeSlot::new(start, start.add_minutes(duration));
        self.blocked_slots.iter().any(|slot| slot.overlaps(&probe))
    }

    pub fn free_minutes(&self) -> u32 {
        self.free_slots.iter().map(TimeSlot::duration).sum()
    }
}

/// Free-slot lists for every date of a trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyConstraints {
    days: BTreeMap<NaiveDate, DayConstraint>,
}

impl DailyConstraints {
    pub fn day(&self, date: NaiveDate) -> Option<&DayConstraint> {
        self.days.get(&date)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DayConstraint> {
        self.days.values()
    }

    /// False for dates outside the trip.
    pub fn can_place_at(&self, date: NaiveDate, start: ClockTime, duration: u32) -> bool {
        self.day(date).is_some_and(|day| day.can_place_at(start, duration))
    }

    pub fn find_available_slot(
        &self,
        date: NaiveDate,
        duration: u32,
        preferred_start: Option<ClockTime>,
    ) -> Option<ClockTime> {
        self.day(date)?.find_available_slot(duration, preferred_start)
    }
}

/// Subtracts commitments from each day's operating window.
pub fn calculate_daily_constraints(commitments: &[ResolvedCommitment], window: &TripWindow) -> DailyConstraints {
    let mut by_date: BTreeMap<NaiveDate, Vec<TimeSlot>> = BTreeMap::new();
    for c in commitments {
        by_date.entry(c.date).or_default().push(c.slot());
    }

    let days = dates_between(window.start_date, window.end_date)
        .into_iter()
        .map(|date| {
            let raw = by_date.remove(&date).unwrap_or_default();
            let blocked_slots = merge_slots(clip_slots(raw, window.day.slot()));
            let free_slots = subtract_slots(window.day.slot(), &blocked_slots);
            (
                date,
                DayConstraint {
                    date,
                    free_slots,
                    blocked_slots,
                },
            )
        })
        .collect();

    DailyConstraints { days }
}

fn clip_slots(slots: Vec<TimeSlot>, bounds: TimeSlot) -> Vec<TimeSlot> {
    slots
        .into_iter()
        .map(|slot| TimeSlot::new(slot.start.max(bounds.start), slot.end.min(bounds.end)))
        .filter(|slot| !slot.is_empty())
        .collect()
}

/// Sorts and merges overlapping or touching slots.
fn merge_slots(mut slots: Vec<TimeSlot>) -> Vec<TimeSlot> {
    slots.sort();
    let mut merged: Vec<TimeSlot> = Vec::with_capacity(slots.len());
    for slot in slots {
        match merged.last_mut() {
            Some(last) if slot.start <= last.end => last.end = last.end.max(slot.end),
            _ => merged.push(slot),
        }
    }
    merged
}

/// `bounds` minus sorted, merged `blocked`.
fn subtract_slots(bounds: TimeSlot, blocked: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut free = Vec::new();
    let mut cursor = bounds.start;
    for slot in blocked {
        if slot.start > cursor {
            free.push(TimeSlot::new(cursor, slot.start));
        }
        cursor = cursor.max(slot.end);
    }
    if cursor < bounds.end {
        free.push(TimeSlot::new(cursor, bounds.end));
    }
    free
}
