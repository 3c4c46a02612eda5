//! Transit enrichment of the segments a finished itinerary actually uses.
//!
//! Segments are deduplicated by `(from, to)` and fetched in fixed-size
//! batches on a worker pool no wider than the concurrency limit, with a pause
//! between batches. Every segment owns a result slot allocated before
//! dispatch and initialised to a fallback, so a failed or cancelled request
//! simply leaves its slot untouched.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PlannerError, Result};
use crate::matrix::DistanceMatrix;
use crate::model::{Anchor, Coordinate, DailyItinerary};
use crate::traits::{RouteLeg, RoutingProvider};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentOptions {
    /// Maximum requests in flight at once.
    pub concurrency_limit: usize,
    /// Requests per batch; defaults to the concurrency limit.
    pub batch_size: Option<usize>,
    /// Pause between batches.
    pub batch_delay_ms: u64,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            batch_size: None,
            batch_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SegmentKey {
    pub from: String,
    pub to: String,
}

impl SegmentKey {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRequest {
    pub key: SegmentKey,
    pub from: Coordinate,
    pub to: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackReason {
    Failed { message: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOutcome {
    Enriched(RouteLeg),
    /// The segment keeps its prior estimate.
    Fallback(FallbackReason),
}

impl SegmentOutcome {
    pub fn is_enriched(&self) -> bool {
        matches!(self, SegmentOutcome::Enriched(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentProgress {
    pub completed: usize,
    pub total: usize,
}

/// Cancellation and progress hooks for an enrichment run.
#[derive(Clone, Copy, Default)]
pub struct EnrichmentControl<'a> {
    pub cancel: Option<&'a AtomicBool>,
    pub progress: Option<&'a (dyn Fn(EnrichmentProgress) + Sync)>,
}

impl EnrichmentControl<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentReport {
    pub outcomes: BTreeMap<SegmentKey, SegmentOutcome>,
    pub cancelled: bool,
}

impl EnrichmentReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn enriched_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_enriched()).count()
    }

    pub fn fallback_count(&self) -> usize {
        self.len() - self.enriched_count()
    }

    /// Writes every enriched leg into `matrix`; returns how many were applied.
    pub fn apply_to(&self, matrix: &mut DistanceMatrix) -> Result<usize> {
        let mut applied = 0;
        for (key, outcome) in &self.outcomes {
            if let SegmentOutcome::Enriched(leg) = outcome {
                matrix.apply_leg(&key.from, &key.to, leg.clone())?;
                applied += 1;
            }
        }
        Ok(applied)
    }
}

/// Every directed leg a day travels: start anchor to first stop, stop to
/// stop, last stop to end anchor.
pub fn day_segment_keys(anchor: &Anchor, itinerary: &DailyItinerary) -> Vec<SegmentKey> {
    let mut keys = Vec::new();
    let (Some(first), Some(last)) = (itinerary.items.first(), itinerary.items.last()) else {
        return keys;
    };

    if let Some(start) = &anchor.start {
        keys.push(SegmentKey::new(&start.id, &first.place_id));
    }
    for pair in itinerary.items.windows(2) {
        keys.push(SegmentKey::new(&pair[0].place_id, &pair[1].place_id));
    }
    if let Some(end) = &anchor.end {
        keys.push(SegmentKey::new(&last.place_id, &end.id));
    }
    keys
}

/// Deduplicates `keys` (first occurrence wins) and resolves coordinates.
/// A key naming a place the matrix does not know is a caller bug.
pub fn collect_segments(
    keys: impl IntoIterator<Item = SegmentKey>,
    matrix: &DistanceMatrix,
) -> Result<Vec<SegmentRequest>> {
    let mut seen = HashSet::new();
    let mut requests = Vec::new();
    for key in keys {
        if !seen.insert(key.clone()) {
            continue;
        }
        let from = matrix
            .coordinate(&key.from)
            .ok_or_else(|| PlannerError::unknown_place(&key.from))?;
        let to = matrix
            .coordinate(&key.to)
            .ok_or_else(|| PlannerError::unknown_place(&key.to))?;
        requests.push(SegmentRequest { key, from, to });
    }
    Ok(requests)
}

/// Fetches routed detail for each segment. Individual failures and
/// cancellation only produce fallback entries; the report always holds one
/// entry per segment.
pub fn enrich_segments<R>(
    segments: &[SegmentRequest],
    provider: &R,
    options: &EnrichmentOptions,
    control: EnrichmentControl<'_>,
) -> Result<EnrichmentReport>
where
    R: RoutingProvider + ?Sized,
{
    let total = segments.len();
    let limit = options.concurrency_limit.max(1);
    let batch_size = options.batch_size.unwrap_or(limit).max(1);
    let delay = Duration::from_millis(options.batch_delay_ms);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(limit)
        .thread_name(|i| format!("enrich-{i}"))
        .build()?;

    let mut slots: Vec<SegmentOutcome> = vec![SegmentOutcome::Fallback(FallbackReason::Cancelled); total];
    let mut completed = 0;
    let mut cancelled = false;
    let skipped = AtomicBool::new(false);

    for (batch, (requests, batch_slots)) in segments
        .chunks(batch_size)
        .zip(slots.chunks_mut(batch_size))
        .enumerate()
    {
        if batch > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }
        if control.is_cancelled() {
            cancelled = true;
            break;
        }

        pool.install(|| {
            batch_slots
                .par_iter_mut()
                .zip(requests.par_iter())
                .for_each(|(slot, request)| {
                    if control.is_cancelled() {
                        skipped.store(true, Ordering::Relaxed);
                        return;
                    }
                    *slot = match provider.route(request.from, request.to) {
                        Ok(leg) => SegmentOutcome::Enriched(leg),
                        Err(err) => {
                            warn!(segment = %request.key, error = %err, "enrichment failed, keeping estimate");
                            SegmentOutcome::Fallback(FallbackReason::Failed {
                                message: err.to_string(),
                            })
                        }
                    };
                });
        });

        completed += requests.len();
        if let Some(progress) = control.progress {
            progress(EnrichmentProgress { completed, total });
        }
    }

    cancelled |= skipped.load(Ordering::Relaxed);

    let report = EnrichmentReport {
        outcomes: segments
            .iter()
            .map(|request| request.key.clone())
            .zip(slots)
            .collect(),
        cancelled,
    };

    info!(
        segments = total,
        enriched = report.enriched_count(),
        cancelled = report.cancelled,
        "transit enrichment finished"
    );

    Ok(report)
}
