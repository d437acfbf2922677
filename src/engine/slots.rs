use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::validate_candidate;
use super::{Engine, EngineError};

// ── Alternative-slot search ───────────────────────────────────────

/// Bounds for one alternative search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSearch {
    /// Search `[rejected.start, rejected.start + horizon)`.
    pub horizon: TimeDelta,
    pub max_results: usize,
}

impl SlotSearch {
    /// The window searched for replacements of `rejected`. Never shorter
    /// than `rejected` itself.
    pub fn window(&self, rejected: &TimeSlot) -> TimeSlot {
        let end = rejected
            .start
            .checked_add_signed(self.horizon)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        TimeSlot {
            start: rejected.start,
            end: end.max(rejected.end),
        }
    }
}

/// Carve up to `search.max_results` slots of the rejected duration out of the
/// free time between `busy` meetings.
///
/// Meetings overlapping the search window are ordered by `(start, id)`. Slots
/// are cut back to back from the busy frontier (the latest end seen so far)
/// up to the next meeting's start, then after the final frontier until the
/// window closes. With nothing busy in the window the rejected slot itself is
/// returned.
///
/// The scan gives up after `MAX_SLOT_SCAN_STEPS` busy meetings and cut slots
/// combined, so a crowded window costs bounded work.
///
/// No returned slot overlaps any meeting in the window, every slot has exactly
/// the rejected duration, and the output depends only on the inputs.
pub fn carve_alternatives(rejected: &TimeSlot, busy: &[Meeting], search: &SlotSearch) -> Vec<TimeSlot> {
    let duration = rejected.duration();
    if search.max_results == 0 || duration <= TimeDelta::zero() {
        return Vec::new();
    }
    let window = search.window(rejected);

    let mut ordered: Vec<&Meeting> = busy.iter().filter(|m| m.slot.overlaps(&window)).collect();
    ordered.sort_by_key(|m| (m.slot.start, m.id));
    ordered.dedup_by_key(|m| m.id);

    let Some((first, rest)) = ordered.split_first() else {
        return vec![*rejected];
    };

    let mut carver = Carver {
        duration,
        max_results: search.max_results,
        steps: 0,
        found: Vec::with_capacity(search.max_results),
    };

    let mut frontier = first.slot.end;
    for next in rest {
        if carver.done() {
            break;
        }
        carver.steps += 1;
        carver.fill(frontier, next.slot.start);
        frontier = frontier.max(next.slot.end);
    }
    carver.fill(frontier, window.end);

    carver.found
}

struct Carver {
    duration: TimeDelta,
    max_results: usize,
    /// Busy meetings visited plus slots cut.
    steps: usize,
    found: Vec<TimeSlot>,
}

impl Carver {
    fn done(&self) -> bool {
        self.found.len() >= self.max_results || self.steps >= MAX_SLOT_SCAN_STEPS
    }

    /// Cut consecutive slots from `[gap_start, gap_end)`.
    fn fill(&mut self, gap_start: Timestamp, gap_end: Timestamp) {
        let mut cursor = gap_start;
        while !self.done() {
            let Some(slot) = TimeSlot::starting_at(cursor, self.duration) else {
                return;
            };
            if slot.end > gap_end {
                return;
            }
            self.steps += 1;
            self.found.push(slot);
            cursor = slot.end;
        }
    }
}

impl Engine {
    /// Up to `max_results` slots of the rejected duration that are free for
    /// every participant, searching `horizon` past the rejected start.
    pub async fn find_alternatives(
        &self,
        rejected: &TimeSlot,
        participant_ids: &BTreeSet<Ulid>,
        horizon: TimeDelta,
        max_results: usize,
    ) -> Result<Vec<TimeSlot>, EngineError> {
        validate_candidate(rejected, participant_ids)?;
        if horizon <= TimeDelta::zero() {
            return Err(EngineError::InvalidTimeRange);
        }
        let search = SlotSearch {
            horizon: horizon.min(TimeDelta::hours(MAX_SEARCH_HORIZON_HOURS)),
            max_results: max_results.min(MAX_ALTERNATIVES),
        };
        self.alternatives_excluding(rejected, participant_ids, &search, None)
            .await
    }

    pub(super) async fn alternatives_excluding(
        &self,
        rejected: &TimeSlot,
        participant_ids: &BTreeSet<Ulid>,
        search: &SlotSearch,
        exclude: Option<Ulid>,
    ) -> Result<Vec<TimeSlot>, EngineError> {
        let window = search.window(rejected);
        let mut busy = self
            .bounded(
                "query_overlapping",
                self.store
                    .query_overlapping(participant_ids, window.start, window.end),
            )
            .await?;
        busy.retain(|m| Some(m.id) != exclude && m.shares_participant(participant_ids));
        Ok(carve_alternatives(rejected, &busy, search))
    }
}
