use std::collections::BTreeSet;

use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// Meetings from `booked` that share a participant with `participant_ids` and
/// overlap `candidate`. `exclude` drops one meeting id: an update must not
/// conflict with the meeting it is moving.
///
/// Touching slots (`a.end == b.start`) are not conflicts.
pub fn conflicting(
    candidate: &TimeSlot,
    participant_ids: &BTreeSet<Ulid>,
    booked: &[Meeting],
    exclude: Option<Ulid>,
) -> Vec<Meeting> {
    booked
        .iter()
        .filter(|m| Some(m.id) != exclude)
        .filter(|m| m.slot.overlaps(candidate) && m.shares_participant(participant_ids))
        .cloned()
        .collect()
}

pub(super) fn validate_candidate(
    candidate: &TimeSlot,
    participant_ids: &BTreeSet<Ulid>,
) -> Result<(), EngineError> {
    if candidate.start >= candidate.end {
        return Err(EngineError::InvalidTimeRange);
    }
    if participant_ids.is_empty() {
        return Err(EngineError::NoParticipants);
    }
    Ok(())
}

impl Engine {
    /// Every stored meeting that shares a participant with `participant_ids`
    /// and overlaps `candidate`. Read-only; an empty result means the
    /// candidate is bookable for all of them.
    pub async fn find_conflicts(
        &self,
        candidate: &TimeSlot,
        participant_ids: &BTreeSet<Ulid>,
    ) -> Result<Vec<Meeting>, EngineError> {
        validate_candidate(candidate, participant_ids)?;
        self.conflicts_excluding(candidate, participant_ids, None).await
    }

    pub(super) async fn conflicts_excluding(
        &self,
        candidate: &TimeSlot,
        participant_ids: &BTreeSet<Ulid>,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Meeting>, EngineError> {
        let booked = self
            .bounded(
                "query_overlapping",
                self.store
                    .query_overlapping(participant_ids, candidate.start, candidate.end),
            )
            .await?;
        // Store-side filtering is re-applied locally.
        Ok(conflicting(candidate, participant_ids, &booked, exclude))
    }
}
