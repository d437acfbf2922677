use std::collections::BTreeSet;
use std::time::Instant;

use chrono_tz::Tz;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::ALTERNATIVES_OFFERED;

use super::{record_outcome, Engine, EngineError};

/// A request that passed validation: trimmed title, UTC slot, distinct ids.
struct ValidRequest {
    title: String,
    slot: TimeSlot,
    participant_ids: BTreeSet<Ulid>,
}

fn validate_request(request: MeetingRequest) -> Result<ValidRequest, EngineError> {
    let title = request.title.trim();
    if title.is_empty() || title.len() > MAX_TITLE_LEN {
        return Err(EngineError::InvalidTitle);
    }
    let slot =
        TimeSlot::normalized(&request.start, &request.end).ok_or(EngineError::InvalidTimeRange)?;
    let participant_ids: BTreeSet<Ulid> = request.participant_ids.into_iter().collect();
    if participant_ids.is_empty() {
        return Err(EngineError::NoParticipants);
    }
    if participant_ids.len() > MAX_PARTICIPANTS_PER_MEETING {
        return Err(EngineError::LimitExceeded("too many participants"));
    }
    Ok(ValidRequest {
        title: title.to_string(),
        slot,
        participant_ids,
    })
}

impl Engine {
    pub async fn register_participant(
        &self,
        name: &str,
        timezone: &str,
    ) -> Result<Participant, EngineError> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidName);
        }
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| EngineError::InvalidTimezone(timezone.to_string()))?;

        let participant = Participant {
            id: Ulid::new(),
            name: name.to_string(),
            timezone,
        };
        let store = self.store.clone();
        let participant = self
            .commit("insert_participant", Vec::new(), async move {
                store.insert_participant(participant).await
            })
            .await?;
        info!(participant_id = %participant.id, tz = %participant.timezone, "participant registered");
        Ok(participant)
    }

    /// Book a new meeting, or fail with `SchedulingConflict` carrying
    /// alternatives when any participant is already busy.
    pub async fn create_meeting(&self, request: MeetingRequest) -> Result<Meeting, EngineError> {
        let started = Instant::now();
        let result = self.book(None, request).await;
        record_outcome("create", started, &result);
        result
    }

    /// Move or rewrite an existing meeting through the same checks as a create.
    /// The meeting never conflicts with itself.
    pub async fn update_meeting(
        &self,
        id: Ulid,
        request: MeetingRequest,
    ) -> Result<Meeting, EngineError> {
        let started = Instant::now();
        let result = self.book(Some(id), request).await;
        record_outcome("update", started, &result);
        result
    }

    /// Unconditional removal; no conflict check.
    pub async fn delete_meeting(&self, id: Ulid) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.remove(id).await;
        record_outcome("delete", started, &result);
        result
    }

    async fn book(
        &self,
        existing_id: Option<Ulid>,
        request: MeetingRequest,
    ) -> Result<Meeting, EngineError> {
        let ValidRequest {
            title,
            slot,
            participant_ids,
        } = validate_request(request)?;

        let meeting_lock = match existing_id {
            Some(id) => Some(self.lock_meeting(id).await?),
            None => None,
        };
        let existing = match existing_id {
            Some(id) => Some(
                self.bounded("get_meeting", self.store.get_meeting(id))
                    .await?
                    .ok_or(EngineError::NotFound(id))?,
            ),
            None => None,
        };

        let resolved: BTreeSet<Ulid> = self
            .bounded(
                "resolve_participants",
                self.store.resolve_participants(&participant_ids),
            )
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if resolved.is_empty() {
            return Err(EngineError::UnknownParticipants);
        }
        if resolved.len() < participant_ids.len() {
            debug!(
                requested = participant_ids.len(),
                resolved = resolved.len(),
                "dropping unknown participant ids"
            );
        }

        // An update also locks the participants it is leaving.
        let mut touched = resolved.clone();
        if let Some(old) = &existing {
            touched.extend(old.participants.iter().copied());
        }
        let participant_locks = self.lock_participants(&touched).await?;

        let exclude = existing.as_ref().map(|m| m.id);
        let conflicts = self.conflicts_excluding(&slot, &resolved, exclude).await?;
        if !conflicts.is_empty() {
            let alternatives = self
                .alternatives_excluding(&slot, &resolved, &self.slot_search(), exclude)
                .await?;
            metrics::histogram!(ALTERNATIVES_OFFERED).record(alternatives.len() as f64);
            debug!(
                %slot,
                conflicts = conflicts.len(),
                alternatives = alternatives.len(),
                "booking rejected"
            );
            return Err(EngineError::SchedulingConflict { alternatives });
        }

        let meeting = Meeting {
            id: existing_id.unwrap_or_else(Ulid::new),
            title,
            slot,
            participants: resolved,
        };
        let held = meeting_lock.into_iter().chain([participant_locks]).collect();
        let store = self.store.clone();
        let meeting = match existing_id {
            Some(_) => {
                self.commit("replace", held, async move { store.replace(meeting).await })
                    .await?
            }
            None => {
                self.commit("insert", held, async move { store.insert(meeting).await })
                    .await?
            }
        };
        info!(
            meeting_id = %meeting.id,
            slot = %meeting.slot,
            participants = meeting.participants.len(),
            updated = existing_id.is_some(),
            "meeting booked"
        );
        Ok(meeting)
    }

    async fn remove(&self, id: Ulid) -> Result<(), EngineError> {
        let meeting_lock = self.lock_meeting(id).await?;
        let meeting = self
            .bounded("get_meeting", self.store.get_meeting(id))
            .await?
            .ok_or(EngineError::NotFound(id))?;
        let participant_locks = self.lock_participants(&meeting.participants).await?;
        let store = self.store.clone();
        let removed = self
            .commit("delete", vec![meeting_lock, participant_locks], async move {
                store.delete(id).await
            })
            .await?;
        if !removed {
            return Err(EngineError::NotFound(id));
        }
        info!(meeting_id = %id, "meeting deleted");
        Ok(())
    }
}
