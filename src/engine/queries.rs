use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Clamped `(page, page_size, offset)`.
fn clamp_page(page: usize, page_size: usize) -> (usize, usize, usize) {
    let page = page.max(MIN_PAGE);
    let page_size = page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
    (page, page_size, (page - 1).saturating_mul(page_size))
}

impl Engine {
    pub async fn get_meeting(&self, id: Ulid) -> Result<Meeting, EngineError> {
        self.bounded("get_meeting", self.store.get_meeting(id))
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn get_participant(&self, id: Ulid) -> Result<Participant, EngineError> {
        self.bounded("get_participant", self.store.get_participant(id))
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// One page of all meetings ordered by `(start, id)`. Pages are 1-based;
    /// out-of-range `page` and `page_size` are clamped, never rejected.
    pub async fn list_meetings(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<Page<Meeting>, EngineError> {
        let (page, page_size, offset) = clamp_page(page, page_size);
        let (items, total_count) = self
            .bounded("list_meetings", self.store.list_meetings(offset, page_size))
            .await?;
        Ok(Page {
            items,
            total_count,
            page,
            page_size,
        })
    }

    /// One page of registered participants ordered by id, clamped like
    /// `list_meetings`.
    pub async fn list_participants(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<Page<Participant>, EngineError> {
        let (page, page_size, offset) = clamp_page(page, page_size);
        let (items, total_count) = self
            .bounded("list_participants", self.store.list_participants(offset, page_size))
            .await?;
        Ok(Page {
            items,
            total_count,
            page,
            page_size,
        })
    }

    /// A participant's meetings in start order, rendered in their timezone.
    pub async fn participant_schedule(
        &self,
        participant_id: Ulid,
    ) -> Result<Vec<LocalMeeting>, EngineError> {
        let participant = self.get_participant(participant_id).await?;
        let meetings = self
            .bounded(
                "participant_meetings",
                self.store.participant_meetings(participant_id),
            )
            .await?;
        Ok(meetings
            .into_iter()
            .map(|m| LocalMeeting::from_meeting(m, participant.timezone))
            .collect())
    }
}
