//! The persistence collaborator the booking engine talks to.
//!
//! The engine only relies on [`MeetingStore`]; [`InMemoryStore`] is the
//! implementation shipped with the crate.

mod memory;

pub use memory::InMemoryStore;

use std::collections::BTreeSet;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::{Meeting, Participant, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Transient failure: I/O, a dead writer task, a backend that went away.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Storage operations the engine needs. Implementations do not enforce
/// conflict rules; the engine serializes writes per participant before
/// calling `insert`/`replace`/`delete`.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Participants for the ids that exist. Unknown ids are simply absent.
    async fn resolve_participants(&self, ids: &BTreeSet<Ulid>) -> Result<Vec<Participant>, StoreError>;

    async fn get_participant(&self, id: Ulid) -> Result<Option<Participant>, StoreError>;

    async fn insert_participant(&self, participant: Participant) -> Result<Participant, StoreError>;

    /// One page of participants ordered by id, plus the total count.
    async fn list_participants(&self, offset: usize, limit: usize) -> Result<(Vec<Participant>, usize), StoreError>;

    /// Meetings with at least one of `participant_ids` whose slot overlaps
    /// `[start, end)`. Each meeting once, ordered by `(slot.start, id)`.
    async fn query_overlapping(
        &self,
        participant_ids: &BTreeSet<Ulid>,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Meeting>, StoreError>;

    async fn get_meeting(&self, id: Ulid) -> Result<Option<Meeting>, StoreError>;

    /// Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, meeting: Meeting) -> Result<Meeting, StoreError>;

    /// Fails with `NotFound` if there is nothing to replace.
    async fn replace(&self, meeting: Meeting) -> Result<Meeting, StoreError>;

    /// Returns whether a meeting was removed.
    async fn delete(&self, id: Ulid) -> Result<bool, StoreError>;

    /// One page of all meetings ordered by `(slot.start, id)`, plus the total count.
    async fn list_meetings(&self, offset: usize, limit: usize) -> Result<(Vec<Meeting>, usize), StoreError>;

    /// Every meeting of one participant, ordered by `(slot.start, id)`.
    async fn participant_meetings(&self, participant_id: Ulid) -> Result<Vec<Meeting>, StoreError>;
}
