use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

use super::{MeetingStore, StoreError};

/// Participants, meetings and per-participant calendars. Shared between the
/// store handle and the WAL writer task, which is the only mutator once a
/// WAL is attached.
#[derive(Default)]
struct Tables {
    participants: DashMap<Ulid, Participant>,
    meetings: DashMap<Ulid, Meeting>,
    /// Participant id → that participant's bookings sorted by start.
    calendars: DashMap<Ulid, Calendar>,
}

impl Tables {
    fn index(&self, meeting: &Meeting) {
        let entry = CalendarEntry {
            meeting_id: meeting.id,
            slot: meeting.slot,
        };
        for pid in &meeting.participants {
            self.calendars.entry(*pid).or_default().insert(entry);
        }
    }

    fn unindex(&self, meeting: &Meeting) {
        for pid in &meeting.participants {
            if let Some(mut cal) = self.calendars.get_mut(pid) {
                cal.remove(meeting.id);
            }
            self.calendars.remove_if(pid, |_, cal| cal.is_empty());
        }
    }

    fn apply(&self, event: &Event) {
        match event {
            Event::ParticipantRegistered { participant } => {
                self.participants.insert(participant.id, participant.clone());
            }
            Event::MeetingCreated { meeting } | Event::MeetingReplaced { meeting } => {
                if let Some(old) = self.meetings.insert(meeting.id, meeting.clone()) {
                    self.unindex(&old);
                }
                self.index(meeting);
            }
            Event::MeetingDeleted { id } => {
                if let Some((_, old)) = self.meetings.remove(id) {
                    self.unindex(&old);
                }
            }
        }
    }

    /// The minimal event list that recreates the current state.
    fn snapshot(&self) -> Vec<Event> {
        let mut participants: Vec<Participant> =
            self.participants.iter().map(|e| e.value().clone()).collect();
        participants.sort_by_key(|p| p.id);
        let mut meetings: Vec<Meeting> = self.meetings.iter().map(|e| e.value().clone()).collect();
        meetings.sort_by_key(|m| m.id);

        participants
            .into_iter()
            .map(|participant| Event::ParticipantRegistered { participant })
            .chain(meetings.into_iter().map(|meeting| Event::MeetingCreated { meeting }))
            .collect()
    }

    fn sorted_meetings(&self, ids: impl IntoIterator<Item = Ulid>) -> Vec<Meeting> {
        let mut found: Vec<Meeting> = ids
            .into_iter()
            .filter_map(|id| self.meetings.get(&id).map(|m| m.value().clone()))
            .collect();
        found.sort_by_key(|m| (m.slot.start, m.id));
        found
    }
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One fsync for the whole batch, apply it to the tables, then answer
///    every sender.
///
/// A caller that stops waiting on its reply cannot split the log from memory:
/// the event reaches both or neither.
async fn wal_writer_loop(mut wal: Wal, tables: Arc<Tables>, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, &tables, cmd);
            continue;
        };

        let mut events = vec![event];
        let mut senders = vec![response];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => {
                    events.push(event);
                    senders.push(response);
                }
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(events.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = wal.append_batch(&events);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());

        match &result {
            Ok(()) => events.iter().for_each(|e| tables.apply(e)),
            Err(e) => warn!(batch = events.len(), "WAL append failed: {e}"),
        }
        for tx in senders {
            let _ = tx.send(
                result
                    .as_ref()
                    .map(|_| ())
                    .map_err(|e| io::Error::new(e.kind(), e.to_string())),
            );
        }

        // Commands queued behind the batch run only after it is applied.
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, &tables, cmd);
        }
    }
}

fn handle_non_append(wal: &mut Wal, tables: &Tables, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { response } => {
            // Every earlier append is already applied, so the snapshot covers
            // everything the old log holds.
            let events = tables.snapshot();
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

fn writer_gone() -> StoreError {
    StoreError::Unavailable("WAL writer shut down".into())
}

fn response_dropped() -> StoreError {
    StoreError::Unavailable("WAL writer dropped response".into())
}

/// `MeetingStore` held entirely in memory, optionally backed by a WAL.
///
/// With a WAL attached, a write becomes visible only once it is durable, and
/// it is applied by the writer task whether or not the caller is still
/// waiting.
pub struct InMemoryStore {
    tables: Arc<Tables>,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// A volatile store. Nothing survives the process.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Tables::default()),
            wal_tx: None,
        }
    }

    /// Replay the WAL at `wal_path` and keep appending to it.
    /// Must be called inside a tokio runtime: it spawns the WAL writer task.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;

        let tables = Arc::new(Tables::default());
        for event in &events {
            tables.apply(event);
        }
        debug!(
            events = events.len(),
            meetings = tables.meetings.len(),
            participants = tables.participants.len(),
            "replayed WAL"
        );

        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, tables.clone(), rx));
        Ok(Self {
            tables,
            wal_tx: Some(tx),
        })
    }

    pub fn meeting_count(&self) -> usize {
        self.tables.meetings.len()
    }

    pub fn participant_count(&self) -> usize {
        self.tables.participants.len()
    }

    /// Durable store: hand the event to the writer, which logs then applies it.
    /// Volatile store: apply in place.
    async fn persist(&self, event: Event) -> Result<(), StoreError> {
        let Some(tx) = &self.wal_tx else {
            self.tables.apply(&event);
            return Ok(());
        };
        let (response, rx) = oneshot::channel();
        tx.send(WalCommand::Append { event, response })
            .await
            .map_err(|_| writer_gone())?;
        rx.await
            .map_err(|_| response_dropped())?
            .map_err(|e| StoreError::Unavailable(format!("WAL append failed: {e}")))
    }

    /// Rewrite the WAL as the minimal event list that recreates the current state.
    /// No-op for a volatile store.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let Some(tx) = &self.wal_tx else {
            return Ok(());
        };
        let (response, rx) = oneshot::channel();
        tx.send(WalCommand::Compact { response })
            .await
            .map_err(|_| writer_gone())?;
        rx.await
            .map_err(|_| response_dropped())?
            .map_err(|e| StoreError::Unavailable(format!("WAL compaction failed: {e}")))
    }

    /// Appends since the last compaction; 0 for a volatile store.
    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(tx) = &self.wal_tx else {
            return 0;
        };
        let (response, rx) = oneshot::channel();
        if tx.send(WalCommand::AppendsSinceCompact { response }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl MeetingStore for InMemoryStore {
    async fn resolve_participants(&self, ids: &BTreeSet<Ulid>) -> Result<Vec<Participant>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.tables.participants.get(id).map(|p| p.value().clone()))
            .collect())
    }

    async fn get_participant(&self, id: Ulid) -> Result<Option<Participant>, StoreError> {
        Ok(self.tables.participants.get(&id).map(|p| p.value().clone()))
    }

    async fn insert_participant(&self, participant: Participant) -> Result<Participant, StoreError> {
        if self.tables.participants.contains_key(&participant.id) {
            return Err(StoreError::AlreadyExists(participant.id));
        }
        self.persist(Event::ParticipantRegistered {
            participant: participant.clone(),
        })
        .await?;
        Ok(participant)
    }

    async fn list_participants(&self, offset: usize, limit: usize) -> Result<(Vec<Participant>, usize), StoreError> {
        let mut all: Vec<Participant> = self
            .tables
            .participants
            .iter()
            .map(|p| p.value().clone())
            .collect();
        all.sort_by_key(|p| p.id);
        let total = all.len();
        Ok((all.into_iter().skip(offset).take(limit).collect(), total))
    }

    async fn query_overlapping(
        &self,
        participant_ids: &BTreeSet<Ulid>,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Meeting>, StoreError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let window = TimeSlot::new(start, end);
        let mut hits = BTreeSet::new();
        for pid in participant_ids {
            if let Some(cal) = self.tables.calendars.get(pid) {
                hits.extend(cal.overlapping(&window).map(|e| e.meeting_id));
            }
        }
        Ok(self.tables.sorted_meetings(hits))
    }

    async fn get_meeting(&self, id: Ulid) -> Result<Option<Meeting>, StoreError> {
        Ok(self.tables.meetings.get(&id).map(|m| m.value().clone()))
    }

    async fn insert(&self, meeting: Meeting) -> Result<Meeting, StoreError> {
        if self.tables.meetings.contains_key(&meeting.id) {
            return Err(StoreError::AlreadyExists(meeting.id));
        }
        self.persist(Event::MeetingCreated {
            meeting: meeting.clone(),
        })
        .await?;
        Ok(meeting)
    }

    async fn replace(&self, meeting: Meeting) -> Result<Meeting, StoreError> {
        if !self.tables.meetings.contains_key(&meeting.id) {
            return Err(StoreError::NotFound(meeting.id));
        }
        self.persist(Event::MeetingReplaced {
            meeting: meeting.clone(),
        })
        .await?;
        Ok(meeting)
    }

    async fn delete(&self, id: Ulid) -> Result<bool, StoreError> {
        if !self.tables.meetings.contains_key(&id) {
            return Ok(false);
        }
        self.persist(Event::MeetingDeleted { id }).await?;
        Ok(true)
    }

    async fn list_meetings(&self, offset: usize, limit: usize) -> Result<(Vec<Meeting>, usize), StoreError> {
        let ids: Vec<Ulid> = self.tables.meetings.iter().map(|e| *e.key()).collect();
        let all = self.tables.sorted_meetings(ids);
        let total = all.len();
        Ok((all.into_iter().skip(offset).take(limit).collect(), total))
    }

    async fn participant_meetings(&self, participant_id: Ulid) -> Result<Vec<Meeting>, StoreError> {
        let ids: Vec<Ulid> = self
            .tables
            .calendars
            .get(&participant_id)
            .map(|cal| cal.iter().map(|e| e.meeting_id).collect())
            .unwrap_or_default();
        Ok(self.tables.sorted_meetings(ids))
    }
}
