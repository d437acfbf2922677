use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// UTC instant — the only time type the engine compares.
pub type Timestamp = DateTime<Utc>;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeSlot {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "TimeSlot start must be before end");
        Self { start, end }
    }

    /// Build a slot from instants in any timezone, converting both to UTC.
    /// Returns `None` unless `start < end`.
    pub fn normalized<Z: TimeZone>(start: &DateTime<Z>, end: &DateTime<Z>) -> Option<Self> {
        let start = start.with_timezone(&Utc);
        let end = end.with_timezone(&Utc);
        (start < end).then_some(Self { start, end })
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The slot of the same duration starting at `start`, if representable.
    pub fn starting_at(start: Timestamp, duration: TimeDelta) -> Option<Self> {
        let end = start.checked_add_signed(duration)?;
        (start < end).then_some(Self { start, end })
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Ulid,
    pub name: String,
    /// Display timezone. Never consulted for conflict math.
    pub timezone: Tz,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Ulid,
    pub title: String,
    pub slot: TimeSlot,
    pub participants: BTreeSet<Ulid>,
}

impl Meeting {
    pub fn shares_participant(&self, ids: &BTreeSet<Ulid>) -> bool {
        !self.participants.is_disjoint(ids)
    }
}

/// A booking attempt as submitted by a caller. Times may carry any UTC offset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeetingRequest {
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub participant_ids: Vec<Ulid>,
}

// ── Per-participant calendar ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarEntry {
    pub meeting_id: Ulid,
    pub slot: TimeSlot,
}

/// One participant's bookings, sorted by `slot.start`.
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    entries: Vec<CalendarEntry>,
}

impl Calendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert entry maintaining sort order by slot.start.
    pub fn insert(&mut self, entry: CalendarEntry) {
        let pos = self
            .entries
            .binary_search_by_key(&entry.slot.start, |e| e.slot.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, entry);
    }

    pub fn remove(&mut self, meeting_id: Ulid) -> Option<CalendarEntry> {
        let pos = self.entries.iter().position(|e| e.meeting_id == meeting_id)?;
        Some(self.entries.remove(pos))
    }

    /// Return only entries whose slot overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeSlot) -> impl Iterator<Item = &CalendarEntry> {
        let right_bound = self.entries.partition_point(|e| e.slot.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.slot.end > query.start)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalendarEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ParticipantRegistered { participant: Participant },
    MeetingCreated { meeting: Meeting },
    MeetingReplaced { meeting: Meeting },
    MeetingDeleted { id: Ulid },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

/// A meeting rendered in one participant's timezone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalMeeting {
    pub id: Ulid,
    pub title: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub participants: BTreeSet<Ulid>,
}

impl LocalMeeting {
    pub fn from_meeting(meeting: Meeting, tz: Tz) -> Self {
        Self {
            id: meeting.id,
            title: meeting.title,
            start: meeting.slot.start.with_timezone(&tz),
            end: meeting.slot.end.with_timezone(&tz),
            participants: meeting.participants,
        }
    }
}
