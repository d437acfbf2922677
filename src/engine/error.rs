use ulid::Ulid;

use crate::limits::{MAX_NAME_LEN, MAX_TITLE_LEN};
use crate::model::TimeSlot;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidTimeRange,
    NoParticipants,
    UnknownParticipants,
    /// The only error with a payload: replacement slots, earliest first.
    SchedulingConflict {
        alternatives: Vec<TimeSlot>,
    },
    NotFound(Ulid),
    /// Transient. Callers may retry under their own policy; the engine never does.
    StoreUnavailable(String),
    InvalidTitle,
    InvalidName,
    InvalidTimezone(String),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
}

impl EngineError {
    /// Stable taxonomy code for callers and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidTimeRange => "InvalidTimeRange",
            EngineError::NoParticipants => "NoParticipants",
            EngineError::UnknownParticipants => "UnknownParticipants",
            EngineError::SchedulingConflict { .. } => "SchedulingConflict",
            EngineError::NotFound(_) => "NotFound",
            EngineError::StoreUnavailable(_) => "StoreUnavailable",
            EngineError::InvalidTitle => "InvalidTitle",
            EngineError::InvalidName => "InvalidName",
            EngineError::InvalidTimezone(_) => "InvalidTimezone",
            EngineError::AlreadyExists(_) => "AlreadyExists",
            EngineError::LimitExceeded(_) => "LimitExceeded",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(_))
    }

    pub fn alternatives(&self) -> Option<&[TimeSlot]> {
        match self {
            EngineError::SchedulingConflict { alternatives } => Some(alternatives),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidTimeRange => write!(f, "start time must be before end time"),
            EngineError::NoParticipants => {
                write!(f, "at least one participant is required for a meeting")
            }
            EngineError::UnknownParticipants => {
                write!(f, "at least one valid participant id is required")
            }
            EngineError::SchedulingConflict { alternatives } => {
                write!(f, "conflicts with existing meetings; next available slots: ")?;
                for (i, slot) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{slot}")?;
                }
                Ok(())
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
            EngineError::InvalidTitle => write!(f, "title must be non-empty and at most {MAX_TITLE_LEN} bytes"),
            EngineError::InvalidName => write!(f, "participant name must be non-empty and at most {MAX_NAME_LEN} bytes"),
            EngineError::InvalidTimezone(tz) => write!(f, "unknown IANA timezone: {tz}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::AlreadyExists(id) => EngineError::AlreadyExists(id),
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
        }
    }
}
