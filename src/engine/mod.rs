//! The booking engine: validation, conflict detection, alternative-slot search
//! and the serialized check-then-write path over a [`MeetingStore`].

mod conflict;
mod error;
mod locks;
mod mutations;
mod queries;
mod slots;

pub use conflict::conflicting;
pub use error::EngineError;
pub use slots::{carve_alternatives, SlotSearch};

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::warn;
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::observability::{BOOKINGS_TOTAL, BOOKING_DURATION_SECONDS, STORE_TIMEOUTS_TOTAL};
use crate::store::{MeetingStore, StoreError};

use locks::{LockSet, LockTable};

pub struct Engine {
    store: Arc<dyn MeetingStore>,
    config: EngineConfig,
    /// Held from conflict check through write for every participant a booking touches.
    participant_locks: LockTable,
    /// Taken by update/delete before reading the meeting they change.
    meeting_locks: LockTable,
}

impl Engine {
    pub fn new(store: Arc<dyn MeetingStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            participant_locks: LockTable::new(),
            meeting_locks: LockTable::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(super) fn slot_search(&self) -> SlotSearch {
        SlotSearch {
            horizon: self.config.search_horizon,
            max_results: self.config.max_alternatives,
        }
    }

    /// Run one store call under the store timeout.
    pub(super) async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if let StoreError::Unavailable(msg) = &e {
                    warn!(op, "store unavailable: {msg}");
                }
                Err(e.into())
            }
            Err(_) => Err(self.timed_out(op)),
        }
    }

    /// Run a store write on its own task, holding `held` until the write
    /// finishes. The caller's wait is bounded like any store call, but
    /// dropping that wait or timing out never abandons the write or releases
    /// its locks early.
    pub(super) async fn commit<T: Send + 'static>(
        &self,
        op: &'static str,
        held: Vec<LockSet>,
        write: impl Future<Output = Result<T, StoreError>> + Send + 'static,
    ) -> Result<T, EngineError> {
        let task = tokio::spawn(async move {
            let result = write.await;
            drop(held);
            result
        });
        self.bounded(op, async move {
            task.await
                .unwrap_or_else(|e| Err(StoreError::Unavailable(format!("{op} task failed: {e}"))))
        })
        .await
    }

    fn timed_out(&self, op: &'static str) -> EngineError {
        metrics::counter!(STORE_TIMEOUTS_TOTAL, "op" => op).increment(1);
        warn!(op, timeout = ?self.config.store_timeout, "timed out");
        EngineError::StoreUnavailable(format!(
            "{op} timed out after {:?}",
            self.config.store_timeout
        ))
    }

    pub(super) async fn lock_participants(
        &self,
        ids: &BTreeSet<Ulid>,
    ) -> Result<LockSet, EngineError> {
        tokio::time::timeout(self.config.store_timeout, self.participant_locks.acquire(ids))
            .await
            .map_err(|_| self.timed_out("lock_participants"))
    }

    pub(super) async fn lock_meeting(&self, id: Ulid) -> Result<LockSet, EngineError> {
        tokio::time::timeout(
            self.config.store_timeout,
            self.meeting_locks.acquire(&BTreeSet::from([id])),
        )
        .await
        .map_err(|_| self.timed_out("lock_meeting"))
    }
}

/// Count and time one write operation.
fn record_outcome<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    metrics::counter!(BOOKINGS_TOTAL, "op" => op, "outcome" => outcome).increment(1);
    metrics::histogram!(BOOKING_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
