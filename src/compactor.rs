use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::InMemoryStore;

/// Background task that rewrites the WAL once `threshold` appends have
/// accumulated since the last compaction.
pub async fn run_compactor(store: Arc<InMemoryStore>, threshold: u64) {
    run_compactor_every(store, threshold, Duration::from_secs(30)).await;
}

async fn run_compactor_every(store: Arc<InMemoryStore>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let appends = store.wal_appends_since_compact().await;
        if appends < threshold.max(1) {
            debug!(appends, threshold, "compaction not due");
            continue;
        }
        match store.compact_wal().await {
            Ok(()) => info!(
                appends,
                meetings = store.meeting_count(),
                participants = store.participant_count(),
                "compacted WAL"
            ),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}
