use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::client::ApiClient;
use crate::db::gateway::StoreGateway;
use crate::error::Result;
use crate::mapper;
use crate::types::{ConflictPolicy, EntityKind, Resource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub inserted: u64,
    pub skipped: u64,
    pub malformed: u64,
}

/// Fixed-interval incremental ingestion of new matches. Each tick re-reads
/// the store's checkpoint, fetches only newer records, and persists them
/// with skip-existing semantics. A failed tick is logged and retried on the
/// next scheduled tick — it never terminates the poller.
pub struct MatchPoller {
    client: Arc<dyn ApiClient>,
    gateway: Arc<dyn StoreGateway>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl MatchPoller {
    pub fn new(
        client: Arc<dyn ApiClient>,
        gateway: Arc<dyn StoreGateway>,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            gateway,
            poll_interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        let mut ticker = interval(self.poll_interval);
        // A tick that outlasts the interval must not pile up behind itself:
        // late ticks are skipped, never queued, and ticks run sequentially
        // in this task so two can never overlap.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // skip immediate first tick — backfill just ran

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Match poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(summary) => info!(
                            inserted = summary.inserted,
                            skipped = summary.skipped,
                            malformed = summary.malformed,
                            "Match poll tick complete",
                        ),
                        Err(e) => error!("Match poll tick failed, retrying next tick: {e}"),
                    }
                }
            }
        }
    }

    /// One fetch-map-persist cycle. Reads the checkpoint from the gateway —
    /// never a locally cached value — so a process restart resumes correctly
    /// with no extra state.
    pub async fn tick(&self) -> Result<TickSummary> {
        let checkpoint = self
            .gateway
            .current_max_checkpoint(EntityKind::Matches)
            .await?;

        let mut summary = TickSummary::default();
        let mut cursor = checkpoint;

        loop {
            let batch = self.client.fetch_batch(Resource::Matches, cursor).await?;
            if batch.is_empty() {
                // No new matches since the checkpoint — not an error.
                break;
            }

            let mut records = Vec::with_capacity(batch.len());
            for raw in &batch {
                match mapper::to_match_record(raw) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!("Skipping malformed match payload: {e}");
                        summary.malformed += 1;
                    }
                }
            }

            let Some(max_started) = records.iter().map(|r| r.started_at).max() else {
                break;
            };

            let outcome = self
                .gateway
                .upsert_matches(&records, ConflictPolicy::SkipExisting)
                .await?;
            summary.inserted += outcome.inserted;
            summary.skipped += outcome.skipped;
            cursor = Some(max_started);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, FetchError};
    use crate::testsupport::{match_payload, memory_store, ts, MemoryGateway, ScriptedClient};

    fn mk_poller(
        client: Arc<ScriptedClient>,
        gateway: Arc<dyn StoreGateway>,
        poll_interval: Duration,
    ) -> (MatchPoller, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (MatchPoller::new(client, gateway, poll_interval, rx), tx)
    }

    #[tokio::test]
    async fn first_fetch_is_bounded_by_the_stored_checkpoint() {
        let (_pool, gateway) = memory_store().await;
        let seed = Arc::new(ScriptedClient::new());
        seed.push_matches(vec![match_payload("m1", ts(0)), match_payload("m2", ts(9))]);
        crate::backfill::BackfillTask::new(seed, gateway.clone())
            .run()
            .await
            .unwrap();

        let client = Arc::new(ScriptedClient::new());
        let (poller, _tx) = mk_poller(client.clone(), gateway, Duration::from_secs(60));
        poller.tick().await.unwrap();

        // Only records strictly newer than the backfill high-water mark.
        assert_eq!(client.match_cursors(), vec![Some(ts(9))]);
    }

    #[tokio::test]
    async fn mixed_batch_advances_checkpoint_to_newest() {
        let (_pool, gateway) = memory_store().await;
        gateway
            .upsert_matches(
                &[mapper::to_match_record(&match_payload("m1", ts(0))).unwrap()],
                ConflictPolicy::SkipExisting,
            )
            .await
            .unwrap();

        let client = Arc::new(ScriptedClient::new());
        client.push_matches(vec![
            match_payload("m1", ts(0)),
            match_payload("m2", ts(1)),
            match_payload("m3", ts(2)),
        ]);

        let (poller, _tx) = mk_poller(client.clone(), gateway.clone(), Duration::from_secs(60));
        let summary = poller.tick().await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 1);

        let checkpoint = gateway
            .current_max_checkpoint(EntityKind::Matches)
            .await
            .unwrap();
        assert_eq!(checkpoint, Some(ts(2)));

        // The next tick re-reads the store and asks from the new mark.
        poller.tick().await.unwrap();
        assert_eq!(poller_cursor_tail(&client), Some(ts(2)));
    }

    fn poller_cursor_tail(client: &ScriptedClient) -> Option<chrono::DateTime<chrono::Utc>> {
        client.match_cursors().last().copied().flatten()
    }

    #[tokio::test]
    async fn fetch_error_leaves_checkpoint_unchanged() {
        let (_pool, gateway) = memory_store().await;
        gateway
            .upsert_matches(
                &[mapper::to_match_record(&match_payload("m1", ts(3))).unwrap()],
                ConflictPolicy::SkipExisting,
            )
            .await
            .unwrap();

        let client = Arc::new(ScriptedClient::new());
        client.push_match_error(FetchError::Upstream {
            status: 500,
            message: "internal".to_string(),
        });

        let (poller, _tx) = mk_poller(client, gateway.clone(), Duration::from_secs(60));
        let err = poller.tick().await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(FetchError::Upstream { status: 500, .. })));

        let checkpoint = gateway
            .current_max_checkpoint(EntityKind::Matches)
            .await
            .unwrap();
        assert_eq!(checkpoint, Some(ts(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ticks_do_not_terminate_the_poller() {
        let gateway = Arc::new(MemoryGateway::default());
        let client = Arc::new(ScriptedClient::new());
        client.push_match_error(FetchError::Unreachable("timeout".to_string()));
        client.push_match_error(FetchError::Unreachable("timeout".to_string()));

        let (poller, tx) = mk_poller(client.clone(), gateway, Duration::from_millis(100));
        let handle = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_millis(350)).await;
        // Both error ticks happened and the poller kept scheduling.
        assert!(client.calls().len() >= 3);
        assert!(!handle.is_finished());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn late_ticks_are_skipped_not_queued() {
        let gateway = Arc::new(MemoryGateway::default());
        // Every fetch takes 2.5 intervals; a queuing scheduler would pile
        // up ~10 ticks over the simulated second.
        let client =
            Arc::new(ScriptedClient::new().with_delay(Duration::from_millis(250)));

        let (poller, tx) = mk_poller(client.clone(), gateway, Duration::from_millis(100));
        let handle = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_millis(1049)).await;
        let calls = client.calls().len();
        assert!(
            (3..=5).contains(&calls),
            "expected missed ticks to be skipped, saw {calls} fetches"
        );

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
