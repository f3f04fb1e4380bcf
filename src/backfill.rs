use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::client::ApiClient;
use crate::db::gateway::StoreGateway;
use crate::error::Result;
use crate::mapper;
use crate::types::{ConflictPolicy, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillSummary {
    pub pages: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub malformed: u64,
}

/// One-shot historical ingestion. Pages through the full match history with
/// an advancing cursor until the upstream returns an empty batch, persisting
/// each page before requesting the next. Any fetch or store error is
/// run-terminal — the orchestrator decides what that means for the process.
pub struct BackfillTask {
    client: Arc<dyn ApiClient>,
    gateway: Arc<dyn StoreGateway>,
    state: BackfillState,
}

impl BackfillTask {
    pub fn new(client: Arc<dyn ApiClient>, gateway: Arc<dyn StoreGateway>) -> Self {
        Self {
            client,
            gateway,
            state: BackfillState::NotStarted,
        }
    }

    pub fn state(&self) -> BackfillState {
        self.state
    }

    pub async fn run(&mut self) -> Result<BackfillSummary> {
        self.state = BackfillState::Running;
        match self.drain().await {
            Ok(summary) => {
                self.state = BackfillState::Completed;
                Ok(summary)
            }
            Err(e) => {
                self.state = BackfillState::Failed;
                Err(e)
            }
        }
    }

    async fn drain(&self) -> Result<BackfillSummary> {
        let started = Instant::now();
        let mut summary = BackfillSummary::default();
        let mut cursor = None;

        loop {
            let batch = self.client.fetch_batch(Resource::Matches, cursor).await?;
            if batch.is_empty() {
                break;
            }
            summary.pages += 1;

            let mut records = Vec::with_capacity(batch.len());
            for raw in &batch {
                match mapper::to_match_record(raw) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!("Backfill skipping malformed match payload: {e}");
                        summary.malformed += 1;
                    }
                }
            }

            // A page of nothing but malformed records cannot advance the
            // cursor; stop rather than refetch the same page forever.
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

        info!(
            pages = summary.pages,
            inserted = summary.inserted,
            skipped = summary.skipped,
            malformed = summary.malformed,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Backfill complete: {} matches inserted over {} pages",
            summary.inserted,
            summary.pages,
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, FetchError};
    use crate::testsupport::{match_payload, memory_store, ts, ScriptedClient};
    use crate::types::EntityKind;
    use serde_json::json;

    #[tokio::test]
    async fn drains_all_pages_and_records_high_water_mark() {
        let (_pool, gateway) = memory_store().await;
        let client = Arc::new(ScriptedClient::new());
        client.push_matches(vec![
            match_payload("m1", ts(0)),
            match_payload("m2", ts(1)),
        ]);
        client.push_matches(vec![
            match_payload("m3", ts(2)),
            match_payload("m4", ts(3)),
        ]);

        let mut task = BackfillTask::new(client.clone(), gateway.clone());
        assert_eq!(task.state(), BackfillState::NotStarted);

        let summary = task.run().await.unwrap();
        assert_eq!(task.state(), BackfillState::Completed);
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.inserted, 4);
        assert_eq!(summary.malformed, 0);

        // Cursor advanced page by page; the terminating call saw the max.
        let cursors = client.match_cursors();
        assert_eq!(cursors, vec![None, Some(ts(1)), Some(ts(3))]);

        let checkpoint = gateway
            .current_max_checkpoint(EntityKind::Matches)
            .await
            .unwrap();
        assert_eq!(checkpoint, Some(ts(3)));
    }

    #[tokio::test]
    async fn fetch_error_is_run_terminal_but_keeps_committed_pages() {
        let (_pool, gateway) = memory_store().await;
        let client = Arc::new(ScriptedClient::new());
        client.push_matches(vec![match_payload("m1", ts(0))]);
        client.push_match_error(FetchError::Upstream {
            status: 503,
            message: "maintenance".to_string(),
        });

        let mut task = BackfillTask::new(client, gateway.clone());
        let err = task.run().await.unwrap_err();
        assert_eq!(task.state(), BackfillState::Failed);
        assert!(matches!(err, AppError::Fetch(FetchError::Upstream { status: 503, .. })));

        // The first page's transaction committed before the failure.
        let checkpoint = gateway
            .current_max_checkpoint(EntityKind::Matches)
            .await
            .unwrap();
        assert_eq!(checkpoint, Some(ts(0)));
    }

    #[tokio::test]
    async fn malformed_records_are_counted_not_fatal() {
        let (_pool, gateway) = memory_store().await;
        let client = Arc::new(ScriptedClient::new());
        client.push_matches(vec![
            match_payload("m1", ts(0)),
            json!({ "startedAt": "2026-03-01T12:01:00Z", "participants": [] }),
        ]);

        let mut task = BackfillTask::new(client, gateway.clone());
        let summary = task.run().await.unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.malformed, 1);
        assert_eq!(task.state(), BackfillState::Completed);
    }
}
