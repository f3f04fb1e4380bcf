use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::client::ApiClient;
use crate::db::gateway::StoreGateway;
use crate::error::Result;
use crate::mapper;
use crate::poller::TickSummary;
use crate::types::{ConflictPolicy, Resource};

/// Fixed-interval market catalog refresh. Every tick fetches the entire
/// current catalog (no cursor) and reconciles it under the configured
/// policy. The default, skip-existing, never rewrites a previously-seen
/// item — its `last_updated` goes stale on purpose; operators who want
/// freshness configure replace-existing instead.
pub struct CatalogPoller {
    client: Arc<dyn ApiClient>,
    gateway: Arc<dyn StoreGateway>,
    poll_interval: Duration,
    reconcile: ConflictPolicy,
    shutdown: watch::Receiver<bool>,
}

impl CatalogPoller {
    pub fn new(
        client: Arc<dyn ApiClient>,
        gateway: Arc<dyn StoreGateway>,
        poll_interval: Duration,
        reconcile: ConflictPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            gateway,
            poll_interval,
            reconcile,
            shutdown,
        }
    }

    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // No skip here: the catalog has no backfill, so the immediate first
        // tick loads the initial snapshot.

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Catalog poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(summary) => info!(
                            inserted = summary.inserted,
                            skipped = summary.skipped,
                            malformed = summary.malformed,
                            "Catalog poll tick complete",
                        ),
                        Err(e) => error!("Catalog poll tick failed, retrying next tick: {e}"),
                    }
                }
            }
        }
    }

    pub async fn tick(&self) -> Result<TickSummary> {
        let snapshot = self.client.fetch_batch(Resource::MarketItems, None).await?;

        let mut summary = TickSummary::default();
        let mut items = Vec::with_capacity(snapshot.len());
        for raw in &snapshot {
            match mapper::to_market_item(raw) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!("Skipping malformed market item payload: {e}");
                    summary.malformed += 1;
                }
            }
        }

        let outcome = self.gateway.upsert_market_items(&items, self.reconcile).await?;
        summary.inserted = outcome.inserted;
        summary.skipped = outcome.skipped;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MarketItemRow;
    use crate::error::{AppError, FetchError};
    use crate::testsupport::{item_payload, memory_store, ScriptedClient};
    use serde_json::json;

    fn mk_poller(
        client: Arc<ScriptedClient>,
        gateway: Arc<crate::db::gateway::SqliteGateway>,
        reconcile: ConflictPolicy,
    ) -> CatalogPoller {
        let (_tx, rx) = watch::channel(false);
        CatalogPoller::new(client, gateway, Duration::from_secs(3600), reconcile, rx)
    }

    #[tokio::test]
    async fn empty_catalog_is_not_an_error() {
        let (_pool, gateway) = memory_store().await;
        let client = Arc::new(ScriptedClient::new());
        client.push_items(vec![]);

        let poller = mk_poller(client, gateway, ConflictPolicy::SkipExisting);
        let summary = poller.tick().await.unwrap();
        assert_eq!(summary, TickSummary::default());
    }

    #[tokio::test]
    async fn skip_reconcile_keeps_seen_items_stale() {
        let (pool, gateway) = memory_store().await;
        let client = Arc::new(ScriptedClient::new());
        client.push_items(vec![item_payload("itm_1", 100.0)]);
        client.push_items(vec![item_payload("itm_1", 250.0), item_payload("itm_2", 40.0)]);

        let poller = mk_poller(client, gateway, ConflictPolicy::SkipExisting);
        let first = poller.tick().await.unwrap();
        assert_eq!(first.inserted, 1);

        let second = poller.tick().await.unwrap();
        assert_eq!(second.inserted, 1);
        assert_eq!(second.skipped, 1);

        // itm_1 still carries the first snapshot's price.
        let row: MarketItemRow = sqlx::query_as("SELECT * FROM market_items WHERE id = ?")
            .bind("itm_1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.price, 100.0);
    }

    #[tokio::test]
    async fn replace_reconcile_refreshes_seen_items() {
        let (pool, gateway) = memory_store().await;
        let client = Arc::new(ScriptedClient::new());
        client.push_items(vec![item_payload("itm_1", 100.0)]);
        client.push_items(vec![item_payload("itm_1", 250.0)]);

        let poller = mk_poller(client, gateway, ConflictPolicy::ReplaceExisting);
        poller.tick().await.unwrap();
        poller.tick().await.unwrap();

        let row: MarketItemRow = sqlx::query_as("SELECT * FROM market_items WHERE id = ?")
            .bind("itm_1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.price, 250.0);
    }

    #[tokio::test]
    async fn malformed_items_are_skipped_not_fatal() {
        let (_pool, gateway) = memory_store().await;
        let client = Arc::new(ScriptedClient::new());
        client.push_items(vec![
            item_payload("itm_1", 100.0),
            json!({ "id": "itm_2", "rarity": "rare" }),
        ]);

        let poller = mk_poller(client, gateway, ConflictPolicy::SkipExisting);
        let summary = poller.tick().await.unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.malformed, 1);
    }

    #[tokio::test]
    async fn upstream_error_propagates_without_writes() {
        let (pool, gateway) = memory_store().await;
        let client = Arc::new(ScriptedClient::new());
        client.push_item_error(FetchError::Upstream {
            status: 500,
            message: "internal".to_string(),
        });

        let poller = mk_poller(client, gateway, ConflictPolicy::SkipExisting);
        let err = poller.tick().await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(FetchError::Upstream { status: 500, .. })));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM market_items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
