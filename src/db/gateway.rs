use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::StoreError;
use crate::types::{ConflictPolicy, EntityKind, MarketItem, MatchRecord, UpsertOutcome};

/// Transactional upsert target for the pipeline. Implementations guarantee
/// all-or-nothing per call: an `Err` means zero rows from that call were
/// committed.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn upsert_matches(
        &self,
        records: &[MatchRecord],
        policy: ConflictPolicy,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn upsert_market_items(
        &self,
        items: &[MarketItem],
        policy: ConflictPolicy,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Timestamp of the most recently ingested record of `kind`, or `None`
    /// for an empty table. Pollers re-read this on every tick — it is the
    /// only checkpoint there is.
    async fn current_max_checkpoint(
        &self,
        kind: EntityKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
}

pub struct SqliteGateway {
    pool: sqlx::SqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

const INSERT_MATCH_SKIP: &str = "\
    INSERT INTO matches (id, started_at, participants, winner, participant_count) \
    VALUES (?, ?, ?, ?, ?) \
    ON CONFLICT(id) DO NOTHING";

const INSERT_MATCH_REPLACE: &str = "\
    INSERT INTO matches (id, started_at, participants, winner, participant_count) \
    VALUES (?, ?, ?, ?, ?) \
    ON CONFLICT(id) DO UPDATE SET \
        started_at = excluded.started_at, \
        participants = excluded.participants, \
        winner = excluded.winner, \
        participant_count = excluded.participant_count";

const INSERT_ITEM_SKIP: &str = "\
    INSERT INTO market_items (id, name, category, rarity, price, last_updated) \
    VALUES (?, ?, ?, ?, ?, ?) \
    ON CONFLICT(id) DO NOTHING";

const INSERT_ITEM_REPLACE: &str = "\
    INSERT INTO market_items (id, name, category, rarity, price, last_updated) \
    VALUES (?, ?, ?, ?, ?, ?) \
    ON CONFLICT(id) DO UPDATE SET \
        name = excluded.name, \
        category = excluded.category, \
        rarity = excluded.rarity, \
        price = excluded.price, \
        last_updated = excluded.last_updated";

#[async_trait]
impl StoreGateway for SqliteGateway {
    async fn upsert_matches(
        &self,
        records: &[MatchRecord],
        policy: ConflictPolicy,
    ) -> Result<UpsertOutcome, StoreError> {
        if records.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        let sql = match policy {
            ConflictPolicy::SkipExisting => INSERT_MATCH_SKIP,
            ConflictPolicy::ReplaceExisting => INSERT_MATCH_REPLACE,
        };

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for record in records {
            let participants = serde_json::to_string(&record.participants)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let result = sqlx::query(sql)
                .bind(&record.id)
                .bind(record.started_at.timestamp_millis())
                .bind(participants)
                .bind(&record.winner)
                .bind(record.participant_count as i64)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(UpsertOutcome {
            inserted,
            skipped: records.len() as u64 - inserted,
        })
    }

    async fn upsert_market_items(
        &self,
        items: &[MarketItem],
        policy: ConflictPolicy,
    ) -> Result<UpsertOutcome, StoreError> {
        if items.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        let sql = match policy {
            ConflictPolicy::SkipExisting => INSERT_ITEM_SKIP,
            ConflictPolicy::ReplaceExisting => INSERT_ITEM_REPLACE,
        };

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for item in items {
            let result = sqlx::query(sql)
                .bind(&item.id)
                .bind(&item.name)
                .bind(item.category.to_string())
                .bind(item.rarity.to_string())
                .bind(item.price)
                .bind(item.last_updated.timestamp_millis())
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(UpsertOutcome {
            inserted,
            skipped: items.len() as u64 - inserted,
        })
    }

    async fn current_max_checkpoint(
        &self,
        kind: EntityKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let sql = match kind {
            EntityKind::Matches => "SELECT MAX(started_at) FROM matches",
            EntityKind::MarketItems => "SELECT MAX(last_updated) FROM market_items",
        };
        let max_millis: Option<i64> = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(max_millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }
}
