//! Test-only fakes and fixtures shared by the task/poller tests.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::client::ApiClient;
use crate::db::gateway::{SqliteGateway, StoreGateway};
use crate::error::{FetchError, StoreError};
use crate::types::{
    ConflictPolicy, EntityKind, MarketItem, MatchRecord, Resource, UpsertOutcome,
};

/// Scripted upstream: queued responses are popped per resource, every call
/// is recorded with its cursor, and an exhausted queue answers with an
/// empty batch (the upstream's "no further pages" signal).
pub struct ScriptedClient {
    matches: Mutex<VecDeque<Result<Vec<Value>, FetchError>>>,
    items: Mutex<VecDeque<Result<Vec<Value>, FetchError>>>,
    calls: Mutex<Vec<(Resource, Option<DateTime<Utc>>)>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            matches: Mutex::new(VecDeque::new()),
            items: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Simulated per-call latency; runs on the tokio clock so paused-time
    /// tests control it exactly.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_matches(&self, page: Vec<Value>) {
        self.matches.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_match_error(&self, err: FetchError) {
        self.matches.lock().unwrap().push_back(Err(err));
    }

    pub fn push_items(&self, snapshot: Vec<Value>) {
        self.items.lock().unwrap().push_back(Ok(snapshot));
    }

    pub fn push_item_error(&self, err: FetchError) {
        self.items.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<(Resource, Option<DateTime<Utc>>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn match_cursors(&self) -> Vec<Option<DateTime<Utc>>> {
        self.calls()
            .into_iter()
            .filter(|(r, _)| *r == Resource::Matches)
            .map(|(_, since)| since)
            .collect()
    }
}

#[async_trait]
impl ApiClient for ScriptedClient {
    async fn fetch_batch(
        &self,
        resource: Resource,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, FetchError> {
        self.calls.lock().unwrap().push((resource, since));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queue = match resource {
            Resource::Matches => &self.matches,
            Resource::MarketItems => &self.items,
        };
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Purely in-process gateway for paused-clock tests. SQLite runs its I/O on
/// worker threads, which lets tokio's auto-advancing virtual time jump past
/// an in-flight store call; this double has no threads to race.
#[derive(Default)]
pub struct MemoryGateway {
    matches: Mutex<HashMap<String, MatchRecord>>,
    items: Mutex<HashMap<String, MarketItem>>,
}

#[async_trait]
impl StoreGateway for MemoryGateway {
    async fn upsert_matches(
        &self,
        records: &[MatchRecord],
        policy: ConflictPolicy,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut map = self.matches.lock().unwrap();
        let mut outcome = UpsertOutcome::default();
        for record in records {
            match map.entry(record.id.clone()) {
                Entry::Occupied(mut occupied) => match policy {
                    ConflictPolicy::SkipExisting => outcome.skipped += 1,
                    ConflictPolicy::ReplaceExisting => {
                        occupied.insert(record.clone());
                        outcome.inserted += 1;
                    }
                },
                Entry::Vacant(vacant) => {
                    vacant.insert(record.clone());
                    outcome.inserted += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn upsert_market_items(
        &self,
        items: &[MarketItem],
        policy: ConflictPolicy,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut map = self.items.lock().unwrap();
        let mut outcome = UpsertOutcome::default();
        for item in items {
            match map.entry(item.id.clone()) {
                Entry::Occupied(mut occupied) => match policy {
                    ConflictPolicy::SkipExisting => outcome.skipped += 1,
                    ConflictPolicy::ReplaceExisting => {
                        occupied.insert(item.clone());
                        outcome.inserted += 1;
                    }
                },
                Entry::Vacant(vacant) => {
                    vacant.insert(item.clone());
                    outcome.inserted += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn current_max_checkpoint(
        &self,
        kind: EntityKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let max = match kind {
            EntityKind::Matches => {
                self.matches.lock().unwrap().values().map(|r| r.started_at).max()
            }
            EntityKind::MarketItems => {
                self.items.lock().unwrap().values().map(|i| i.last_updated).max()
            }
        };
        Ok(max)
    }
}

/// Fresh in-memory store with the real schema applied.
pub async fn memory_store() -> (sqlx::SqlitePool, Arc<SqliteGateway>) {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let gateway = Arc::new(SqliteGateway::new(pool.clone()));
    (pool, gateway)
}

/// Fixed fixture day; `minute` spreads records across it.
pub fn ts(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).single().unwrap()
}

pub fn match_payload(id: &str, started_at: DateTime<Utc>) -> Value {
    json!({
        "matchId": id,
        "startedAt": started_at.to_rfc3339(),
        "participants": [
            { "playerId": "p1", "name": "Vex", "placement": 1 },
            { "playerId": "p2", "name": "Korr", "placement": 2 },
        ],
    })
}

pub fn item_payload(id: &str, price: f64) -> Value {
    json!({
        "id": id,
        "name": "Saber of Dawn",
        "type": "weapon",
        "rarity": "rare",
        "price": price,
        "lastUpdated": "2026-03-01T00:00:00Z",
    })
}
