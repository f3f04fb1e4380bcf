use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Match records
// ---------------------------------------------------------------------------

/// One finished match as ingested from the upstream API. Immutable once
/// persisted — the upstream never revises a finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
    /// Name of the placement-1 participant, if any.
    pub winner: Option<String>,
    pub participant_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub player_id: String,
    pub name: String,
    pub placement: u32,
}

// ---------------------------------------------------------------------------
// Market items
// ---------------------------------------------------------------------------

/// One entry of the in-game market catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketItem {
    pub id: String,
    pub name: String,
    pub category: ItemCategory,
    pub rarity: Rarity,
    /// Price in upstream gold units.
    pub price: f64,
    /// Source-provided staleness marker — not a write-time clock.
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Weapon,
    Armor,
    Consumable,
    Trinket,
    Other,
}

impl ItemCategory {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "weapon" => ItemCategory::Weapon,
            "armor" => ItemCategory::Armor,
            "consumable" => ItemCategory::Consumable,
            "trinket" => ItemCategory::Trinket,
            _ => ItemCategory::Other,
        }
    }
}

impl std::fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemCategory::Weapon => "weapon",
            ItemCategory::Armor => "armor",
            ItemCategory::Consumable => "consumable",
            ItemCategory::Trinket => "trinket",
            ItemCategory::Other => "other",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    /// Unknown rarity strings are a mapping error, not a silent default —
    /// see `mapper::to_market_item`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "common" => Some(Rarity::Common),
            "uncommon" => Some(Rarity::Uncommon),
            "rare" => Some(Rarity::Rare),
            "epic" => Some(Rarity::Epic),
            "legendary" => Some(Rarity::Legendary),
            _ => None,
        }
    }
}

impl std::fmt::Display for Rarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Store gateway vocabulary
// ---------------------------------------------------------------------------

/// Entity kinds the gateway can upsert and checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Matches,
    MarketItems,
}

/// Reconciliation strategy for bulk upserts. Skip-existing never rewrites a
/// row whose id is already present; replace-existing overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    SkipExisting,
    ReplaceExisting,
}

impl ConflictPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "skip" | "skip-existing" => Some(ConflictPolicy::SkipExisting),
            "replace" | "replace-existing" => Some(ConflictPolicy::ReplaceExisting),
            _ => None,
        }
    }
}

/// Split reported by every bulk upsert call. Under `ReplaceExisting`,
/// `inserted` counts every applied row and `skipped` stays 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: u64,
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// Upstream resources
// ---------------------------------------------------------------------------

/// Resource selector for the upstream API client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Paged match history; supports an `after` cursor.
    Matches,
    /// Full market catalog snapshot; no cursor.
    MarketItems,
}
