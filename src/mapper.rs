use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::MappingError;
use crate::types::{ItemCategory, MarketItem, MatchRecord, Participant, Rarity};

/// Convert a raw upstream match payload into a `MatchRecord`.
///
/// Pure and deterministic. A payload missing its identifier or start time is
/// rejected outright — a malformed record must never reach the store with
/// substituted defaults.
pub fn to_match_record(raw: &Value) -> Result<MatchRecord, MappingError> {
    let id = required_str(raw, "matchId")?;
    let started_at = required_instant(raw, "startedAt")?;

    let raw_participants = raw
        .get("participants")
        .and_then(|p| p.as_array())
        .ok_or_else(|| MappingError::missing("participants"))?;

    let mut participants = Vec::with_capacity(raw_participants.len());
    for entry in raw_participants {
        participants.push(to_participant(entry)?);
    }

    let winner = participants
        .iter()
        .find(|p| p.placement == 1)
        .map(|p| p.name.clone());
    let participant_count = participants.len() as u32;

    Ok(MatchRecord {
        id,
        started_at,
        participants,
        winner,
        participant_count,
    })
}

fn to_participant(raw: &Value) -> Result<Participant, MappingError> {
    let player_id = required_str(raw, "playerId")?;
    let name = required_str(raw, "name")?;
    let placement = raw
        .get("placement")
        .and_then(|p| p.as_u64())
        .ok_or_else(|| MappingError::missing("placement"))? as u32;

    Ok(Participant { player_id, name, placement })
}

/// Convert a raw upstream catalog entry into a `MarketItem`.
///
/// Identifier, name, rarity, price and timestamp are required; an unknown
/// item type degrades to `Other` (new upstream categories must not stall the
/// catalog), but an unknown rarity is rejected since rarity drives pricing
/// on the consuming side.
pub fn to_market_item(raw: &Value) -> Result<MarketItem, MappingError> {
    let id = required_str(raw, "id")?;
    let name = required_str(raw, "name")?;

    let category = raw
        .get("type")
        .and_then(|t| t.as_str())
        .map(ItemCategory::parse)
        .unwrap_or(ItemCategory::Other);

    let rarity_raw = required_str(raw, "rarity")?;
    let rarity = Rarity::parse(&rarity_raw)
        .ok_or_else(|| MappingError::new("rarity", format!("unknown rarity `{rarity_raw}`")))?;

    // Upstream serializes prices inconsistently — number or numeric string.
    let price = raw
        .get("price")
        .and_then(|p| p.as_f64().or_else(|| p.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| MappingError::missing("price"))?;

    let last_updated = required_instant(raw, "lastUpdated")?;

    Ok(MarketItem {
        id,
        name,
        category,
        rarity,
        price,
        last_updated,
    })
}

fn required_str(raw: &Value, field: &'static str) -> Result<String, MappingError> {
    let s = raw
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| MappingError::missing(field))?;
    if s.is_empty() {
        return Err(MappingError::new(field, "empty string"));
    }
    Ok(s.to_string())
}

fn required_instant(raw: &Value, field: &'static str) -> Result<DateTime<Utc>, MappingError> {
    let s = raw
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| MappingError::missing(field))?;
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MappingError::new(field, e.to_string()))
}
