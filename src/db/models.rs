/// Database row types matching the schema in migrations/0001_init.sql.
/// Used by sqlx for typed reads; timestamps are epoch millis UTC.

#[derive(Debug, sqlx::FromRow)]
pub struct MatchRow {
    pub id: String,
    pub started_at: i64,
    /// JSON array of participants.
    pub participants: String,
    pub winner: Option<String>,
    pub participant_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct MarketItemRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub rarity: String,
    pub price: f64,
    pub last_updated: i64,
}
