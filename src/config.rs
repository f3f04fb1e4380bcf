use std::time::Duration;

use crate::error::{AppError, Result};
use crate::types::ConflictPolicy;

pub const DEFAULT_API_BASE_URL: &str = "https://api.arenaforge.gg/v1";

/// Incremental match poll interval (minutes).
pub const MATCH_POLL_INTERVAL_MINS: u64 = 2;

/// Market catalog poll interval (minutes).
pub const CATALOG_POLL_INTERVAL_MINS: u64 = 60;

/// Records requested per match-history page.
pub const SYNC_PAGE_SIZE: usize = 100;

/// Floor and ceiling for the derived HTTP timeout (seconds).
pub const HTTP_TIMEOUT_MIN_SECS: u64 = 5;
pub const HTTP_TIMEOUT_MAX_SECS: u64 = 120;

/// What the orchestrator does when the historical backfill fails.
/// `Abort` is the default: an incomplete backfill silently understates
/// history, so proceeding must be an explicit deployment decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillFailurePolicy {
    Abort,
    Continue,
}

impl BackfillFailurePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "abort" => Some(BackfillFailurePolicy::Abort),
            "continue" => Some(BackfillFailurePolicy::Continue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub log_level: String,
    pub db_path: String,
    /// Incremental match poll interval in minutes (MATCH_POLL_INTERVAL_MINS)
    pub match_poll_interval_mins: u64,
    /// Catalog poll interval in minutes (CATALOG_POLL_INTERVAL_MINS)
    pub catalog_poll_interval_mins: u64,
    /// Match-history page size (SYNC_PAGE_SIZE)
    pub page_size: usize,
    /// Upstream HTTP timeout in seconds (HTTP_TIMEOUT_SECS). Defaults to a
    /// quarter of the match poll interval so a hung fetch can never starve
    /// the tick schedule.
    pub http_timeout_secs: u64,
    /// BACKFILL_ON_FAILURE = abort | continue
    pub backfill_on_failure: BackfillFailurePolicy,
    /// CATALOG_RECONCILE = skip | replace. Skip never rewrites a seen item
    /// (its last_updated goes stale); replace trades churn for freshness.
    pub catalog_reconcile: ConflictPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let match_poll_interval_mins = std::env::var("MATCH_POLL_INTERVAL_MINS")
            .unwrap_or_else(|_| MATCH_POLL_INTERVAL_MINS.to_string())
            .parse::<u64>()
            .unwrap_or(MATCH_POLL_INTERVAL_MINS)
            .max(1);

        let http_timeout_secs = std::env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_else(|| {
                (match_poll_interval_mins * 60 / 4)
                    .clamp(HTTP_TIMEOUT_MIN_SECS, HTTP_TIMEOUT_MAX_SECS)
            });

        let backfill_on_failure = match std::env::var("BACKFILL_ON_FAILURE") {
            Ok(v) => BackfillFailurePolicy::parse(&v).ok_or_else(|| {
                AppError::Config(format!(
                    "BACKFILL_ON_FAILURE must be `abort` or `continue`, got `{v}`"
                ))
            })?,
            Err(_) => BackfillFailurePolicy::Abort,
        };

        let catalog_reconcile = match std::env::var("CATALOG_RECONCILE") {
            Ok(v) => ConflictPolicy::parse(&v).ok_or_else(|| {
                AppError::Config(format!(
                    "CATALOG_RECONCILE must be `skip` or `replace`, got `{v}`"
                ))
            })?,
            Err(_) => ConflictPolicy::SkipExisting,
        };

        Ok(Self {
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "arena-sync.db".to_string()),
            match_poll_interval_mins,
            catalog_poll_interval_mins: std::env::var("CATALOG_POLL_INTERVAL_MINS")
                .unwrap_or_else(|_| CATALOG_POLL_INTERVAL_MINS.to_string())
                .parse::<u64>()
                .unwrap_or(CATALOG_POLL_INTERVAL_MINS)
                .max(1),
            page_size: std::env::var("SYNC_PAGE_SIZE")
                .unwrap_or_else(|_| SYNC_PAGE_SIZE.to_string())
                .parse::<usize>()
                .unwrap_or(SYNC_PAGE_SIZE),
            http_timeout_secs,
            backfill_on_failure,
            catalog_reconcile,
        })
    }

    pub fn match_poll_interval(&self) -> Duration {
        Duration::from_secs(self.match_poll_interval_mins * 60)
    }

    pub fn catalog_poll_interval(&self) -> Duration {
        Duration::from_secs(self.catalog_poll_interval_mins * 60)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
