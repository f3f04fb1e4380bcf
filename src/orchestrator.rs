use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backfill::BackfillTask;
use crate::catalog::CatalogPoller;
use crate::client::ApiClient;
use crate::config::{BackfillFailurePolicy, Config};
use crate::db::gateway::StoreGateway;
use crate::error::{AppError, Result};
use crate::poller::MatchPoller;

/// Sequences the pipeline: historical backfill to completion, then the
/// incremental match poller, with the catalog poller started alongside.
/// Each poller runs in its own task — a crash in one never takes down the
/// other — and `stop()` winds both down through a shared shutdown signal.
pub struct Orchestrator {
    cfg: Config,
    client: Arc<dyn ApiClient>,
    gateway: Arc<dyn StoreGateway>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(cfg: Config, client: Arc<dyn ApiClient>, gateway: Arc<dyn StoreGateway>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            cfg,
            client,
            gateway,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Run the backfill to completion, then start both pollers. The match
    /// poller is never scheduled before backfill finishes — its first
    /// checkpoint read depends on backfill having populated the store.
    pub async fn start(&mut self) -> Result<()> {
        let mut backfill = BackfillTask::new(self.client.clone(), self.gateway.clone());
        match backfill.run().await {
            Ok(_) => {}
            Err(e) => match self.cfg.backfill_on_failure {
                BackfillFailurePolicy::Abort => {
                    error!("Backfill failed, aborting (set BACKFILL_ON_FAILURE=continue to poll against partial history): {e}");
                    return Err(AppError::Backfill(e.to_string()));
                }
                BackfillFailurePolicy::Continue => {
                    warn!("Backfill failed, continuing with partial history: {e}");
                }
            },
        }

        let match_poller = MatchPoller::new(
            self.client.clone(),
            self.gateway.clone(),
            self.cfg.match_poll_interval(),
            self.shutdown_tx.subscribe(),
        );
        self.handles.push(tokio::spawn(match_poller.run()));

        let catalog_poller = CatalogPoller::new(
            self.client.clone(),
            self.gateway.clone(),
            self.cfg.catalog_poll_interval(),
            self.cfg.catalog_reconcile,
            self.shutdown_tx.subscribe(),
        );
        self.handles.push(tokio::spawn(catalog_poller.run()));

        info!(
            match_interval_mins = self.cfg.match_poll_interval_mins,
            catalog_interval_mins = self.cfg.catalog_poll_interval_mins,
            "Pollers started",
        );
        Ok(())
    }

    /// Signal both pollers and wait for them to wind down. An in-flight
    /// tick finishes first; the gateway's per-call transaction keeps the
    /// store consistent either way.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!("Pollers stopped");
    }
}
