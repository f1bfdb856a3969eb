// Scheduled campaign poller
//
// Periodically submits `scheduled` campaigns whose send time has passed.
// Several pollers may race on the same campaign; the dispatch compare-and-set
// lets exactly one of them win and the rest see a conflict.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::dispatch::DispatchService;
use crate::error::DispatchError;

const DUE_BATCH: i64 = 50;

#[derive(Clone)]
pub struct Scheduler {
    dispatch: DispatchService,
    interval: Duration,
}

impl Scheduler {
    pub fn new(dispatch: DispatchService, interval: Duration) -> Self {
        Self { dispatch, interval }
    }

    /// Submit every due campaign once. Returns how many were accepted.
    pub async fn tick(&self) -> usize {
        let due = match self
            .dispatch
            .context()
            .storage
            .campaigns
            .list_due_scheduled(Utc::now(), DUE_BATCH)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to list scheduled campaigns");
                return 0;
            }
        };

        let mut accepted = 0;
        for campaign in due {
            match self.dispatch.request_send(campaign.id).await {
                Ok(result) => {
                    accepted += 1;
                    info!(campaign_id = %campaign.id, strategy = result.strategy, "Scheduled campaign submitted");
                }
                Err(DispatchError::Conflict(reason)) => {
                    debug!(campaign_id = %campaign.id, %reason, "Scheduled campaign already taken");
                }
                Err(e) => {
                    error!(campaign_id = %campaign.id, error = %e, "Failed to submit scheduled campaign");
                }
            }
        }
        accepted
    }

    /// Run until `shutdown` flips to true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Scheduler started");
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.interval) => {
                        self.tick().await;
                    }
                }
            }
            info!("Scheduler stopped");
        })
    }
}
