// Broadcast strategies
// Decision: Two implementations of one capability, chosen per send by a queue probe
//
// InlineStrategy: in-process run, sequential batches of concurrent sends, progress
//                 persisted after each batch, dead subscribers pruned at the end.
// QueuedStrategy: enqueue one campaign.broadcast job; workers do the rest.

use async_trait::async_trait;
use futures::future::join_all;
use pushcast_durable::JobQueue;
use pushcast_schemas::{Campaign, CampaignStatus, LogEventType, Subscriber, CAMPAIGN_COMPLETED};
use pushcast_storage::NewCampaignLog;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::delivery::{attempt_delivery, sender_identity, touch_subscriber, write_log, DeliveryOutcome};
use crate::error::{DispatchError, DispatchResult};
use crate::jobs::broadcast_job;
use crate::transport::SenderIdentity;

/// Runs a campaign that is already `dispatching` with its targeted count recorded.
#[async_trait]
pub trait BroadcastStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start the broadcast and return without waiting for it to finish.
    async fn launch(&self, campaign: &Campaign) -> DispatchResult<()>;
}

/// Totals of one inline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub total: i64,
    pub delivered: i64,
    pub failed: i64,
}

// ============================================================================
// Inline
// ============================================================================

#[derive(Clone)]
pub struct InlineStrategy {
    ctx: EngineContext,
}

impl InlineStrategy {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Run to completion. Any error reverts the campaign to `draft`.
    pub async fn run(&self, campaign_id: Uuid) -> DispatchResult<DispatchSummary> {
        match self.broadcast(campaign_id).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "Inline dispatch failed, reverting campaign to draft");
                if let Err(revert) = self
                    .ctx
                    .storage
                    .campaigns
                    .update_status(campaign_id, CampaignStatus::Draft)
                    .await
                {
                    error!(campaign_id = %campaign_id, error = %revert, "Failed to revert campaign");
                }
                Err(e)
            }
        }
    }

    async fn broadcast(&self, campaign_id: Uuid) -> DispatchResult<DispatchSummary> {
        let storage = &self.ctx.storage;
        let campaign = storage
            .campaigns
            .get_campaign(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

        let sender = sender_identity(&self.ctx, campaign.site_id).await?;
        let batch_size = self.ctx.config.batch_size.max(1);
        let page_size = self.ctx.config.page_size;

        let mut summary = DispatchSummary::default();
        let mut to_delete = Vec::new();
        let mut cursor = None;

        loop {
            let page = storage
                .subscribers
                .find_active_by_site(campaign.site_id, cursor, page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id);

            for batch in page.chunks(batch_size) {
                let outcomes =
                    join_all(batch.iter().map(|s| self.deliver(&campaign, s, &sender))).await;

                for (subscriber, outcome) in batch.iter().zip(outcomes) {
                    match outcome {
                        DeliveryOutcome::AlreadyDelivered | DeliveryOutcome::Delivered(_) => {
                            summary.delivered += 1
                        }
                        DeliveryOutcome::Gone(_) => {
                            summary.failed += 1;
                            to_delete.push(subscriber.id);
                        }
                        DeliveryOutcome::Failed(_) => summary.failed += 1,
                    }
                }
                summary.total += batch.len() as i64;

                if let Err(e) = storage
                    .campaigns
                    .set_progress(campaign_id, summary.total, summary.delivered, summary.failed)
                    .await
                {
                    warn!(campaign_id = %campaign_id, error = %e, "Failed to persist progress");
                }
                debug!(
                    campaign_id = %campaign_id,
                    sent = summary.total,
                    delivered = summary.delivered,
                    failed = summary.failed,
                    "Batch settled"
                );
            }

            if (page.len() as i64) < page_size {
                break;
            }
        }

        if !to_delete.is_empty() {
            match storage.subscribers.delete_subscribers(&to_delete).await {
                Ok(removed) => info!(campaign_id = %campaign_id, removed, "Pruned expired subscribers"),
                Err(e) => warn!(campaign_id = %campaign_id, error = %e, "Failed to prune expired subscribers"),
            }
        }

        storage
            .campaigns
            .set_progress(campaign_id, summary.total, summary.delivered, summary.failed)
            .await?;
        storage
            .campaigns
            .update_status(campaign_id, CampaignStatus::Completed)
            .await?;

        self.ctx.notifier.emit(
            campaign.site_id,
            CAMPAIGN_COMPLETED,
            serde_json::json!({
                "campaign_id": campaign_id,
                "total": summary.total,
                "delivered": summary.delivered,
                "failed": summary.failed,
            }),
        );

        info!(
            campaign_id = %campaign_id,
            delivered = summary.delivered,
            failed = summary.failed,
            "Campaign dispatch completed"
        );
        Ok(summary)
    }

    /// One subscriber. Never fails: errors count as a transient failure.
    async fn deliver(
        &self,
        campaign: &Campaign,
        subscriber: &Subscriber,
        sender: &SenderIdentity,
    ) -> DeliveryOutcome {
        let outcome = match attempt_delivery(&self.ctx, campaign, subscriber, sender).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(subscriber_id = %subscriber.id, error = %e, "Delivery step failed");
                DeliveryOutcome::Failed(None)
            }
        };

        let entry = match outcome {
            DeliveryOutcome::AlreadyDelivered => return outcome,
            DeliveryOutcome::Delivered(status) => {
                touch_subscriber(&self.ctx, subscriber.id).await;
                NewCampaignLog::new(campaign.id, subscriber.id, LogEventType::Delivered)
                    .with_status(Some(status))
            }
            DeliveryOutcome::Gone(status) => {
                NewCampaignLog::new(campaign.id, subscriber.id, LogEventType::Unsubscribed)
                    .with_status(Some(status))
            }
            DeliveryOutcome::Failed(status) => {
                NewCampaignLog::new(campaign.id, subscriber.id, LogEventType::Failed)
                    .with_status(status)
            }
        };
        write_log(&self.ctx, entry).await;
        outcome
    }
}

#[async_trait]
impl BroadcastStrategy for InlineStrategy {
    fn name(&self) -> &'static str {
        "inline"
    }

    async fn launch(&self, campaign: &Campaign) -> DispatchResult<()> {
        let strategy = self.clone();
        let campaign_id = campaign.id;
        tokio::spawn(async move {
            // Errors are logged and the campaign reverted inside run()
            let _ = strategy.run(campaign_id).await;
        });
        Ok(())
    }
}

// ============================================================================
// Queued
// ============================================================================

#[derive(Clone)]
pub struct QueuedStrategy {
    queue: Arc<dyn JobQueue>,
}

impl QueuedStrategy {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }
}

#[async_trait]
impl BroadcastStrategy for QueuedStrategy {
    fn name(&self) -> &'static str {
        "queued"
    }

    async fn launch(&self, campaign: &Campaign) -> DispatchResult<()> {
        let job_id = self.queue.enqueue(broadcast_job(campaign.id)).await?;
        info!(campaign_id = %campaign.id, job_id = %job_id, "Broadcast job enqueued");
        Ok(())
    }
}
