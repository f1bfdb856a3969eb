// Dispatch service: the operator-facing entry points for campaigns
// Decision: Strategy is picked per request by probing the queue, never persisted
// Decision: `dispatching` is claimed with a compare-and-set before any work starts

use pushcast_durable::JobQueue;
use pushcast_schemas::{Campaign, CampaignStatus};
use pushcast_storage::{NewCampaign, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::{DispatchError, DispatchResult};
use crate::strategy::{BroadcastStrategy, InlineStrategy, QueuedStrategy};

/// Result of an accepted send request.
#[derive(Debug, Clone, Serialize)]
pub struct SendAccepted {
    pub campaign_id: Uuid,
    pub targeted_count: i64,
    /// `inline`, `queued`, or `none` when there was nobody to send to
    pub strategy: &'static str,
}

#[derive(Clone)]
pub struct DispatchService {
    ctx: EngineContext,
    inline: Arc<InlineStrategy>,
    queued: Option<Arc<QueuedStrategy>>,
}

impl DispatchService {
    pub fn new(ctx: EngineContext, queue: Option<Arc<dyn JobQueue>>) -> Self {
        Self {
            inline: Arc::new(InlineStrategy::new(ctx.clone())),
            queued: queue.map(|q| Arc::new(QueuedStrategy::new(q))),
            ctx,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn inline(&self) -> &InlineStrategy {
        &self.inline
    }

    /// Whether the queue backend answers right now. `None` when no queue is configured.
    pub async fn queue_reachable(&self) -> Option<bool> {
        let queued = self.queued.as_ref()?;
        let probe = tokio::time::timeout(self.ctx.config.queue_probe_timeout, queued.queue().ping());
        Some(matches!(probe.await, Ok(Ok(()))))
    }

    async fn select_strategy(&self) -> Arc<dyn BroadcastStrategy> {
        if let Some(queued) = &self.queued {
            if self.queue_reachable().await == Some(true) {
                return queued.clone();
            }
            warn!("Queue backend unreachable, falling back to inline dispatch");
        }
        self.inline.clone()
    }

    /// Validate and store a new campaign (`scheduled` when a send time is given).
    pub async fn create_campaign(&self, input: NewCampaign) -> DispatchResult<Campaign> {
        for (field, value) in [
            ("title", &input.title),
            ("body", &input.body),
            ("target_url", &input.target_url),
        ] {
            if value.trim().is_empty() {
                return Err(DispatchError::Validation(format!("{field} is required")));
            }
        }

        self.ctx
            .storage
            .sites
            .get_site(input.site_id)
            .await?
            .ok_or_else(|| StoreError::not_found("site", input.site_id))?;

        let campaign = self.ctx.storage.campaigns.create_campaign(input).await?;
        info!(campaign_id = %campaign.id, status = %campaign.status, "Campaign created");
        Ok(campaign)
    }

    pub async fn delete_campaign(&self, campaign_id: Uuid) -> DispatchResult<()> {
        match self.ctx.storage.campaigns.delete_campaign(campaign_id).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => Err(DispatchError::CampaignNotFound(campaign_id)),
            Err(StoreError::Conflict(msg)) => Err(DispatchError::Conflict(msg)),
            Err(e) => Err(e.into()),
        }
    }

    /// Accept a campaign for broadcast and return without waiting for delivery.
    pub async fn request_send(&self, campaign_id: Uuid) -> DispatchResult<SendAccepted> {
        let campaigns = &self.ctx.storage.campaigns;

        let current = campaigns
            .get_campaign(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;
        if !current.status.accepts_send() {
            return Err(DispatchError::Conflict(format!(
                "campaign is {}",
                current.status
            )));
        }

        let campaign = campaigns.begin_dispatch(campaign_id).await?.ok_or_else(|| {
            DispatchError::Conflict("campaign is already dispatching".to_string())
        })?;

        match self.start(&campaign).await {
            Ok(accepted) => Ok(accepted),
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "Failed to start dispatch, reverting to draft");
                if let Err(revert) = campaigns
                    .update_status(campaign_id, CampaignStatus::Draft)
                    .await
                {
                    error!(campaign_id = %campaign_id, error = %revert, "Failed to revert campaign");
                }
                Err(e)
            }
        }
    }

    async fn start(&self, campaign: &Campaign) -> DispatchResult<SendAccepted> {
        let storage = &self.ctx.storage;
        let targeted = storage
            .subscribers
            .count_active_by_site(campaign.site_id)
            .await?;
        storage.campaigns.set_targeted(campaign.id, targeted).await?;

        if targeted == 0 {
            storage
                .campaigns
                .update_status(campaign.id, CampaignStatus::Completed)
                .await?;
            info!(campaign_id = %campaign.id, "No active subscribers, campaign completed");
            return Ok(SendAccepted {
                campaign_id: campaign.id,
                targeted_count: 0,
                strategy: "none",
            });
        }

        let mut strategy = self.select_strategy().await;
        if let Err(e) = strategy.launch(campaign).await {
            if strategy.name() == self.inline.name() {
                return Err(e);
            }
            warn!(campaign_id = %campaign.id, error = %e, "Queued launch failed, dispatching inline");
            strategy = self.inline.clone();
            strategy.launch(campaign).await?;
        }

        info!(
            campaign_id = %campaign.id,
            targeted,
            strategy = strategy.name(),
            "Campaign accepted for dispatch"
        );
        Ok(SendAccepted {
            campaign_id: campaign.id,
            targeted_count: targeted,
            strategy: strategy.name(),
        })
    }
}
