// Queue job handlers
// Decision: Jobs carry ids only; handlers reload current rows so a retried job
// never acts on stale subscription keys
// Decision: Counter updates from send jobs are atomic increments (many workers per campaign)
//
// campaign.broadcast: page the active set by ascending id, enqueue one push.send per
//                     subscriber, then mark the campaign completed (submission done)
// push.send:          ledger check, one transport attempt, record the outcome

use pushcast_durable::{ClaimedJob, JobDefinition, JobError, JobQueue, JobResult, RetryPolicy};
use pushcast_schemas::{CampaignStatus, LogEventType};
use pushcast_storage::{CounterDelta, NewCampaignLog, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::delivery::{attempt_delivery, sender_identity, touch_subscriber, write_log, DeliveryOutcome};
use crate::error::DispatchError;

pub const BROADCAST_JOB: &str = "campaign.broadcast";
pub const SEND_JOB: &str = "push.send";

/// Error types a send job must not retry
const KEY_VAULT_ERROR: &str = "key_vault";
const INVALID_PAYLOAD: &str = "invalid_payload";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BroadcastPayload {
    pub campaign_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SendPayload {
    pub campaign_id: Uuid,
    pub subscriber_id: Uuid,
}

fn parse<T: for<'de> Deserialize<'de>>(job: &ClaimedJob) -> Result<T, JobError> {
    serde_json::from_value(job.payload.clone())
        .map_err(|e| JobError::typed(INVALID_PAYLOAD, e.to_string()))
}

fn job_error(err: DispatchError) -> JobError {
    match err {
        DispatchError::KeyVault(e) => JobError::typed(KEY_VAULT_ERROR, e.to_string()),
        other => JobError::new(other.to_string()),
    }
}

/// Retry policy attached to every `push.send` job.
pub fn send_retry_policy() -> RetryPolicy {
    RetryPolicy::push_send()
        .with_non_retryable_error(KEY_VAULT_ERROR)
        .with_non_retryable_error(INVALID_PAYLOAD)
}

pub fn broadcast_job(campaign_id: Uuid) -> JobDefinition {
    JobDefinition::new(BROADCAST_JOB, serde_json::json!({ "campaign_id": campaign_id }))
}

pub fn send_job(campaign_id: Uuid, subscriber_id: Uuid) -> JobDefinition {
    JobDefinition::new(
        SEND_JOB,
        serde_json::json!({ "campaign_id": campaign_id, "subscriber_id": subscriber_id }),
    )
    .with_retry_policy(send_retry_policy())
}

// ============================================================================
// campaign.broadcast
// ============================================================================

/// Fans one campaign out into per-subscriber send jobs.
#[derive(Clone)]
pub struct BroadcastJob {
    ctx: EngineContext,
    queue: Arc<dyn JobQueue>,
}

impl BroadcastJob {
    pub fn new(ctx: EngineContext, queue: Arc<dyn JobQueue>) -> Self {
        Self { ctx, queue }
    }

    pub async fn handle(&self, job: ClaimedJob) -> JobResult {
        let BroadcastPayload { campaign_id } = parse(&job)?;

        match self.fan_out(campaign_id).await {
            Ok(enqueued) => {
                info!(campaign_id = %campaign_id, enqueued, "Campaign dispatch submitted");
                Ok(())
            }
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "Broadcast failed, reverting campaign to draft");
                if let Err(revert) = self
                    .ctx
                    .storage
                    .campaigns
                    .update_status(campaign_id, CampaignStatus::Draft)
                    .await
                {
                    error!(campaign_id = %campaign_id, error = %revert, "Failed to revert campaign");
                }
                Err(job_error(e))
            }
        }
    }

    async fn fan_out(&self, campaign_id: Uuid) -> Result<usize, DispatchError> {
        let storage = &self.ctx.storage;
        let campaign = storage
            .campaigns
            .get_campaign(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

        // A site whose key cannot be recovered would fail every send job
        sender_identity(&self.ctx, campaign.site_id).await?;

        let page_size = self.ctx.config.page_size;
        let mut cursor = None;
        let mut enqueued = 0usize;

        loop {
            let page = storage
                .subscribers
                .find_active_by_site(campaign.site_id, cursor, page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id);

            let jobs = page.iter().map(|s| send_job(campaign_id, s.id)).collect();
            self.queue.enqueue_bulk(jobs).await?;
            enqueued += page.len();

            storage
                .campaigns
                .increment_counters(
                    campaign_id,
                    CounterDelta {
                        sent: page.len() as i64,
                        ..Default::default()
                    },
                )
                .await?;
            debug!(campaign_id = %campaign_id, enqueued, "Enqueued send page");

            if (page.len() as i64) < page_size {
                break;
            }
        }

        storage
            .campaigns
            .update_status(campaign_id, CampaignStatus::Completed)
            .await?;
        Ok(enqueued)
    }
}

// ============================================================================
// push.send
// ============================================================================

/// Delivers a campaign to one subscriber.
#[derive(Clone)]
pub struct SendJob {
    ctx: EngineContext,
}

impl SendJob {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, job: ClaimedJob) -> JobResult {
        let SendPayload {
            campaign_id,
            subscriber_id,
        } = parse(&job)?;
        let storage = &self.ctx.storage;

        let subscriber = match storage.subscribers.get_subscriber(subscriber_id).await {
            Ok(Some(s)) if s.is_active() => s,
            Ok(_) => {
                debug!(subscriber_id = %subscriber_id, "Subscriber gone, skipping send");
                return Ok(());
            }
            Err(e) => return Err(JobError::new(e.to_string())),
        };
        let campaign = match storage.campaigns.get_campaign(campaign_id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                debug!(campaign_id = %campaign_id, "Campaign gone, skipping send");
                return Ok(());
            }
            Err(e) => return Err(JobError::new(e.to_string())),
        };

        let sender = sender_identity(&self.ctx, campaign.site_id)
            .await
            .map_err(job_error)?;
        let outcome = attempt_delivery(&self.ctx, &campaign, &subscriber, &sender)
            .await
            .map_err(job_error)?;

        let store_err = |e: StoreError| JobError::new(e.to_string());

        match outcome {
            DeliveryOutcome::AlreadyDelivered => {
                debug!(campaign_id = %campaign_id, subscriber_id = %subscriber_id, "Already delivered");
                Ok(())
            }
            DeliveryOutcome::Delivered(status) => {
                let entry = NewCampaignLog::new(campaign_id, subscriber_id, LogEventType::Delivered)
                    .with_status(Some(status));
                storage
                    .campaigns
                    .record_delivery(entry)
                    .await
                    .map_err(store_err)?;
                touch_subscriber(&self.ctx, subscriber_id).await;
                Ok(())
            }
            DeliveryOutcome::Gone(status) => {
                // Count, log and prune together; a failed write keeps the subscriber for the retry
                storage
                    .campaigns
                    .record_unsubscribe(
                        NewCampaignLog::new(campaign_id, subscriber_id, LogEventType::Unsubscribed)
                            .with_status(Some(status)),
                    )
                    .await
                    .map_err(store_err)?;
                info!(subscriber_id = %subscriber_id, status, "Pruned expired subscriber");
                Ok(())
            }
            DeliveryOutcome::Failed(status) => {
                // Only the last attempt settles the subscriber as failed
                if job.is_final_attempt() {
                    storage
                        .campaigns
                        .increment_counters(campaign_id, CounterDelta::failed())
                        .await
                        .map_err(store_err)?;
                    write_log(
                        &self.ctx,
                        NewCampaignLog::new(campaign_id, subscriber_id, LogEventType::Failed)
                            .with_status(status),
                    )
                    .await;
                } else {
                    warn!(
                        subscriber_id = %subscriber_id,
                        attempt = job.attempt,
                        ?status,
                        "Transient push failure, will retry"
                    );
                }
                Err(JobError::new(match status {
                    Some(status) => format!("push service returned {status}"),
                    None => "push request failed".to_string(),
                }))
            }
        }
    }
}
