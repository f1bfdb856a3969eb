// Per-subscriber delivery step shared by the inline run and the send job
//
// Checks the idempotency ledger, builds the subscriber's payload and makes one
// transport attempt. Recording the outcome is left to the caller: the inline
// run keeps counters in memory and defers deletions, the send job writes
// atomic increments immediately.

use pushcast_schemas::{Campaign, Subscriber};
use pushcast_storage::{NewCampaignLog, StoreError};
use tracing::warn;
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::{DispatchError, DispatchResult};
use crate::transport::{PushOutcome, SenderIdentity};

/// What happened to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Ledger already had a `delivered` row; nothing was sent
    AlreadyDelivered,
    Delivered(u16),
    /// Endpoint is gone for good
    Gone(u16),
    Failed(Option<u16>),
}

impl From<PushOutcome> for DeliveryOutcome {
    fn from(outcome: PushOutcome) -> Self {
        match outcome {
            PushOutcome::Delivered(status) => DeliveryOutcome::Delivered(status),
            PushOutcome::PermanentFailure(status) => DeliveryOutcome::Gone(status),
            PushOutcome::TransientFailure(status) => DeliveryOutcome::Failed(status),
        }
    }
}

/// Recover the site's signing identity. Fails when the site is missing or its
/// key cannot be decrypted.
pub async fn sender_identity(ctx: &EngineContext, site_id: Uuid) -> DispatchResult<SenderIdentity> {
    let site = ctx
        .storage
        .sites
        .get_site(site_id)
        .await?
        .ok_or_else(|| StoreError::not_found("site", site_id))?;

    let private_key = ctx.vault.decrypt(&site.vapid_private_key_enc)?;
    Ok(SenderIdentity::for_site(&site, private_key))
}

/// Ledger check followed by one transport attempt.
pub async fn attempt_delivery(
    ctx: &EngineContext,
    campaign: &Campaign,
    subscriber: &Subscriber,
    sender: &SenderIdentity,
) -> DispatchResult<DeliveryOutcome> {
    if ctx
        .storage
        .campaigns
        .has_delivered(campaign.id, subscriber.id)
        .await?
    {
        return Ok(DeliveryOutcome::AlreadyDelivered);
    }

    let payload = campaign
        .payload(Some(subscriber.id), &ctx.config.click_tracking_url())
        .to_bytes()
        .map_err(|e| DispatchError::Transport(format!("payload serialization: {e}")))?;

    let outcome = ctx
        .transport
        .attempt(&subscriber.subscription(), sender, &payload)
        .await;

    Ok(outcome.into())
}

/// Best-effort log append; a failed write never fails the delivery.
pub async fn write_log(ctx: &EngineContext, entry: NewCampaignLog) {
    let event = entry.event_type;
    if let Err(e) = ctx.storage.campaigns.create_log(entry).await {
        warn!(error = %e, event = %event, "Failed to write campaign log");
    }
}

/// Best-effort `last_seen_at` refresh after a successful delivery.
pub async fn touch_subscriber(ctx: &EngineContext, subscriber_id: Uuid) {
    if let Err(e) = ctx.storage.subscribers.update_last_seen(subscriber_id).await {
        warn!(error = %e, subscriber_id = %subscriber_id, "Failed to update last_seen_at");
    }
}
