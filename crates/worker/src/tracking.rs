// Click / dismiss beacons from the service worker

use pushcast_schemas::{LogEventType, NOTIFICATION_CLICKED, NOTIFICATION_DISMISSED};
use pushcast_storage::{CounterDelta, NewCampaignLog};
use tracing::debug;
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::{DispatchError, DispatchResult};

#[derive(Clone)]
pub struct TrackingService {
    ctx: EngineContext,
}

impl TrackingService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn record_click(
        &self,
        campaign_id: Uuid,
        subscriber_id: Option<Uuid>,
    ) -> DispatchResult<()> {
        self.record(
            campaign_id,
            subscriber_id,
            LogEventType::Clicked,
            CounterDelta::clicked(),
            NOTIFICATION_CLICKED,
        )
        .await
    }

    pub async fn record_dismiss(
        &self,
        campaign_id: Uuid,
        subscriber_id: Option<Uuid>,
    ) -> DispatchResult<()> {
        self.record(
            campaign_id,
            subscriber_id,
            LogEventType::Dismissed,
            CounterDelta::dismissed(),
            NOTIFICATION_DISMISSED,
        )
        .await
    }

    async fn record(
        &self,
        campaign_id: Uuid,
        subscriber_id: Option<Uuid>,
        event_type: LogEventType,
        delta: CounterDelta,
        webhook_event: &str,
    ) -> DispatchResult<()> {
        let campaigns = &self.ctx.storage.campaigns;
        let campaign = campaigns
            .get_campaign(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

        campaigns
            .create_log(NewCampaignLog {
                campaign_id,
                subscriber_id,
                event_type,
                http_status: None,
            })
            .await?;
        campaigns.increment_counters(campaign_id, delta).await?;
        debug!(campaign_id = %campaign_id, event = %event_type, "Tracked beacon");

        self.ctx.notifier.emit(
            campaign.site_id,
            webhook_event,
            serde_json::json!({
                "campaign_id": campaign_id,
                "subscriber_id": subscriber_id,
            }),
        );
        Ok(())
    }
}
