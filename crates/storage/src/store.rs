// Store interfaces consumed by the dispatch engine
//
// Implemented by `Database` (PostgreSQL) and `InMemoryDatabase` (dev mode / tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushcast_schemas::{Campaign, CampaignLog, CampaignStatus, Site, Subscriber, Webhook, WebhookDelivery};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::*;

#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn create_site(&self, input: NewSite) -> StoreResult<Site>;

    async fn get_site(&self, id: Uuid) -> StoreResult<Option<Site>>;

    /// Resolve the site an SDK request authenticates as.
    async fn get_site_by_token(&self, sdk_token: &str) -> StoreResult<Option<Site>>;
}

#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    /// Insert or refresh by endpoint hash. Returns the row and whether it was newly created.
    /// An existing row is reactivated and its keys replaced; its profile fields and tags
    /// are kept. Fails with `Conflict` when the endpoint belongs to another site.
    async fn upsert_subscriber(&self, input: NewSubscriber) -> StoreResult<(Subscriber, bool)>;

    async fn get_subscriber(&self, id: Uuid) -> StoreResult<Option<Subscriber>>;

    /// One page of active subscribers ordered by ascending id, strictly after `after`.
    async fn find_active_by_site(
        &self,
        site_id: Uuid,
        after: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<Subscriber>>;

    async fn count_active_by_site(&self, site_id: Uuid) -> StoreResult<i64>;

    async fn update_last_seen(&self, id: Uuid) -> StoreResult<()>;

    /// Returns the number of rows removed.
    async fn delete_subscribers(&self, ids: &[Uuid]) -> StoreResult<u64>;

    async fn delete_by_endpoint_hash(
        &self,
        site_id: Uuid,
        endpoint_hash: &str,
    ) -> StoreResult<Option<Subscriber>>;

    /// Merge `tags` over the subscriber's existing tag map, later keys winning.
    /// Nothing is written when the merged map would exceed `max_tags`.
    async fn merge_tags(
        &self,
        site_id: Uuid,
        endpoint_hash: &str,
        tags: serde_json::Map<String, serde_json::Value>,
        max_tags: usize,
    ) -> StoreResult<TagMerge>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn create_campaign(&self, input: NewCampaign) -> StoreResult<Campaign>;

    async fn get_campaign(&self, id: Uuid) -> StoreResult<Option<Campaign>>;

    /// Compare-and-set `draft|scheduled -> dispatching`, stamping `dispatched_at`.
    /// Returns `None` when the campaign is missing or not in a sendable state.
    async fn begin_dispatch(&self, id: Uuid) -> StoreResult<Option<Campaign>>;

    /// Sets `completed_at` when moving to `completed`.
    async fn update_status(&self, id: Uuid, status: CampaignStatus) -> StoreResult<()>;

    async fn set_targeted(&self, id: Uuid, targeted: i64) -> StoreResult<()>;

    /// Absolute progress write used by the single-writer inline path.
    async fn set_progress(&self, id: Uuid, sent: i64, delivered: i64, failed: i64)
        -> StoreResult<()>;

    /// Atomic `col = col + delta` for concurrent writers.
    async fn increment_counters(&self, id: Uuid, delta: CounterDelta) -> StoreResult<()>;

    /// Fails with `Conflict` while dispatching, `NotFound` when absent.
    async fn delete_campaign(&self, id: Uuid) -> StoreResult<()>;

    async fn list_due_scheduled(&self, now: DateTime<Utc>, limit: i64)
        -> StoreResult<Vec<Campaign>>;

    async fn has_delivered(&self, campaign_id: Uuid, subscriber_id: Uuid) -> StoreResult<bool>;

    /// Append a log row. A second `delivered` row for the same (campaign, subscriber)
    /// is ignored and reported as `false`.
    async fn create_log(&self, input: NewCampaignLog) -> StoreResult<bool>;

    /// Write the `delivered` ledger entry and bump `delivered_count` together.
    /// Returns `false` (and changes nothing) when the entry already existed.
    async fn record_delivery(&self, input: NewCampaignLog) -> StoreResult<bool>;

    /// Write the `unsubscribed` log, bump `failed_count` and delete the subscriber
    /// in one step, so a failure part way leaves the subscriber in place for a retry.
    async fn record_unsubscribe(&self, input: NewCampaignLog) -> StoreResult<()>;

    async fn list_logs(&self, campaign_id: Uuid) -> StoreResult<Vec<CampaignLog>>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn create_webhook(&self, input: NewWebhook) -> StoreResult<Webhook>;

    async fn get_webhook(&self, id: Uuid) -> StoreResult<Option<Webhook>>;

    async fn count_webhooks_for_site(&self, site_id: Uuid) -> StoreResult<i64>;

    /// Insert only while the site holds fewer than `max_per_site` webhooks.
    /// Returns `None` when the limit is already reached.
    async fn create_webhook_within_limit(
        &self,
        input: NewWebhook,
        max_per_site: i64,
    ) -> StoreResult<Option<Webhook>>;

    async fn find_active_by_site_and_event(
        &self,
        site_id: Uuid,
        event_name: &str,
    ) -> StoreResult<Vec<Webhook>>;

    /// Created with status `pending`, attempt 1.
    async fn create_delivery(&self, input: NewWebhookDelivery) -> StoreResult<WebhookDelivery>;

    async fn update_delivery(&self, id: Uuid, update: DeliveryUpdate) -> StoreResult<()>;

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<WebhookDelivery>>;

    /// Most recent first.
    async fn list_deliveries(&self, webhook_id: Uuid, limit: i64)
        -> StoreResult<Vec<WebhookDelivery>>;
}
