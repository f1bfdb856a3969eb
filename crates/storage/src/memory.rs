// In-memory storage implementation for dev mode and tests
// Decision: Use parking_lot for thread-safe access
// Decision: Subscribers live in a BTreeMap so cursor pages follow ascending id
//
// Mirrors the PostgreSQL semantics that matter to the engine: the delivered
// ledger is unique per (campaign, subscriber) and counter updates are applied
// under a single write lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pushcast_schemas::{
    Campaign, CampaignCounters, CampaignLog, CampaignStatus, DeliveryStatus, LogEventType, Site,
    Subscriber, SubscriberStatus, Webhook, WebhookDelivery,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use crate::endpoint::hash_endpoint;
use crate::error::{StoreError, StoreResult};
use crate::models::*;
use crate::store::{CampaignStore, SiteStore, SubscriberDirectory, WebhookStore};

/// In-memory database. All data is lost on restart.
#[derive(Default)]
pub struct InMemoryDatabase {
    sites: RwLock<HashMap<Uuid, Site>>,
    subscribers: RwLock<BTreeMap<Uuid, Subscriber>>,
    campaigns: RwLock<HashMap<Uuid, Campaign>>,
    logs: RwLock<Vec<CampaignLog>>,
    // (campaign_id, subscriber_id) pairs with a delivered row
    delivered: RwLock<HashSet<(Uuid, Uuid)>>,
    webhooks: RwLock<HashMap<Uuid, Webhook>>,
    deliveries: RwLock<HashMap<Uuid, WebhookDelivery>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn with_campaign<F>(&self, id: Uuid, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Campaign),
    {
        let mut campaigns = self.campaigns.write();
        let campaign = campaigns
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("campaign", id))?;
        f(campaign);
        campaign.updated_at = Self::now();
        Ok(())
    }

    fn push_log(&self, input: NewCampaignLog) {
        self.logs.write().push(CampaignLog {
            id: Uuid::now_v7(),
            campaign_id: input.campaign_id,
            subscriber_id: input.subscriber_id,
            event_type: input.event_type,
            http_status: input.http_status,
            created_at: Self::now(),
        });
    }

    /// Claims the delivered slot. Returns false if already taken.
    fn claim_delivered(&self, input: &NewCampaignLog) -> bool {
        match (input.event_type, input.subscriber_id) {
            (LogEventType::Delivered, Some(subscriber_id)) => self
                .delivered
                .write()
                .insert((input.campaign_id, subscriber_id)),
            _ => true,
        }
    }
}

// ============================================
// Sites
// ============================================

#[async_trait]
impl SiteStore for InMemoryDatabase {
    async fn create_site(&self, input: NewSite) -> StoreResult<Site> {
        let site = Site {
            id: Uuid::now_v7(),
            name: input.name,
            domain: input.domain,
            vapid_public_key: input.vapid_public_key,
            vapid_private_key_enc: input.vapid_private_key_enc,
            sdk_token: input.sdk_token,
            default_icon_url: input.default_icon_url,
            created_at: Self::now(),
        };
        self.sites.write().insert(site.id, site.clone());
        Ok(site)
    }

    async fn get_site(&self, id: Uuid) -> StoreResult<Option<Site>> {
        Ok(self.sites.read().get(&id).cloned())
    }

    async fn get_site_by_token(&self, sdk_token: &str) -> StoreResult<Option<Site>> {
        Ok(self
            .sites
            .read()
            .values()
            .find(|s| s.sdk_token == sdk_token)
            .cloned())
    }
}

// ============================================
// Subscribers
// ============================================

#[async_trait]
impl SubscriberDirectory for InMemoryDatabase {
    async fn upsert_subscriber(&self, input: NewSubscriber) -> StoreResult<(Subscriber, bool)> {
        let endpoint_hash = hash_endpoint(&input.endpoint);
        let now = Self::now();
        let mut subscribers = self.subscribers.write();

        if let Some(existing) = subscribers
            .values_mut()
            .find(|s| s.endpoint_hash == endpoint_hash)
        {
            if existing.site_id != input.site_id {
                return Err(StoreError::Conflict(
                    "endpoint is registered to another site".to_string(),
                ));
            }
            // Profile fields and tags survive a key refresh
            existing.p256dh = input.p256dh;
            existing.auth = input.auth;
            existing.status = SubscriberStatus::Active;
            existing.last_seen_at = Some(now);
            existing.updated_at = now;
            return Ok((existing.clone(), false));
        }

        let subscriber = Subscriber {
            id: Uuid::now_v7(),
            site_id: input.site_id,
            endpoint: input.endpoint,
            endpoint_hash,
            p256dh: input.p256dh,
            auth: input.auth,
            browser: input.browser,
            os: input.os,
            country: input.country,
            tags: input.tags,
            status: SubscriberStatus::Active,
            last_seen_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        subscribers.insert(subscriber.id, subscriber.clone());
        Ok((subscriber, true))
    }

    async fn get_subscriber(&self, id: Uuid) -> StoreResult<Option<Subscriber>> {
        Ok(self.subscribers.read().get(&id).cloned())
    }

    async fn find_active_by_site(
        &self,
        site_id: Uuid,
        after: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<Subscriber>> {
        let subscribers = self.subscribers.read();
        let range = match after {
            Some(cursor) => subscribers.range((
                std::ops::Bound::Excluded(cursor),
                std::ops::Bound::Unbounded,
            )),
            None => subscribers.range(..),
        };

        Ok(range
            .map(|(_, s)| s)
            .filter(|s| s.site_id == site_id && s.is_active())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_active_by_site(&self, site_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .subscribers
            .read()
            .values()
            .filter(|s| s.site_id == site_id && s.is_active())
            .count() as i64)
    }

    async fn update_last_seen(&self, id: Uuid) -> StoreResult<()> {
        if let Some(subscriber) = self.subscribers.write().get_mut(&id) {
            let now = Self::now();
            subscriber.last_seen_at = Some(now);
            subscriber.updated_at = now;
        }
        Ok(())
    }

    async fn delete_subscribers(&self, ids: &[Uuid]) -> StoreResult<u64> {
        let mut subscribers = self.subscribers.write();
        Ok(ids
            .iter()
            .filter(|id| subscribers.remove(*id).is_some())
            .count() as u64)
    }

    async fn delete_by_endpoint_hash(
        &self,
        site_id: Uuid,
        endpoint_hash: &str,
    ) -> StoreResult<Option<Subscriber>> {
        let mut subscribers = self.subscribers.write();
        let id = subscribers
            .values()
            .find(|s| s.site_id == site_id && s.endpoint_hash == endpoint_hash)
            .map(|s| s.id);
        Ok(id.and_then(|id| subscribers.remove(&id)))
    }

    async fn merge_tags(
        &self,
        site_id: Uuid,
        endpoint_hash: &str,
        tags: serde_json::Map<String, serde_json::Value>,
        max_tags: usize,
    ) -> StoreResult<TagMerge> {
        let mut subscribers = self.subscribers.write();
        let Some(subscriber) = subscribers
            .values_mut()
            .find(|s| s.site_id == site_id && s.endpoint_hash == endpoint_hash)
        else {
            return Ok(TagMerge::NotFound);
        };

        let mut merged = subscriber.tags.as_object().cloned().unwrap_or_default();
        merged.extend(tags);
        if merged.len() > max_tags {
            return Ok(TagMerge::LimitExceeded(merged.len()));
        }

        subscriber.tags = serde_json::Value::Object(merged);
        subscriber.updated_at = Self::now();
        Ok(TagMerge::Updated(subscriber.clone()))
    }
}

// ============================================
// Campaigns
// ============================================

#[async_trait]
impl CampaignStore for InMemoryDatabase {
    async fn create_campaign(&self, input: NewCampaign) -> StoreResult<Campaign> {
        let now = Self::now();
        let status = if input.scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };
        let campaign = Campaign {
            id: Uuid::now_v7(),
            site_id: input.site_id,
            title: input.title,
            body: input.body,
            icon_url: input.icon_url,
            badge_url: input.badge_url,
            image_url: input.image_url,
            target_url: input.target_url,
            segment_filters: input.segment_filters,
            status,
            counters: CampaignCounters::default(),
            scheduled_at: input.scheduled_at,
            dispatched_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.campaigns.write().insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get_campaign(&self, id: Uuid) -> StoreResult<Option<Campaign>> {
        Ok(self.campaigns.read().get(&id).cloned())
    }

    async fn begin_dispatch(&self, id: Uuid) -> StoreResult<Option<Campaign>> {
        let mut campaigns = self.campaigns.write();
        match campaigns.get_mut(&id) {
            Some(campaign) if campaign.status.accepts_send() => {
                let now = Self::now();
                campaign.status = CampaignStatus::Dispatching;
                campaign.dispatched_at = Some(now);
                campaign.updated_at = now;
                Ok(Some(campaign.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_status(&self, id: Uuid, status: CampaignStatus) -> StoreResult<()> {
        self.with_campaign(id, |c| {
            c.status = status;
            if status == CampaignStatus::Completed {
                c.completed_at = Some(Self::now());
            }
        })
    }

    async fn set_targeted(&self, id: Uuid, targeted: i64) -> StoreResult<()> {
        self.with_campaign(id, |c| c.counters.targeted_count = targeted)
    }

    async fn set_progress(
        &self,
        id: Uuid,
        sent: i64,
        delivered: i64,
        failed: i64,
    ) -> StoreResult<()> {
        self.with_campaign(id, |c| {
            c.counters.sent_count = sent;
            c.counters.delivered_count = delivered;
            c.counters.failed_count = failed;
        })
    }

    async fn increment_counters(&self, id: Uuid, delta: CounterDelta) -> StoreResult<()> {
        self.with_campaign(id, |c| delta.apply(&mut c.counters))
    }

    async fn delete_campaign(&self, id: Uuid) -> StoreResult<()> {
        let mut campaigns = self.campaigns.write();
        match campaigns.get(&id) {
            None => Err(StoreError::not_found("campaign", id)),
            Some(c) if c.status == CampaignStatus::Dispatching => Err(StoreError::Conflict(
                "campaign is currently dispatching".to_string(),
            )),
            Some(_) => {
                campaigns.remove(&id);
                Ok(())
            }
        }
    }

    async fn list_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Campaign>> {
        let mut due: Vec<Campaign> = self
            .campaigns
            .read()
            .values()
            .filter(|c| {
                c.status == CampaignStatus::Scheduled && c.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|c| c.scheduled_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn has_delivered(&self, campaign_id: Uuid, subscriber_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .delivered
            .read()
            .contains(&(campaign_id, subscriber_id)))
    }

    async fn create_log(&self, input: NewCampaignLog) -> StoreResult<bool> {
        if !self.claim_delivered(&input) {
            return Ok(false);
        }
        self.push_log(input);
        Ok(true)
    }

    async fn record_delivery(&self, input: NewCampaignLog) -> StoreResult<bool> {
        let campaign_id = input.campaign_id;
        if !self.campaigns.read().contains_key(&campaign_id) {
            return Err(StoreError::not_found("campaign", campaign_id));
        }
        if !self.claim_delivered(&input) {
            return Ok(false);
        }
        self.push_log(input);
        self.with_campaign(campaign_id, |c| CounterDelta::delivered().apply(&mut c.counters))?;
        Ok(true)
    }

    async fn record_unsubscribe(&self, input: NewCampaignLog) -> StoreResult<()> {
        let campaign_id = input.campaign_id;
        let subscriber_id = input.subscriber_id;
        self.with_campaign(campaign_id, |c| CounterDelta::failed().apply(&mut c.counters))?;
        self.push_log(input);
        if let Some(id) = subscriber_id {
            self.subscribers.write().remove(&id);
        }
        Ok(())
    }

    async fn list_logs(&self, campaign_id: Uuid) -> StoreResult<Vec<CampaignLog>> {
        Ok(self
            .logs
            .read()
            .iter()
            .filter(|l| l.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

// ============================================
// Webhooks
// ============================================

#[async_trait]
impl WebhookStore for InMemoryDatabase {
    async fn create_webhook(&self, input: NewWebhook) -> StoreResult<Webhook> {
        let webhook = Webhook {
            id: Uuid::now_v7(),
            site_id: input.site_id,
            target_url: input.target_url,
            events: input.events,
            is_active: true,
            secret_token: input.secret_token,
            created_at: Self::now(),
        };
        self.webhooks.write().insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    async fn create_webhook_within_limit(
        &self,
        input: NewWebhook,
        max_per_site: i64,
    ) -> StoreResult<Option<Webhook>> {
        let mut webhooks = self.webhooks.write();
        let held = webhooks.values().filter(|w| w.site_id == input.site_id).count() as i64;
        if held >= max_per_site {
            return Ok(None);
        }
        let webhook = Webhook {
            id: Uuid::now_v7(),
            site_id: input.site_id,
            target_url: input.target_url,
            events: input.events,
            is_active: true,
            secret_token: input.secret_token,
            created_at: Self::now(),
        };
        webhooks.insert(webhook.id, webhook.clone());
        Ok(Some(webhook))
    }

    async fn get_webhook(&self, id: Uuid) -> StoreResult<Option<Webhook>> {
        Ok(self.webhooks.read().get(&id).cloned())
    }

    async fn count_webhooks_for_site(&self, site_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .webhooks
            .read()
            .values()
            .filter(|w| w.site_id == site_id)
            .count() as i64)
    }

    async fn find_active_by_site_and_event(
        &self,
        site_id: Uuid,
        event_name: &str,
    ) -> StoreResult<Vec<Webhook>> {
        Ok(self
            .webhooks
            .read()
            .values()
            .filter(|w| w.site_id == site_id && w.is_active && w.subscribes_to(event_name))
            .cloned()
            .collect())
    }

    async fn create_delivery(&self, input: NewWebhookDelivery) -> StoreResult<WebhookDelivery> {
        let now = Self::now();
        let delivery = WebhookDelivery {
            id: Uuid::now_v7(),
            webhook_id: input.webhook_id,
            event_name: input.event_name,
            payload: input.payload,
            http_status: None,
            response: None,
            status: DeliveryStatus::Pending,
            attempt: 1,
            created_at: now,
            updated_at: now,
        };
        self.deliveries
            .write()
            .insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    async fn update_delivery(&self, id: Uuid, update: DeliveryUpdate) -> StoreResult<()> {
        let mut deliveries = self.deliveries.write();
        let delivery = deliveries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("webhook delivery", id))?;
        delivery.status = update.status;
        delivery.attempt = update.attempt;
        delivery.http_status = update.http_status;
        delivery.response = update.response;
        delivery.updated_at = Self::now();
        Ok(())
    }

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<WebhookDelivery>> {
        Ok(self.deliveries.read().get(&id).cloned())
    }

    async fn list_deliveries(
        &self,
        webhook_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<WebhookDelivery>> {
        let mut rows: Vec<WebhookDelivery> = self
            .deliveries
            .read()
            .values()
            .filter(|d| d.webhook_id == webhook_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_subscriber(site_id: Uuid, endpoint: &str) -> NewSubscriber {
        NewSubscriber {
            site_id,
            endpoint: endpoint.to_string(),
            p256dh: "p256dh".to_string(),
            auth: "auth".to_string(),
            browser: Some("Firefox".to_string()),
            os: None,
            country: None,
            tags: json!({}),
        }
    }

    fn new_campaign(site_id: Uuid) -> NewCampaign {
        NewCampaign {
            site_id,
            title: "Hello".to_string(),
            body: "World".to_string(),
            icon_url: None,
            badge_url: None,
            image_url: None,
            target_url: "https://example.com".to_string(),
            segment_filters: None,
            scheduled_at: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_by_endpoint() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();

        let (first, created) = db
            .upsert_subscriber(new_subscriber(site_id, "https://push.example/a"))
            .await
            .unwrap();
        assert!(created);

        let mut again = new_subscriber(site_id, "https://push.example/a");
        again.auth = "rotated".to_string();
        let (second, created) = db.upsert_subscriber(again).await.unwrap();

        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.auth, "rotated");
        assert_eq!(db.count_active_by_site(site_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resubscribe_keeps_profile_and_tags() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();

        let mut first = new_subscriber(site_id, "https://push.example/a");
        first.os = Some("Linux".to_string());
        first.tags = json!({"plan": "pro"});
        let (original, _) = db.upsert_subscriber(first).await.unwrap();

        let mut refresh = new_subscriber(site_id, "https://push.example/a");
        refresh.browser = None;
        refresh.p256dh = "rotated".to_string();
        let (refreshed, created) = db.upsert_subscriber(refresh).await.unwrap();

        assert!(!created);
        assert_eq!(refreshed.id, original.id);
        assert_eq!(refreshed.p256dh, "rotated");
        assert_eq!(refreshed.tags, json!({"plan": "pro"}));
        assert_eq!(refreshed.os.as_deref(), Some("Linux"));
        assert_eq!(refreshed.browser.as_deref(), Some("Firefox"));
    }

    #[tokio::test]
    async fn test_endpoint_owned_by_other_site_is_rejected() {
        let db = InMemoryDatabase::new();
        let owner = Uuid::now_v7();
        let (original, _) = db
            .upsert_subscriber(new_subscriber(owner, "https://push.example/shared"))
            .await
            .unwrap();

        let mut intruder = new_subscriber(Uuid::now_v7(), "https://push.example/shared");
        intruder.auth = "hijacked".to_string();
        let result = db.upsert_subscriber(intruder).await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        let stored = db.get_subscriber(original.id).await.unwrap().unwrap();
        assert_eq!(stored.site_id, owner);
        assert_eq!(stored.auth, "auth");
    }

    #[tokio::test]
    async fn test_merge_tags_respects_limit() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();
        let mut input = new_subscriber(site_id, "https://push.example/t");
        input.tags = json!({"plan": "free", "lang": "en"});
        let (subscriber, _) = db.upsert_subscriber(input).await.unwrap();

        let mut tags = serde_json::Map::new();
        tags.insert("plan".to_string(), json!("pro"));
        tags.insert("team".to_string(), json!("core"));
        let merged = db
            .merge_tags(site_id, &subscriber.endpoint_hash, tags.clone(), 3)
            .await
            .unwrap();
        match merged {
            TagMerge::Updated(s) => {
                assert_eq!(s.tags, json!({"plan": "pro", "lang": "en", "team": "core"}))
            }
            other => panic!("unexpected merge result: {other:?}"),
        }

        let mut extra = serde_json::Map::new();
        extra.insert("region".to_string(), json!("eu"));
        assert!(matches!(
            db.merge_tags(site_id, &subscriber.endpoint_hash, extra, 3)
                .await
                .unwrap(),
            TagMerge::LimitExceeded(4)
        ));
        let stored = db.get_subscriber(subscriber.id).await.unwrap().unwrap();
        assert_eq!(stored.tags.as_object().map(|t| t.len()), Some(3));

        // Scoped to the owning site
        assert!(matches!(
            db.merge_tags(Uuid::now_v7(), &subscriber.endpoint_hash, tags, 3)
                .await
                .unwrap(),
            TagMerge::NotFound
        ));
    }

    #[tokio::test]
    async fn test_record_unsubscribe_counts_logs_and_deletes() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();
        let campaign = db.create_campaign(new_campaign(site_id)).await.unwrap();
        let (subscriber, _) = db
            .upsert_subscriber(new_subscriber(site_id, "https://push.example/gone"))
            .await
            .unwrap();

        db.record_unsubscribe(
            NewCampaignLog::new(campaign.id, subscriber.id, LogEventType::Unsubscribed)
                .with_status(Some(410)),
        )
        .await
        .unwrap();

        let campaign = db.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.counters.failed_count, 1);
        assert!(db.get_subscriber(subscriber.id).await.unwrap().is_none());
        let logs = db.list_logs(campaign.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event_type, LogEventType::Unsubscribed);
        assert_eq!(logs[0].http_status, Some(410));
    }

    #[tokio::test]
    async fn test_cursor_pages_cover_all_active() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();
        for i in 0..7 {
            db.upsert_subscriber(new_subscriber(site_id, &format!("https://push.example/{i}")))
                .await
                .unwrap();
        }
        // Other site's subscribers are never returned
        db.upsert_subscriber(new_subscriber(Uuid::now_v7(), "https://push.example/other"))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = db.find_active_by_site(site_id, cursor, 3).await.unwrap();
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|s| s.id);
            seen.extend(page.into_iter().map(|s| s.id));
        }

        assert_eq!(seen.len(), 7);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
    }

    #[tokio::test]
    async fn test_begin_dispatch_is_exclusive() {
        let db = InMemoryDatabase::new();
        let campaign = db.create_campaign(new_campaign(Uuid::now_v7())).await.unwrap();

        let started = db.begin_dispatch(campaign.id).await.unwrap().unwrap();
        assert_eq!(started.status, CampaignStatus::Dispatching);
        assert!(started.dispatched_at.is_some());

        assert!(db.begin_dispatch(campaign.id).await.unwrap().is_none());
        assert!(matches!(
            db.delete_campaign(campaign.id).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delivered_ledger_is_unique() {
        let db = InMemoryDatabase::new();
        let campaign = db.create_campaign(new_campaign(Uuid::now_v7())).await.unwrap();
        let subscriber_id = Uuid::now_v7();
        let log = NewCampaignLog::new(campaign.id, subscriber_id, LogEventType::Delivered);

        assert!(db.record_delivery(log.clone()).await.unwrap());
        assert!(!db.record_delivery(log.clone()).await.unwrap());
        assert!(!db.create_log(log).await.unwrap());

        let campaign = db.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.counters.delivered_count, 1);
        assert!(db.has_delivered(campaign.id, subscriber_id).await.unwrap());
        assert_eq!(db.list_logs(campaign.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_campaigns_become_due() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();
        let mut past = new_campaign(site_id);
        past.scheduled_at = Some(Utc::now() - chrono::Duration::minutes(1));
        let mut future = new_campaign(site_id);
        future.scheduled_at = Some(Utc::now() + chrono::Duration::hours(1));

        let due = db.create_campaign(past).await.unwrap();
        db.create_campaign(future).await.unwrap();
        db.create_campaign(new_campaign(site_id)).await.unwrap();

        assert_eq!(due.status, CampaignStatus::Scheduled);
        let found = db.list_due_scheduled(Utc::now(), 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn test_webhook_limit_is_enforced_on_insert() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();
        let hook = |n: usize| NewWebhook {
            site_id,
            target_url: format!("https://hooks.example.com/{n}"),
            events: vec!["campaign.completed".to_string()],
            secret_token: "s".to_string(),
        };

        assert!(db.create_webhook_within_limit(hook(0), 2).await.unwrap().is_some());
        assert!(db.create_webhook_within_limit(hook(1), 2).await.unwrap().is_some());
        assert!(db.create_webhook_within_limit(hook(2), 2).await.unwrap().is_none());
        assert_eq!(db.count_webhooks_for_site(site_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_webhook_event_filter() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();
        db.create_webhook(NewWebhook {
            site_id,
            target_url: "https://hooks.example.com/a".to_string(),
            events: vec!["campaign.completed".to_string()],
            secret_token: "s".to_string(),
        })
        .await
        .unwrap();

        let hits = db
            .find_active_by_site_and_event(site_id, "campaign.completed")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(db
            .find_active_by_site_and_event(site_id, "notification.clicked")
            .await
            .unwrap()
            .is_empty());
    }
}
