// Database models (internal, may differ from the shared schema types)
//
// Row structs map 1:1 to table columns and convert into `pushcast_schemas`
// records. Input structs carry what callers supply on insert/update.

use chrono::{DateTime, Utc};
use pushcast_schemas::{
    Campaign, CampaignCounters, CampaignLog, DeliveryStatus, LogEventType, Site, Subscriber,
    Webhook, WebhookDelivery,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreError;

// ============================================
// Sites
// ============================================

#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: String,
    pub domain: String,
    pub vapid_public_key: String,
    pub vapid_private_key_enc: String,
    pub sdk_token: String,
    pub default_icon_url: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SiteRow {
    pub id: Uuid,
    pub name: String,
    pub domain: String,
    pub vapid_public_key: String,
    pub vapid_private_key_enc: String,
    pub sdk_token: String,
    pub default_icon_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<SiteRow> for Site {
    fn from(row: SiteRow) -> Self {
        Site {
            id: row.id,
            name: row.name,
            domain: row.domain,
            vapid_public_key: row.vapid_public_key,
            vapid_private_key_enc: row.vapid_private_key_enc,
            sdk_token: row.sdk_token,
            default_icon_url: row.default_icon_url,
            created_at: row.created_at,
        }
    }
}

// ============================================
// Subscribers
// ============================================

#[derive(Debug, Clone)]
pub struct NewSubscriber {
    pub site_id: Uuid,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
    pub tags: serde_json::Value,
}

#[derive(Debug, Clone, FromRow)]
pub struct SubscriberRow {
    pub id: Uuid,
    pub site_id: Uuid,
    pub endpoint: String,
    pub endpoint_hash: String,
    pub p256dh: String,
    pub auth: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
    pub tags: serde_json::Value,
    pub status: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = StoreError;

    fn try_from(row: SubscriberRow) -> Result<Self, Self::Error> {
        Ok(Subscriber {
            id: row.id,
            site_id: row.site_id,
            endpoint: row.endpoint,
            endpoint_hash: row.endpoint_hash,
            p256dh: row.p256dh,
            auth: row.auth,
            browser: row.browser,
            os: row.os,
            country: row.country,
            tags: row.tags,
            status: row.status.parse()?,
            last_seen_at: row.last_seen_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Result of merging tags into a subscriber's tag map.
#[derive(Debug, Clone)]
pub enum TagMerge {
    Updated(Subscriber),
    NotFound,
    /// The merged map would have held this many tags.
    LimitExceeded(usize),
}

// ============================================
// Campaigns
// ============================================

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub site_id: Uuid,
    pub title: String,
    pub body: String,
    pub icon_url: Option<String>,
    pub badge_url: Option<String>,
    pub image_url: Option<String>,
    pub target_url: String,
    pub segment_filters: Option<serde_json::Value>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Atomic counter increments. Applied as `col = col + delta` in one statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub sent: i64,
    pub delivered: i64,
    pub failed: i64,
    pub clicked: i64,
    pub dismissed: i64,
}

impl CounterDelta {
    pub fn delivered() -> Self {
        Self {
            delivered: 1,
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self {
            failed: 1,
            ..Default::default()
        }
    }

    pub fn clicked() -> Self {
        Self {
            clicked: 1,
            ..Default::default()
        }
    }

    pub fn dismissed() -> Self {
        Self {
            dismissed: 1,
            ..Default::default()
        }
    }

    pub(crate) fn apply(&self, counters: &mut CampaignCounters) {
        counters.sent_count += self.sent;
        counters.delivered_count += self.delivered;
        counters.failed_count += self.failed;
        counters.clicked_count += self.clicked;
        counters.dismissed_count += self.dismissed;
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CampaignRow {
    pub id: Uuid,
    pub site_id: Uuid,
    pub title: String,
    pub body: String,
    pub icon_url: Option<String>,
    pub badge_url: Option<String>,
    pub image_url: Option<String>,
    pub target_url: String,
    pub segment_filters: Option<serde_json::Value>,
    pub status: String,
    pub targeted_count: i64,
    pub sent_count: i64,
    pub delivered_count: i64,
    pub failed_count: i64,
    pub clicked_count: i64,
    pub dismissed_count: i64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = StoreError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        Ok(Campaign {
            id: row.id,
            site_id: row.site_id,
            title: row.title,
            body: row.body,
            icon_url: row.icon_url,
            badge_url: row.badge_url,
            image_url: row.image_url,
            target_url: row.target_url,
            segment_filters: row.segment_filters,
            status: row.status.parse()?,
            counters: CampaignCounters {
                targeted_count: row.targeted_count,
                sent_count: row.sent_count,
                delivered_count: row.delivered_count,
                failed_count: row.failed_count,
                clicked_count: row.clicked_count,
                dismissed_count: row.dismissed_count,
            },
            scheduled_at: row.scheduled_at,
            dispatched_at: row.dispatched_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ============================================
// Campaign logs
// ============================================

#[derive(Debug, Clone)]
pub struct NewCampaignLog {
    pub campaign_id: Uuid,
    pub subscriber_id: Option<Uuid>,
    pub event_type: LogEventType,
    pub http_status: Option<i32>,
}

impl NewCampaignLog {
    pub fn new(campaign_id: Uuid, subscriber_id: Uuid, event_type: LogEventType) -> Self {
        Self {
            campaign_id,
            subscriber_id: Some(subscriber_id),
            event_type,
            http_status: None,
        }
    }

    pub fn with_status(mut self, http_status: Option<u16>) -> Self {
        self.http_status = http_status.map(i32::from);
        self
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CampaignLogRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub subscriber_id: Option<Uuid>,
    pub event_type: String,
    pub http_status: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CampaignLogRow> for CampaignLog {
    type Error = StoreError;

    fn try_from(row: CampaignLogRow) -> Result<Self, Self::Error> {
        Ok(CampaignLog {
            id: row.id,
            campaign_id: row.campaign_id,
            subscriber_id: row.subscriber_id,
            event_type: row.event_type.parse()?,
            http_status: row.http_status,
            created_at: row.created_at,
        })
    }
}

// ============================================
// Webhooks
// ============================================

#[derive(Debug, Clone)]
pub struct NewWebhook {
    pub site_id: Uuid,
    pub target_url: String,
    pub events: Vec<String>,
    pub secret_token: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct WebhookRow {
    pub id: Uuid,
    pub site_id: Uuid,
    pub target_url: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub secret_token: String,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookRow> for Webhook {
    fn from(row: WebhookRow) -> Self {
        Webhook {
            id: row.id,
            site_id: row.site_id,
            target_url: row.target_url,
            events: row.events,
            is_active: row.is_active,
            secret_token: row.secret_token,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewWebhookDelivery {
    pub webhook_id: Uuid,
    pub event_name: String,
    pub payload: String,
}

/// Outcome of one delivery attempt, written over the same delivery row.
#[derive(Debug, Clone)]
pub struct DeliveryUpdate {
    pub status: DeliveryStatus,
    pub attempt: i32,
    pub http_status: Option<i32>,
    pub response: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct WebhookDeliveryRow {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_name: String,
    pub payload: String,
    pub http_status: Option<i32>,
    pub response: Option<String>,
    pub status: String,
    pub attempt: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WebhookDeliveryRow> for WebhookDelivery {
    type Error = StoreError;

    fn try_from(row: WebhookDeliveryRow) -> Result<Self, Self::Error> {
        Ok(WebhookDelivery {
            id: row.id,
            webhook_id: row.webhook_id,
            event_name: row.event_name,
            payload: row.payload,
            http_status: row.http_status,
            response: row.response,
            status: row.status.parse()?,
            attempt: row.attempt,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
