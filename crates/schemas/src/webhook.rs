// Webhook registrations and delivery records

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::campaign::UnknownStatus;

// ============================================================================
// Event names
// ============================================================================

pub const SUBSCRIBER_CREATED: &str = "subscriber.created";
pub const SUBSCRIBER_DELETED: &str = "subscriber.deleted";
pub const NOTIFICATION_DELIVERED: &str = "notification.delivered";
pub const NOTIFICATION_CLICKED: &str = "notification.clicked";
pub const NOTIFICATION_DISMISSED: &str = "notification.dismissed";
pub const CAMPAIGN_COMPLETED: &str = "campaign.completed";

/// Event names a webhook may subscribe to.
pub const KNOWN_EVENTS: &[&str] = &[
    SUBSCRIBER_CREATED,
    SUBSCRIBER_DELETED,
    NOTIFICATION_DELIVERED,
    NOTIFICATION_CLICKED,
    NOTIFICATION_DISMISSED,
    CAMPAIGN_COMPLETED,
];

pub const MAX_WEBHOOKS_PER_SITE: usize = 10;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub site_id: Uuid,
    pub target_url: String,
    pub events: Vec<String>,
    pub is_active: bool,
    /// HMAC-SHA256 key for the `X-Push-Signature` header.
    #[serde(skip_serializing)]
    pub secret_token: String,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    pub fn subscribes_to(&self, event_name: &str) -> bool {
        self.events.iter().any(|e| e == event_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "success" => Ok(DeliveryStatus::Success),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(UnknownStatus::new("delivery", other)),
        }
    }
}

/// One logical webhook delivery; retried in place (attempt counter mutates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_name: String,
    /// Exact JSON body that was signed and POSTed.
    pub payload: String,
    pub http_status: Option<i32>,
    pub response: Option<String>,
    pub status: DeliveryStatus,
    pub attempt: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body POSTed to webhook targets. Field order is the canonical serialization order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub site_id: Uuid,
    /// RFC 3339, millisecond precision, `Z` suffix.
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    pub fn new(event: impl Into<String>, site_id: Uuid, data: serde_json::Value) -> Self {
        Self::at(event, site_id, data, Utc::now())
    }

    pub fn at(
        event: impl Into<String>,
        site_id: Uuid,
        data: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            event: event.into(),
            site_id,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        }
    }

    /// The canonical string that is both signed and sent.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_envelope_canonical_order() {
        let site_id = Uuid::nil();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let envelope = WebhookEnvelope::at(CAMPAIGN_COMPLETED, site_id, json!({"total": 3}), at);

        assert_eq!(
            envelope.to_canonical_json().unwrap(),
            r#"{"event":"campaign.completed","site_id":"00000000-0000-0000-0000-000000000000","timestamp":"2026-03-01T12:00:00.000Z","data":{"total":3}}"#
        );
    }

    #[test]
    fn test_subscribes_to() {
        let webhook = Webhook {
            id: Uuid::now_v7(),
            site_id: Uuid::now_v7(),
            target_url: "https://hooks.example.com".to_string(),
            events: vec![NOTIFICATION_CLICKED.to_string()],
            is_active: true,
            secret_token: "s".to_string(),
            created_at: Utc::now(),
        };
        assert!(webhook.subscribes_to(NOTIFICATION_CLICKED));
        assert!(!webhook.subscribes_to(CAMPAIGN_COMPLETED));
    }

    #[test]
    fn test_delivery_status_parse() {
        assert_eq!("success".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::Success);
        assert!("retrying".parse::<DeliveryStatus>().is_err());
    }
}
