// Campaign records
//
// A campaign is one notification broadcast to every active subscriber of a site.
// Lifecycle: draft/scheduled -> dispatching -> completed, with dispatching -> draft
// as the only recovery edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::{PushPayload, PushPayloadData};

/// Returned when a stored status string is not one of the known variants.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownStatus {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Campaign lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    /// Editable, never sent (or reverted after a failed inline run).
    Draft,
    /// Waiting for `scheduled_at`.
    Scheduled,
    /// A broadcast is in flight. No second send may start.
    Dispatching,
    /// Terminal.
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Dispatching => "dispatching",
            CampaignStatus::Completed => "completed",
        }
    }

    /// Whether a send may be accepted from this status.
    pub fn accepts_send(&self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Scheduled)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "dispatching" => Ok(CampaignStatus::Dispatching),
            "completed" => Ok(CampaignStatus::Completed),
            other => Err(UnknownStatus::new("campaign", other)),
        }
    }
}

/// Running counters of a campaign. All values are monotonic during one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCounters {
    pub targeted_count: i64,
    pub sent_count: i64,
    pub delivered_count: i64,
    pub failed_count: i64,
    pub clicked_count: i64,
    pub dismissed_count: i64,
}

impl CampaignCounters {
    /// Click-through rate as a percentage string with two decimals, e.g. `"12.50%"`.
    pub fn click_through_rate(&self) -> String {
        if self.delivered_count <= 0 {
            return "0.00%".to_string();
        }
        let ctr = self.clicked_count as f64 / self.delivered_count as f64 * 100.0;
        format!("{ctr:.2}%")
    }
}

/// One message to broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub site_id: Uuid,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub target_url: String,
    /// Opaque segment filter. Stored and passed through; not applied to targeting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_filters: Option<serde_json::Value>,
    pub status: CampaignStatus,
    #[serde(flatten)]
    pub counters: CampaignCounters,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Build the push payload for one subscriber.
    pub fn payload(&self, subscriber_id: Option<Uuid>, click_tracking_url: &str) -> PushPayload {
        PushPayload {
            title: self.title.clone(),
            body: self.body.clone(),
            icon: self.icon_url.clone(),
            badge: self.badge_url.clone(),
            image: self.image_url.clone(),
            data: PushPayloadData {
                url: self.target_url.clone(),
                campaign_id: self.id,
                subscriber_id,
                click_tracking_url: click_tracking_url.to_string(),
            },
        }
    }
}

/// Event recorded in the campaign log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEventType {
    Delivered,
    Failed,
    Unsubscribed,
    Clicked,
    Dismissed,
}

impl LogEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEventType::Delivered => "delivered",
            LogEventType::Failed => "failed",
            LogEventType::Unsubscribed => "unsubscribed",
            LogEventType::Clicked => "clicked",
            LogEventType::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for LogEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogEventType {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivered" => Ok(LogEventType::Delivered),
            "failed" => Ok(LogEventType::Failed),
            "unsubscribed" => Ok(LogEventType::Unsubscribed),
            "clicked" => Ok(LogEventType::Clicked),
            "dismissed" => Ok(LogEventType::Dismissed),
            other => Err(UnknownStatus::new("log event", other)),
        }
    }
}

/// Append-only campaign fact. A `delivered` row for (campaign, subscriber) is the
/// idempotency ledger entry meaning "do not resend".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignLog {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub subscriber_id: Option<Uuid>,
    pub event_type: LogEventType,
    pub http_status: Option<i32>,
    pub created_at: DateTime<Utc>,
}
