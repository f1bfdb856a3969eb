// Pushcast Schemas
//
// Decision: This crate is the source of truth for all shared data structures
// Decision: Status enums serialize as lowercase strings, matching the TEXT columns in storage

pub mod campaign;
pub mod payload;
pub mod site;
pub mod subscriber;
pub mod webhook;

// Campaign types
pub use campaign::{
    Campaign, CampaignCounters, CampaignLog, CampaignStatus, LogEventType, UnknownStatus,
};

// Push payload
pub use payload::{PushPayload, PushPayloadData};

// Site types
pub use site::Site;

// Subscriber types
pub use subscriber::{PushSubscription, Subscriber, SubscriberStatus};

// Webhook types
pub use webhook::{
    DeliveryStatus, Webhook, WebhookDelivery, WebhookEnvelope, CAMPAIGN_COMPLETED, KNOWN_EVENTS,
    MAX_WEBHOOKS_PER_SITE, NOTIFICATION_CLICKED, NOTIFICATION_DELIVERED, NOTIFICATION_DISMISSED,
    SUBSCRIBER_CREATED, SUBSCRIBER_DELETED,
};
