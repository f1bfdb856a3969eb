// Pushcast dispatch engine
//
// - Push Transport (`transport`)
// - Dispatcher with inline and queued broadcast strategies (`dispatch`, `strategy`, `jobs`)
// - Webhook Notifier (`webhook`)
// - Tracking, subscription and site entry points used by the HTTP layer
// - Scheduled campaign poller and queue worker wiring for the binary

pub mod config;
pub mod context;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod scheduler;
pub mod sites;
pub mod strategy;
pub mod subscriptions;
pub mod telemetry;
pub mod tracking;
pub mod transport;
pub mod user_agent;
pub mod webhook;
pub mod worker;

pub use config::DispatchConfig;
pub use context::EngineContext;
pub use delivery::DeliveryOutcome;
pub use dispatch::{DispatchService, SendAccepted};
pub use error::{DispatchError, DispatchResult, WebhookError};
pub use jobs::{BroadcastJob, SendJob, BROADCAST_JOB, SEND_JOB};
pub use scheduler::Scheduler;
pub use sites::{SiteRequest, SiteService};
pub use strategy::{BroadcastStrategy, DispatchSummary, InlineStrategy, QueuedStrategy};
pub use subscriptions::{SubscriptionService, MAX_TAGS};
pub use telemetry::init_tracing;
pub use tracking::TrackingService;
pub use transport::{PushOutcome, PushTransport, SenderIdentity, WebPushTransport};
pub use user_agent::ClientProfile;
pub use webhook::{register_webhook, sign_payload, WebhookNotifier};
pub use worker::DispatchWorker;
