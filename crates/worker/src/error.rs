// Engine error types

use pushcast_durable::QueueError;
use pushcast_storage::{KeyVaultError, StoreError};
use uuid::Uuid;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("campaign not found: {0}")]
    CampaignNotFound(Uuid),

    #[error("site not found: {0}")]
    SiteNotFound(Uuid),

    #[error("subscriber not found")]
    SubscriberNotFound,

    #[error("subscribers may not hold more than {max} tags (would have {count})")]
    TagLimitExceeded { count: usize, max: usize },

    /// Duplicate dispatch or a change to an in-flight campaign
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// The site's signing key cannot be recovered
    #[error("key vault: {0}")]
    KeyVault(#[from] KeyVaultError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    #[error("push transport: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook target must use https: {0}")]
    InsecureUrl(String),

    #[error("a site may register at most {0} webhooks")]
    LimitExceeded(usize),

    #[error("at least one event is required")]
    NoEvents,

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}
