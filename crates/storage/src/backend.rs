// Storage backend selection
// Decision: One bundle of trait objects instead of per-method enum dispatch
//
// The engine only sees the store traits; which implementation backs them is
// decided once at startup (PostgreSQL when DATABASE_URL is set, else in-memory).

use std::sync::Arc;
use tracing::info;

use crate::error::StoreResult;
use crate::memory::InMemoryDatabase;
use crate::repositories::Database;
use crate::store::{CampaignStore, SiteStore, SubscriberDirectory, WebhookStore};

#[derive(Clone)]
pub struct StorageBackend {
    pub sites: Arc<dyn SiteStore>,
    pub subscribers: Arc<dyn SubscriberDirectory>,
    pub campaigns: Arc<dyn CampaignStore>,
    pub webhooks: Arc<dyn WebhookStore>,
    dev_mode: bool,
}

impl StorageBackend {
    /// Connect to PostgreSQL and apply migrations.
    pub async fn postgres(database_url: &str) -> StoreResult<Self> {
        let db = Database::from_url(database_url).await?;
        db.migrate().await?;
        info!("Connected to PostgreSQL store");
        Ok(Self::from_database(db))
    }

    pub fn from_database(db: Database) -> Self {
        let db = Arc::new(db);
        Self {
            sites: db.clone(),
            subscribers: db.clone(),
            campaigns: db.clone(),
            webhooks: db,
            dev_mode: false,
        }
    }

    pub fn in_memory() -> Self {
        info!("Using in-memory store (dev mode, data is lost on restart)");
        Self::from_memory(Arc::new(InMemoryDatabase::new()))
    }

    /// Wrap an existing in-memory database (tests keep a handle for seeding).
    pub fn from_memory(db: Arc<InMemoryDatabase>) -> Self {
        Self {
            sites: db.clone(),
            subscribers: db.clone(),
            campaigns: db.clone(),
            webhooks: db,
            dev_mode: true,
        }
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode
    }
}
