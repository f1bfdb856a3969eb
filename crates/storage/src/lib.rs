// Persistence for the push engine
//
// - Store traits consumed by the dispatcher and notifier (`store`)
// - PostgreSQL implementation (`repositories`) and in-memory implementation (`memory`)
// - Key Vault for site signing keys (`encryption`)

pub mod backend;
pub mod encryption;
pub mod endpoint;
pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use backend::StorageBackend;
pub use encryption::{generate_encryption_key, KeyVault, KeyVaultError, VapidKeypair};
pub use endpoint::hash_endpoint;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryDatabase;
pub use models::*;
pub use repositories::Database;
pub use store::{CampaignStore, SiteStore, SubscriberDirectory, WebhookStore};
