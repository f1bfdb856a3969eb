// Site - tenant boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A site owns its VAPID signing keypair, its SDK token and its campaigns/webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: Uuid,
    pub name: String,
    /// Used to build the VAPID `sub` claim (`mailto:admin@{domain}`).
    pub domain: String,
    /// Base64url uncompressed P-256 point, handed to browsers as `applicationServerKey`.
    pub vapid_public_key: String,
    /// Key Vault ciphertext (`iv:encrypted`, hex). Never serialized outward.
    #[serde(skip_serializing)]
    pub vapid_private_key_enc: String,
    /// Shared secret the SDK presents as `X-Site-Token`.
    #[serde(skip_serializing)]
    pub sdk_token: String,
    pub default_icon_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Site {
    /// VAPID subject claim for this site.
    pub fn vapid_subject(&self) -> String {
        format!("mailto:admin@{}", self.domain)
    }
}
