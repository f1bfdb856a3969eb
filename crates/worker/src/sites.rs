// Site provisioning: signing keypair and SDK token

use pushcast_schemas::Site;
use pushcast_storage::{KeyVault, NewSite};
use tracing::info;
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::{DispatchError, DispatchResult};
use crate::webhook::generate_secret;

#[derive(Debug, Clone)]
pub struct SiteRequest {
    pub name: String,
    pub domain: String,
    pub default_icon_url: Option<String>,
}

#[derive(Clone)]
pub struct SiteService {
    ctx: EngineContext,
}

impl SiteService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Create a site with a fresh VAPID keypair. Only the encrypted private
    /// key is stored.
    pub async fn create_site(&self, request: SiteRequest) -> DispatchResult<Site> {
        let name = request.name.trim();
        let domain = request.domain.trim().trim_end_matches('/');
        if name.is_empty() || domain.is_empty() {
            return Err(DispatchError::Validation(
                "name and domain are required".to_string(),
            ));
        }

        let keypair = KeyVault::generate_keypair();
        let vapid_private_key_enc = self.ctx.vault.encrypt(&keypair.private_key)?;

        let site = self
            .ctx
            .storage
            .sites
            .create_site(NewSite {
                name: name.to_string(),
                domain: domain.to_string(),
                vapid_public_key: keypair.public_key,
                vapid_private_key_enc,
                sdk_token: generate_secret(),
                default_icon_url: request.default_icon_url,
            })
            .await?;

        info!(site_id = %site.id, domain = %site.domain, "Site created");
        Ok(site)
    }

    /// Public lookup used by the SDK to fetch the site's VAPID public key.
    pub async fn get_site(&self, id: Uuid) -> DispatchResult<Site> {
        self.ctx
            .storage
            .sites
            .get_site(id)
            .await?
            .ok_or(DispatchError::SiteNotFound(id))
    }
}
