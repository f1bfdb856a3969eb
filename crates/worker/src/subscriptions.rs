// SDK subscription lifecycle
// Decision: The endpoint hash is the identity; re-subscribing refreshes keys in place
// Decision: Browser and OS come from the User-Agent unless the SDK sends them

use pushcast_schemas::{Site, Subscriber, SUBSCRIBER_CREATED, SUBSCRIBER_DELETED};
use pushcast_storage::{hash_endpoint, NewSubscriber, TagMerge};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::{DispatchError, DispatchResult};
use crate::user_agent::ClientProfile;

/// Most tags one subscriber may hold.
pub const MAX_TAGS: usize = 100;
const MAX_TAG_VALUE_LEN: usize = 255;

static TAG_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_]{1,64}$").expect("tag key pattern is valid")
});

/// Check tag keys and values. Non-string values are kept as sent; the length
/// limit applies to their JSON text.
fn validate_tags(tags: &Map<String, Value>) -> DispatchResult<()> {
    for (key, value) in tags {
        if !TAG_KEY.is_match(key) {
            return Err(DispatchError::Validation(format!(
                "invalid tag key {key:?}: use letters, digits and underscores, at most 64"
            )));
        }
        let len = match value {
            Value::String(s) => s.chars().count(),
            other => other.to_string().chars().count(),
        };
        if len > MAX_TAG_VALUE_LEN {
            return Err(DispatchError::Validation(format!(
                "tag value for {key:?} exceeds {MAX_TAG_VALUE_LEN} characters"
            )));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct SubscriptionService {
    ctx: EngineContext,
}

impl SubscriptionService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Resolve the site an SDK request speaks for. Both the id and its token must match.
    pub async fn authenticate(&self, site_id: Uuid, sdk_token: &str) -> DispatchResult<Option<Site>> {
        let site = self.ctx.storage.sites.get_site_by_token(sdk_token).await?;
        Ok(site.filter(|s| s.id == site_id))
    }

    /// Returns the subscriber and whether it was newly created. `user_agent`
    /// fills in browser and OS when the request left them out.
    pub async fn subscribe(
        &self,
        mut input: NewSubscriber,
        user_agent: Option<&str>,
    ) -> DispatchResult<(Subscriber, bool)> {
        if input.endpoint.is_empty() || input.p256dh.is_empty() || input.auth.is_empty() {
            return Err(DispatchError::Validation(
                "endpoint, p256dh and auth are required".to_string(),
            ));
        }
        let Some(tags) = input.tags.as_object() else {
            return Err(DispatchError::Validation("tags must be an object".to_string()));
        };
        validate_tags(tags)?;
        if tags.len() > MAX_TAGS {
            return Err(DispatchError::TagLimitExceeded {
                count: tags.len(),
                max: MAX_TAGS,
            });
        }

        if input.browser.is_none() || input.os.is_none() {
            if let Some(user_agent) = user_agent {
                let detected = ClientProfile::from_user_agent(user_agent);
                input.browser = input.browser.or(detected.browser);
                input.os = input.os.or(detected.os);
            }
        }

        let (subscriber, created) = self.ctx.storage.subscribers.upsert_subscriber(input).await?;
        if created {
            info!(subscriber_id = %subscriber.id, site_id = %subscriber.site_id, "Subscriber created");
            self.ctx.notifier.emit(
                subscriber.site_id,
                SUBSCRIBER_CREATED,
                serde_json::json!({
                    "subscriber_id": subscriber.id,
                    "browser": subscriber.browser,
                    "os": subscriber.os,
                    "country": subscriber.country,
                }),
            );
        }
        Ok((subscriber, created))
    }

    /// Remove the subscription for `endpoint`. `None` when nothing matched.
    pub async fn unsubscribe(&self, site_id: Uuid, endpoint: &str) -> DispatchResult<Option<Subscriber>> {
        let removed = self
            .ctx
            .storage
            .subscribers
            .delete_by_endpoint_hash(site_id, &hash_endpoint(endpoint))
            .await?;

        if let Some(subscriber) = &removed {
            info!(subscriber_id = %subscriber.id, "Subscriber deleted");
            self.ctx.notifier.emit(
                site_id,
                SUBSCRIBER_DELETED,
                serde_json::json!({ "subscriber_id": subscriber.id }),
            );
        }
        Ok(removed)
    }

    /// Merge `tags` into the subscriber's existing tags and return the full map.
    pub async fn merge_tags(
        &self,
        site_id: Uuid,
        endpoint: &str,
        tags: Map<String, Value>,
    ) -> DispatchResult<Value> {
        if endpoint.is_empty() {
            return Err(DispatchError::Validation("endpoint is required".to_string()));
        }
        validate_tags(&tags)?;

        let merged = self
            .ctx
            .storage
            .subscribers
            .merge_tags(site_id, &hash_endpoint(endpoint), tags, MAX_TAGS)
            .await?;

        match merged {
            TagMerge::Updated(subscriber) => {
                debug!(subscriber_id = %subscriber.id, "Subscriber tags updated");
                Ok(subscriber.tags)
            }
            TagMerge::NotFound => Err(DispatchError::SubscriberNotFound),
            TagMerge::LimitExceeded(count) => Err(DispatchError::TagLimitExceeded {
                count,
                max: MAX_TAGS,
            }),
        }
    }
}
