// Webhook Notifier
// Decision: Fire-and-forget; callers never observe delivery outcomes
// Decision: One delivery row per (event, webhook), retried in place
//
// Flow per matching webhook:
// 1. Serialize the envelope once; that exact string is signed and sent
// 2. Insert a `pending` delivery row before any network call
// 3. POST with `X-Push-Signature: sha256=<hex>` and `X-Push-Event`
// 4. Non-2xx or transport error: keep `pending`, wait per the retry policy, retry
// 5. Out of attempts: `failed`

use hmac::{Hmac, Mac};
use pushcast_durable::RetryPolicy;
use pushcast_schemas::{DeliveryStatus, Webhook, WebhookEnvelope, KNOWN_EVENTS, MAX_WEBHOOKS_PER_SITE};
use pushcast_storage::{DeliveryUpdate, NewWebhook, NewWebhookDelivery, WebhookStore};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Push-Signature";
pub const EVENT_HEADER: &str = "X-Push-Event";

/// `sha256=<hex hmac>` over the exact body bytes.
pub fn sign_payload(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Random 64-char hex signing secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate and store a webhook registration. The returned record carries the
/// generated secret, which is only ever shown to the caller here.
pub async fn register_webhook(
    store: &dyn WebhookStore,
    site_id: Uuid,
    target_url: &str,
    events: Vec<String>,
) -> Result<Webhook, WebhookError> {
    let url = reqwest::Url::parse(target_url)
        .map_err(|_| WebhookError::InsecureUrl(target_url.to_string()))?;
    if url.scheme() != "https" || url.host_str().is_none() {
        return Err(WebhookError::InsecureUrl(target_url.to_string()));
    }

    if events.is_empty() {
        return Err(WebhookError::NoEvents);
    }
    if let Some(unknown) = events.iter().find(|e| !KNOWN_EVENTS.contains(&e.as_str())) {
        return Err(WebhookError::UnknownEvent(unknown.clone()));
    }

    let mut events = events;
    events.sort();
    events.dedup();

    let webhook = store
        .create_webhook_within_limit(
            NewWebhook {
                site_id,
                target_url: target_url.to_string(),
                events,
                secret_token: generate_secret(),
            },
            MAX_WEBHOOKS_PER_SITE as i64,
        )
        .await?
        .ok_or(WebhookError::LimitExceeded(MAX_WEBHOOKS_PER_SITE))?;

    info!(webhook_id = %webhook.id, site_id = %site_id, "Webhook registered");
    Ok(webhook)
}

/// Relays lifecycle events to registered webhook targets.
#[derive(Clone)]
pub struct WebhookNotifier {
    store: Arc<dyn WebhookStore>,
    client: reqwest::Client,
    policy: Arc<RetryPolicy>,
}

impl WebhookNotifier {
    pub fn new(store: Arc<dyn WebhookStore>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            store,
            client,
            policy: Arc::new(RetryPolicy::webhook()),
        })
    }

    /// Override the retry schedule (tests use zero delays).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Fire-and-forget. Lookup, persistence and delivery all happen on a
    /// background task.
    pub fn emit(&self, site_id: Uuid, event_name: &str, data: serde_json::Value) {
        let notifier = self.clone();
        let event_name = event_name.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver_event(site_id, &event_name, data).await {
                error!(error = %e, site_id = %site_id, event = %event_name, "Failed to emit webhook event");
            }
        });
    }

    /// Deliver one event to every interested webhook and wait for all of them
    /// to settle. Returns the delivery row ids.
    pub async fn deliver_event(
        &self,
        site_id: Uuid,
        event_name: &str,
        data: serde_json::Value,
    ) -> Result<Vec<Uuid>, WebhookError> {
        let webhooks = self
            .store
            .find_active_by_site_and_event(site_id, event_name)
            .await?;
        if webhooks.is_empty() {
            debug!(site_id = %site_id, event = %event_name, "No webhooks subscribed");
            return Ok(Vec::new());
        }

        let envelope = WebhookEnvelope::new(event_name, site_id, data);
        let body = envelope
            .to_canonical_json()
            .map_err(|e| WebhookError::Store(e.into()))?;

        let mut pending = Vec::with_capacity(webhooks.len());
        for webhook in webhooks {
            let delivery = self
                .store
                .create_delivery(NewWebhookDelivery {
                    webhook_id: webhook.id,
                    event_name: event_name.to_string(),
                    payload: body.clone(),
                })
                .await?;
            pending.push((webhook, delivery.id));
        }

        let ids = pending.iter().map(|(_, id)| *id).collect();
        let deliveries = pending
            .iter()
            .map(|(webhook, delivery_id)| self.deliver(webhook, event_name, &body, *delivery_id));
        futures::future::join_all(deliveries).await;

        Ok(ids)
    }

    async fn deliver(&self, webhook: &Webhook, event_name: &str, body: &str, delivery_id: Uuid) {
        let signature = sign_payload(&webhook.secret_token, body);
        let mut attempt: u32 = 1;

        loop {
            let (succeeded, http_status, response) =
                match self.post(webhook, event_name, body, &signature).await {
                    Ok((status, text)) => ((200..300).contains(&status), Some(status as i32), text),
                    Err(e) => (false, None, e.to_string()),
                };

            let retrying = !succeeded && self.policy.has_attempts_remaining(attempt);
            let status = if succeeded {
                DeliveryStatus::Success
            } else if retrying {
                DeliveryStatus::Pending
            } else {
                DeliveryStatus::Failed
            };

            let update = DeliveryUpdate {
                status,
                attempt: attempt as i32,
                http_status,
                response: Some(response),
            };
            if let Err(e) = self.store.update_delivery(delivery_id, update).await {
                warn!(error = %e, delivery_id = %delivery_id, "Failed to update webhook delivery");
            }

            if !retrying {
                if succeeded {
                    debug!(webhook_id = %webhook.id, attempt, "Webhook delivered");
                } else {
                    warn!(webhook_id = %webhook.id, attempt, ?http_status, "Webhook delivery failed");
                }
                return;
            }

            attempt += 1;
            let delay = self.policy.delay_for_attempt(attempt);
            debug!(webhook_id = %webhook.id, attempt, delay_ms = delay.as_millis() as u64, "Retrying webhook");
            tokio::time::sleep(delay).await;
        }
    }

    async fn post(
        &self,
        webhook: &Webhook,
        event_name: &str,
        body: &str,
        signature: &str,
    ) -> Result<(u16, String), reqwest::Error> {
        let response = self
            .client
            .post(&webhook.target_url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event_name)
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Ok((status, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushcast_schemas::{CAMPAIGN_COMPLETED, NOTIFICATION_CLICKED};
    use pushcast_storage::InMemoryDatabase;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn notifier(db: Arc<InMemoryDatabase>) -> WebhookNotifier {
        WebhookNotifier::new(db, Duration::from_secs(5))
            .unwrap()
            .with_retry_policy(RetryPolicy::with_schedule(vec![Duration::ZERO], 3))
    }

    async fn webhook(db: &InMemoryDatabase, site_id: Uuid, url: String, events: &[&str]) -> Webhook {
        db.create_webhook(NewWebhook {
            site_id,
            target_url: url,
            events: events.iter().map(|e| e.to_string()).collect(),
            secret_token: generate_secret(),
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_sign_payload_format() {
        let signature = sign_payload("secret", r#"{"event":"x"}"#);
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), "sha256=".len() + 64);
        assert_eq!(signature, sign_payload("secret", r#"{"event":"x"}"#));
        assert_ne!(signature, sign_payload("other", r#"{"event":"x"}"#));
        // Empty and long secrets both sign
        assert!(sign_payload("", "{}").starts_with("sha256="));
        assert!(sign_payload(&"k".repeat(512), "{}").starts_with("sha256="));
    }

    #[test]
    fn test_generate_secret_is_64_hex() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_signature_verifies_against_delivered_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-push-event", CAMPAIGN_COMPLETED))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let db = Arc::new(InMemoryDatabase::new());
        let site_id = Uuid::now_v7();
        let hook = webhook(&db, site_id, format!("{}/hook", server.uri()), &[CAMPAIGN_COMPLETED]).await;

        let ids = notifier(db.clone())
            .deliver_event(site_id, CAMPAIGN_COMPLETED, json!({"total": 2}))
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let received = &requests[0];
        let body = String::from_utf8(received.body.clone()).unwrap();
        let signature = received
            .headers
            .get("x-push-signature")
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(signature, sign_payload(&hook.secret_token, &body));

        let envelope: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(envelope["event"], CAMPAIGN_COMPLETED);
        assert_eq!(envelope["site_id"], site_id.to_string());
        assert_eq!(envelope["data"]["total"], 2);

        let delivery = db.get_delivery(ids[0]).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Success);
        assert_eq!(delivery.http_status, Some(200));
        assert_eq!(delivery.response.as_deref(), Some("ok"));
        assert_eq!(delivery.payload, body);
    }

    #[tokio::test]
    async fn test_failing_target_gets_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let db = Arc::new(InMemoryDatabase::new());
        let site_id = Uuid::now_v7();
        webhook(&db, site_id, server.uri(), &[CAMPAIGN_COMPLETED]).await;

        let ids = notifier(db.clone())
            .deliver_event(site_id, CAMPAIGN_COMPLETED, json!({}))
            .await
            .unwrap();

        let delivery = db.get_delivery(ids[0]).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.attempt, 3);
        assert_eq!(delivery.http_status, Some(500));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_recovers_on_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let db = Arc::new(InMemoryDatabase::new());
        let site_id = Uuid::now_v7();
        webhook(&db, site_id, server.uri(), &[NOTIFICATION_CLICKED]).await;

        let ids = notifier(db.clone())
            .deliver_event(site_id, NOTIFICATION_CLICKED, json!({}))
            .await
            .unwrap();

        let delivery = db.get_delivery(ids[0]).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Success);
        assert_eq!(delivery.attempt, 2);
    }

    #[tokio::test]
    async fn test_uninterested_webhooks_get_no_delivery_row() {
        let db = Arc::new(InMemoryDatabase::new());
        let site_id = Uuid::now_v7();
        let hook = webhook(&db, site_id, "https://hooks.example.com".into(), &[NOTIFICATION_CLICKED]).await;

        let ids = notifier(db.clone())
            .deliver_event(site_id, CAMPAIGN_COMPLETED, json!({}))
            .await
            .unwrap();

        assert!(ids.is_empty());
        assert!(db.list_deliveries(hook.id, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_plain_http() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();
        for url in ["http://hooks.example.com/push", "ftp://hooks.example.com", "not a url"] {
            let err = register_webhook(&db, site_id, url, vec![CAMPAIGN_COMPLETED.to_string()])
                .await
                .unwrap_err();
            assert!(matches!(err, WebhookError::InsecureUrl(_)));
        }
        assert_eq!(db.count_webhooks_for_site(site_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_register_validates_events_and_limit() {
        let db = InMemoryDatabase::new();
        let site_id = Uuid::now_v7();
        let url = "https://hooks.example.com/push";

        let err = register_webhook(&db, site_id, url, vec![]).await.unwrap_err();
        assert!(matches!(err, WebhookError::NoEvents));

        let err = register_webhook(&db, site_id, url, vec!["order.paid".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::UnknownEvent(e) if e == "order.paid"));

        for _ in 0..MAX_WEBHOOKS_PER_SITE {
            let hook = register_webhook(&db, site_id, url, vec![CAMPAIGN_COMPLETED.into()])
                .await
                .unwrap();
            assert_eq!(hook.secret_token.len(), 64);
        }
        let err = register_webhook(&db, site_id, url, vec![CAMPAIGN_COMPLETED.into()])
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::LimitExceeded(10)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_stop_at_limit() {
        let db = Arc::new(InMemoryDatabase::new());
        let site_id = Uuid::now_v7();

        let tasks: Vec<_> = (0..MAX_WEBHOOKS_PER_SITE * 2)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move {
                    register_webhook(
                        db.as_ref(),
                        site_id,
                        &format!("https://hooks.example.com/{i}"),
                        vec![CAMPAIGN_COMPLETED.into()],
                    )
                    .await
                })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert!(matches!(e, WebhookError::LimitExceeded(10))),
            }
        }
        assert_eq!(accepted, MAX_WEBHOOKS_PER_SITE);
        assert_eq!(
            db.count_webhooks_for_site(site_id).await.unwrap(),
            MAX_WEBHOOKS_PER_SITE as i64
        );
    }
}
