// Push Transport
// Decision: One HTTP call per attempt, no internal retry (retries belong to the queue)
// Decision: Signing identity is a per-attempt parameter, never process-global state
//
// Payload encryption (RFC 8291) and the VAPID JWT (RFC 8292) come from the
// `web-push` crate; the HTTP request itself goes through a shared reqwest client.

use async_trait::async_trait;
use pushcast_schemas::{PushSubscription, Site};
use std::time::Duration;
use tracing::{debug, warn};
use web_push::{
    ContentEncoding, SubscriptionInfo, Urgency, VapidSignatureBuilder, WebPushMessageBuilder,
};

/// Time-to-live handed to push services (24h).
pub const PUSH_TTL_SECS: u32 = 86_400;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sender identity used to sign one push message.
#[derive(Clone)]
pub struct SenderIdentity {
    /// VAPID `sub` claim, e.g. `mailto:admin@example.com`
    pub subject: String,
    /// Base64url public key the browser subscribed with
    pub public_key: String,
    /// Base64url raw P-256 scalar (decrypted from the Key Vault)
    pub private_key: String,
}

impl SenderIdentity {
    pub fn for_site(site: &Site, private_key: String) -> Self {
        Self {
            subject: site.vapid_subject(),
            public_key: site.vapid_public_key.clone(),
            private_key,
        }
    }
}

impl std::fmt::Debug for SenderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderIdentity")
            .field("subject", &self.subject)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Accepted with this 2xx status
    Delivered(u16),
    /// 404/410: the push service will never accept this endpoint again
    PermanentFailure(u16),
    /// Any other non-2xx response, or no response at all
    TransientFailure(Option<u16>),
}

impl PushOutcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => PushOutcome::Delivered(status),
            404 | 410 => PushOutcome::PermanentFailure(status),
            other => PushOutcome::TransientFailure(Some(other)),
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            PushOutcome::Delivered(status) | PushOutcome::PermanentFailure(status) => Some(*status),
            PushOutcome::TransientFailure(status) => *status,
        }
    }
}

/// Performs a single push-protocol delivery attempt.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn attempt(
        &self,
        subscription: &PushSubscription,
        sender: &SenderIdentity,
        payload: &[u8],
    ) -> PushOutcome;
}

/// Standard Web Push transport.
#[derive(Clone)]
pub struct WebPushTransport {
    client: reqwest::Client,
}

impl WebPushTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request(
        &self,
        subscription: &PushSubscription,
        sender: &SenderIdentity,
        payload: &[u8],
    ) -> Result<reqwest::RequestBuilder, web_push::WebPushError> {
        let sub_info =
            SubscriptionInfo::new(&subscription.endpoint, &subscription.p256dh, &subscription.auth);

        let mut sig_builder = VapidSignatureBuilder::from_base64(&sender.private_key, &sub_info)?;
        sig_builder.add_claim("sub", sender.subject.as_str());
        let signature = sig_builder.build()?;

        let mut builder = WebPushMessageBuilder::new(&sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature);
        builder.set_ttl(PUSH_TTL_SECS);
        builder.set_urgency(Urgency::Normal);
        let message = builder.build()?;

        let mut request = self
            .client
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string());

        if let Some(urgency) = message.urgency {
            request = request.header("Urgency", urgency.to_string());
        }

        if let Some(push_payload) = message.payload {
            request = request
                .header("Content-Encoding", push_payload.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");

            for (key, value) in &push_payload.crypto_headers {
                request = request.header(*key, value.as_str());
            }

            request = request.body(push_payload.content);
        }

        Ok(request)
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn attempt(
        &self,
        subscription: &PushSubscription,
        sender: &SenderIdentity,
        payload: &[u8],
    ) -> PushOutcome {
        let request = match self.build_request(subscription, sender, payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, endpoint = %subscription.endpoint, "Failed to build push message");
                return PushOutcome::TransientFailure(None);
            }
        };

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let outcome = PushOutcome::from_status(status);
                if let PushOutcome::TransientFailure(_) = outcome {
                    let body = response.text().await.unwrap_or_default();
                    warn!(status, body = %body, endpoint = %subscription.endpoint, "Push delivery rejected");
                } else {
                    debug!(status, "Push delivery attempt finished");
                }
                outcome
            }
            Err(e) => {
                warn!(error = %e, endpoint = %subscription.endpoint, "Push delivery request failed");
                PushOutcome::TransientFailure(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use pushcast_storage::KeyVault;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn subscription(server: &MockServer, token: &str) -> PushSubscription {
        // Browser side of the ECDH exchange is just another P-256 keypair
        let browser = KeyVault::generate_keypair();
        PushSubscription {
            endpoint: format!("{}/push/{token}", server.uri()),
            p256dh: browser.public_key,
            auth: URL_SAFE_NO_PAD.encode([7u8; 16]),
        }
    }

    fn sender() -> SenderIdentity {
        let keys = KeyVault::generate_keypair();
        SenderIdentity {
            subject: "mailto:admin@shop.example.com".to_string(),
            public_key: keys.public_key,
            private_key: keys.private_key,
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(PushOutcome::from_status(201), PushOutcome::Delivered(201));
        assert_eq!(PushOutcome::from_status(404), PushOutcome::PermanentFailure(404));
        assert_eq!(PushOutcome::from_status(410), PushOutcome::PermanentFailure(410));
        assert_eq!(
            PushOutcome::from_status(429),
            PushOutcome::TransientFailure(Some(429))
        );
        assert_eq!(
            PushOutcome::from_status(500),
            PushOutcome::TransientFailure(Some(500))
        );
    }

    #[tokio::test]
    async fn test_delivers_signed_encrypted_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push/ok"))
            .and(header("ttl", "86400"))
            .and(header("content-encoding", "aes128gcm"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let transport = WebPushTransport::new().unwrap();
        let outcome = transport
            .attempt(&subscription(&server, "ok"), &sender(), br#"{"title":"hi"}"#)
            .await;

        assert_eq!(outcome, PushOutcome::Delivered(201));
    }

    #[tokio::test]
    async fn test_gone_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let transport = WebPushTransport::new().unwrap();
        let outcome = transport
            .attempt(&subscription(&server, "gone"), &sender(), b"{}")
            .await;

        assert_eq!(outcome, PushOutcome::PermanentFailure(410));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let transport = WebPushTransport::new().unwrap();
        let outcome = transport
            .attempt(&subscription(&server, "busy"), &sender(), b"{}")
            .await;

        assert_eq!(outcome, PushOutcome::TransientFailure(Some(503)));
    }

    #[tokio::test]
    async fn test_bad_subscription_keys_are_transient() {
        let server = MockServer::start().await;
        let mut sub = subscription(&server, "bad");
        sub.p256dh = "not-a-key".to_string();

        let transport = WebPushTransport::new().unwrap();
        let outcome = transport.attempt(&sub, &sender(), b"{}").await;

        assert_eq!(outcome, PushOutcome::TransientFailure(None));
    }
}
