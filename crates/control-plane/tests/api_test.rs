// HTTP surface tests for the control plane
//
// The router runs in-process on the in-memory store; push services are replaced
// by an always-accepting transport.
//
// Run with: cargo test -p pushcast-control-plane --test api_test

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pushcast_control_plane::build_router;
use pushcast_schemas::{PushSubscription, NOTIFICATION_CLICKED};
use pushcast_storage::{
    generate_encryption_key, InMemoryDatabase, KeyVault, NewWebhook, StorageBackend,
    SubscriberDirectory, WebhookStore,
};
use pushcast_worker::{
    DispatchConfig, DispatchService, EngineContext, PushOutcome, PushTransport, SenderIdentity,
    WebhookNotifier,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct AcceptingTransport;

#[async_trait]
impl PushTransport for AcceptingTransport {
    async fn attempt(
        &self,
        _subscription: &PushSubscription,
        _sender: &SenderIdentity,
        _payload: &[u8],
    ) -> PushOutcome {
        PushOutcome::Delivered(201)
    }
}

struct TestApp {
    router: Router,
    db: Arc<InMemoryDatabase>,
}

fn test_app() -> TestApp {
    let db = Arc::new(InMemoryDatabase::new());
    let notifier = WebhookNotifier::new(db.clone(), Duration::from_secs(5)).unwrap();
    let ctx = EngineContext::new(
        StorageBackend::from_memory(db.clone()),
        KeyVault::new(&generate_encryption_key()).unwrap(),
        Arc::new(AcceptingTransport),
        notifier,
        DispatchConfig::default(),
    );
    let dispatch = Arc::new(DispatchService::new(ctx, None));

    TestApp {
        router: build_router(dispatch, Vec::new()),
        db,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        site_token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = site_token {
            builder = builder.header("X-Site-Token", token);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_site(&self) -> Value {
        let (status, site) = self
            .call(
                Method::POST,
                "/v1/sites",
                Some(json!({ "name": "Shop", "domain": "shop.example.com" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        site
    }

    async fn subscribe(&self, site: &Value, endpoint: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/subscribe",
            Some(json!({
                "site_id": site["id"],
                "endpoint": endpoint,
                "keys": { "p256dh": "p256dh", "auth": "auth" },
                "browser": "Firefox"
            })),
            site["sdk_token"].as_str(),
        )
        .await
    }

    async fn create_campaign(&self, site: &Value) -> Value {
        let (status, campaign) = self
            .call(
                Method::POST,
                "/v1/campaigns",
                Some(json!({
                    "site_id": site["id"],
                    "title": "Spring sale",
                    "body": "Everything 20% off",
                    "target_url": "https://shop.example.com/sale"
                })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        campaign
    }

    async fn wait_for_completion(&self, campaign_id: &str) -> Value {
        let uri = format!("/v1/campaigns/{campaign_id}");
        for _ in 0..500 {
            let (_, campaign) = self.call(Method::GET, &uri, None, None).await;
            if campaign["status"] == "completed" {
                return campaign;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("campaign {campaign_id} did not complete");
    }
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue"], "disabled");
    assert_eq!(body["dev_mode"], true);
}

#[tokio::test]
async fn test_create_site_returns_token_but_not_private_key() {
    let app = test_app();
    let site = app.create_site().await;

    assert_eq!(site["domain"], "shop.example.com");
    assert!(!site["vapid_public_key"].as_str().unwrap().is_empty());
    assert_eq!(site["sdk_token"].as_str().unwrap().len(), 64);
    assert!(site.get("vapid_private_key_enc").is_none());
}

#[tokio::test]
async fn test_campaign_lifecycle() {
    let app = test_app();
    let site = app.create_site().await;
    let (status, _) = app.subscribe(&site, "https://fcm.example.com/send/1").await;
    assert_eq!(status, StatusCode::CREATED);

    let campaign = app.create_campaign(&site).await;
    assert_eq!(campaign["status"], "draft");
    assert_eq!(campaign["click_through_rate"], "0.00%");
    let id = campaign["id"].as_str().unwrap().to_string();

    let (status, accepted) = app
        .call(Method::POST, &format!("/v1/campaigns/{id}/send"), None, None)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["strategy"], "inline");
    assert_eq!(accepted["targeted_count"], 1);

    let campaign = app.wait_for_completion(&id).await;
    assert_eq!(campaign["counters"]["delivered_count"], 1);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/track/click",
            Some(json!({ "campaign_id": id })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, campaign) = app
        .call(Method::GET, &format!("/v1/campaigns/{id}"), None, None)
        .await;
    assert_eq!(campaign["counters"]["clicked_count"], 1);
    assert_eq!(campaign["click_through_rate"], "100.00%");

    // Completed campaigns cannot be sent again
    let (status, body) = app
        .call(Method::POST, &format!("/v1/campaigns/{id}/send"), None, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_campaign_validation_and_not_found() {
    let app = test_app();
    let site = app.create_site().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/campaigns",
            Some(json!({
                "site_id": site["id"],
                "title": "",
                "body": "b",
                "target_url": "https://shop.example.com"
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert!(body["message"].as_str().unwrap().contains("title"));

    let missing = Uuid::now_v7();
    let (status, body) = app
        .call(Method::GET, &format!("/v1/campaigns/{missing}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = app
        .call(Method::POST, &format!("/v1/campaigns/{missing}/send"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/track/dismiss",
            Some(json!({ "campaign_id": missing })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_campaign() {
    let app = test_app();
    let site = app.create_site().await;
    let campaign = app.create_campaign(&site).await;
    let uri = format!("/v1/campaigns/{}", campaign["id"].as_str().unwrap());

    let (status, _) = app.call(Method::DELETE, &uri, None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_subscribe_requires_matching_site_token() {
    let app = test_app();
    let site = app.create_site().await;
    let body = json!({
        "site_id": site["id"],
        "endpoint": "https://fcm.example.com/send/1",
        "keys": { "p256dh": "p256dh", "auth": "auth" }
    });

    let (status, _) = app
        .call(Method::POST, "/api/subscribe", Some(body.clone()), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, err) = app
        .call(Method::POST, "/api/subscribe", Some(body), Some("wrong"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"], "unauthorized");

    // A valid token for another site does not work either
    let other = app.create_site().await;
    let (status, _) = app
        .call(
            Method::POST,
            "/api/subscribe",
            Some(json!({
                "site_id": site["id"],
                "endpoint": "https://fcm.example.com/send/1",
                "keys": { "p256dh": "p256dh", "auth": "auth" }
            })),
            other["sdk_token"].as_str(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_resubscribe_and_unsubscribe() {
    let app = test_app();
    let site = app.create_site().await;
    let endpoint = "https://fcm.example.com/send/abc";

    let (status, first) = app.subscribe(&site, endpoint).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["created"], true);

    let (status, second) = app.subscribe(&site, endpoint).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created"], false);
    assert_eq!(second["subscriber_id"], first["subscriber_id"]);

    let unsubscribe = json!({ "site_id": site["id"], "endpoint": endpoint });
    let (status, _) = app
        .call(
            Method::DELETE,
            "/api/subscribe",
            Some(unsubscribe.clone()),
            site["sdk_token"].as_str(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(
            Method::DELETE,
            "/api/subscribe",
            Some(unsubscribe),
            site["sdk_token"].as_str(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn subscriber_id(body: &Value) -> Uuid {
    body["subscriber_id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_subscribe_detects_browser_and_os_from_user_agent() {
    let app = test_app();
    let site = app.create_site().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/subscribe")
        .header("content-type", "application/json")
        .header("X-Site-Token", site["sdk_token"].as_str().unwrap())
        .header(
            "user-agent",
            "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        )
        .body(Body::from(
            json!({
                "site_id": site["id"],
                "endpoint": "https://updates.push.services.mozilla.com/wpush/v2/ua",
                "keys": { "p256dh": "p256dh", "auth": "auth" }
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED);

    let subscriber = app
        .db
        .get_subscriber(subscriber_id(&body))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscriber.browser.as_deref(), Some("Firefox"));
    assert_eq!(subscriber.os.as_deref(), Some("Linux"));
}

#[tokio::test]
async fn test_resubscribe_keeps_existing_tags() {
    let app = test_app();
    let site = app.create_site().await;
    let endpoint = "https://fcm.example.com/send/tagged";

    let (status, first) = app
        .call(
            Method::POST,
            "/api/subscribe",
            Some(json!({
                "site_id": site["id"],
                "endpoint": endpoint,
                "keys": { "p256dh": "p256dh", "auth": "auth" },
                "os": "Linux",
                "tags": { "plan": "pro" }
            })),
            site["sdk_token"].as_str(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Key refresh from the SDK, no profile or tags this time
    let (status, _) = app.subscribe(&site, endpoint).await;
    assert_eq!(status, StatusCode::OK);

    let subscriber = app
        .db
        .get_subscriber(subscriber_id(&first))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscriber.tags, json!({ "plan": "pro" }));
    assert_eq!(subscriber.os.as_deref(), Some("Linux"));
}

#[tokio::test]
async fn test_endpoint_of_another_site_is_a_conflict() {
    let app = test_app();
    let owner = app.create_site().await;
    let other = app.create_site().await;
    let endpoint = "https://fcm.example.com/send/shared";

    let (_, first) = app.subscribe(&owner, endpoint).await;
    let (status, body) = app.subscribe(&other, endpoint).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let subscriber = app
        .db
        .get_subscriber(subscriber_id(&first))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscriber.site_id.to_string(), owner["id"].as_str().unwrap());
}

#[tokio::test]
async fn test_subscriber_tags() {
    let app = test_app();
    let site = app.create_site().await;
    let token = site["sdk_token"].as_str();
    let endpoint = "https://fcm.example.com/send/tags";
    app.subscribe(&site, endpoint).await;

    let tags_body = |tags: Value| json!({ "site_id": site["id"], "endpoint": endpoint, "tags": tags });

    let (status, body) = app
        .call(
            Method::POST,
            "/api/subscriber/tags",
            Some(tags_body(json!({ "plan": "free", "lang": "en" }))),
            token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"], json!({ "plan": "free", "lang": "en" }));

    let (status, body) = app
        .call(
            Method::POST,
            "/api/subscriber/tags",
            Some(tags_body(json!({ "plan": "pro" }))),
            token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"], json!({ "plan": "pro", "lang": "en" }));

    for bad in [json!({ "bad-key": "x" }), json!({ "note": "x".repeat(256) })] {
        let (status, body) = app
            .call(Method::POST, "/api/subscriber/tags", Some(tags_body(bad)), token)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
    }

    let many: serde_json::Map<String, Value> =
        (0..99).map(|i| (format!("k{i}"), json!("v"))).collect();
    let (status, body) = app
        .call(
            Method::POST,
            "/api/subscriber/tags",
            Some(tags_body(Value::Object(many))),
            token,
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "tag_limit_exceeded");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/subscriber/tags",
            Some(json!({
                "site_id": site["id"],
                "endpoint": "https://fcm.example.com/send/unknown",
                "tags": { "plan": "pro" }
            })),
            token,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/subscriber/tags",
            Some(tags_body(json!({ "plan": "pro" }))),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_site_config_is_public() {
    let app = test_app();
    let site = app.create_site().await;

    let (status, config) = app
        .call(
            Method::GET,
            &format!("/api/site/{}/config", site["id"].as_str().unwrap()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["site_id"], site["id"]);
    assert_eq!(config["vapid_public_key"], site["vapid_public_key"]);
    assert_eq!(config["name"], "Shop");
    assert!(config.get("sdk_token").is_none());
    assert!(config.get("vapid_private_key_enc").is_none());

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/site/{}/config", Uuid::now_v7()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_registration() {
    let app = test_app();
    let site = app.create_site().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/webhooks",
            Some(json!({
                "site_id": site["id"],
                "target_url": "http://hooks.example.com/push",
                "events": ["campaign.completed"]
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, webhook) = app
        .call(
            Method::POST,
            "/v1/webhooks",
            Some(json!({
                "site_id": site["id"],
                "target_url": "https://hooks.example.com/push",
                "events": ["campaign.completed", "notification.clicked"]
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(webhook["secret_token"].as_str().unwrap().len(), 64);
    assert_eq!(webhook["is_active"], true);

    let (status, deliveries) = app
        .call(
            Method::GET,
            &format!("/v1/webhooks/{}/deliveries", webhook["id"].as_str().unwrap()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deliveries["data"], json!([]));

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/v1/webhooks/{}/deliveries", Uuid::now_v7()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            Method::POST,
            "/v1/webhooks",
            Some(json!({
                "site_id": Uuid::now_v7(),
                "target_url": "https://hooks.example.com/push",
                "events": ["campaign.completed"]
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_click_beacon_notifies_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("X-Push-Event", NOTIFICATION_CLICKED))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app();
    let site = app.create_site().await;
    let site_id: Uuid = site["id"].as_str().unwrap().parse().unwrap();
    // Plain-http mock target, so the webhook is stored directly
    let webhook = app
        .db
        .create_webhook(NewWebhook {
            site_id,
            target_url: server.uri(),
            events: vec![NOTIFICATION_CLICKED.to_string()],
            secret_token: "k".repeat(64),
        })
        .await
        .unwrap();

    let campaign = app.create_campaign(&site).await;
    let subscriber_id = Uuid::now_v7();
    let (status, _) = app
        .call(
            Method::POST,
            "/api/track/click",
            Some(json!({ "campaign_id": campaign["id"], "subscriber_id": subscriber_id })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let mut deliveries = Value::Null;
    for _ in 0..200 {
        let (_, body) = app
            .call(
                Method::GET,
                &format!("/v1/webhooks/{}/deliveries", webhook.id),
                None,
                None,
            )
            .await;
        if body["data"][0]["status"] == "success" {
            deliveries = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(deliveries["data"][0]["event_name"], NOTIFICATION_CLICKED);

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["data"]["subscriber_id"], subscriber_id.to_string());
}
