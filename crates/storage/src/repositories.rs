// Repository layer for PostgreSQL
// Decision: Runtime-checked queries (query_as + FromRow), no compile-time DATABASE_URL
// Decision: The delivered ledger is a unique partial index; inserts use ON CONFLICT DO NOTHING

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushcast_schemas::{
    Campaign, CampaignLog, CampaignStatus, Site, Subscriber, Webhook, WebhookDelivery,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::endpoint::hash_endpoint;
use crate::error::{StoreError, StoreResult};
use crate::models::*;
use crate::store::{CampaignStore, SiteStore, SubscriberDirectory, WebhookStore};

const SUBSCRIBER_COLUMNS: &str = "id, site_id, endpoint, endpoint_hash, p256dh, auth, browser, os, \
     country, tags, status, last_seen_at, created_at, updated_at";

const CAMPAIGN_COLUMNS: &str = "id, site_id, title, body, icon_url, badge_url, image_url, \
     target_url, segment_filters, status, targeted_count, sent_count, delivered_count, \
     failed_count, clicked_count, dismissed_count, scheduled_at, dispatched_at, completed_at, \
     created_at, updated_at";

const WEBHOOK_COLUMNS: &str = "id, site_id, target_url, events, is_active, secret_token, created_at";

const DELIVERY_COLUMNS: &str = "id, webhook_id, event_name, payload, http_status, response, \
     status, attempt, created_at, updated_at";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations.
    /// The job queue keeps its own migrations in the same history table.
    pub async fn migrate(&self) -> StoreResult<()> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))
    }
}

// ============================================
// Sites
// ============================================

#[async_trait]
impl SiteStore for Database {
    async fn create_site(&self, input: NewSite) -> StoreResult<Site> {
        let row = sqlx::query_as::<_, SiteRow>(
            r#"
            INSERT INTO sites (id, name, domain, vapid_public_key, vapid_private_key_enc, sdk_token, default_icon_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, domain, vapid_public_key, vapid_private_key_enc, sdk_token, default_icon_url, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.name)
        .bind(&input.domain)
        .bind(&input.vapid_public_key)
        .bind(&input.vapid_private_key_enc)
        .bind(&input.sdk_token)
        .bind(&input.default_icon_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_site(&self, id: Uuid) -> StoreResult<Option<Site>> {
        let row = sqlx::query_as::<_, SiteRow>(
            r#"
            SELECT id, name, domain, vapid_public_key, vapid_private_key_enc, sdk_token, default_icon_url, created_at
            FROM sites
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn get_site_by_token(&self, sdk_token: &str) -> StoreResult<Option<Site>> {
        let row = sqlx::query_as::<_, SiteRow>(
            r#"
            SELECT id, name, domain, vapid_public_key, vapid_private_key_enc, sdk_token, default_icon_url, created_at
            FROM sites
            WHERE sdk_token = $1
            "#,
        )
        .bind(sdk_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}

// ============================================
// Subscribers
// ============================================

#[async_trait]
impl SubscriberDirectory for Database {
    async fn upsert_subscriber(&self, input: NewSubscriber) -> StoreResult<(Subscriber, bool)> {
        // xmax = 0 only for a freshly inserted tuple
        let query = format!(
            r#"
            INSERT INTO subscribers (id, site_id, endpoint, endpoint_hash, p256dh, auth, browser, os, country, tags, status, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'active', NOW())
            ON CONFLICT (endpoint_hash) DO UPDATE SET
                p256dh = EXCLUDED.p256dh,
                auth = EXCLUDED.auth,
                status = 'active',
                last_seen_at = NOW(),
                updated_at = NOW()
            WHERE subscribers.site_id = EXCLUDED.site_id
            RETURNING {SUBSCRIBER_COLUMNS}, (xmax = 0) AS inserted
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::now_v7())
            .bind(input.site_id)
            .bind(&input.endpoint)
            .bind(hash_endpoint(&input.endpoint))
            .bind(&input.p256dh)
            .bind(&input.auth)
            .bind(&input.browser)
            .bind(&input.os)
            .bind(&input.country)
            .bind(&input.tags)
            .fetch_optional(&self.pool)
            .await?
            // No row back: the WHERE guard skipped the update, another site owns this endpoint
            .ok_or_else(|| {
                StoreError::Conflict("endpoint is registered to another site".to_string())
            })?;

        let inserted: bool = row.try_get("inserted")?;
        let row = SubscriberRow::from_row(&row)?;

        Ok((row.try_into()?, inserted))
    }

    async fn get_subscriber(&self, id: Uuid) -> StoreResult<Option<Subscriber>> {
        let query = format!("SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE id = $1");
        let row = sqlx::query_as::<_, SubscriberRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Subscriber::try_from).transpose()
    }

    async fn find_active_by_site(
        &self,
        site_id: Uuid,
        after: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<Subscriber>> {
        let query = format!(
            r#"
            SELECT {SUBSCRIBER_COLUMNS}
            FROM subscribers
            WHERE site_id = $1
              AND status = 'active'
              AND ($2::uuid IS NULL OR id > $2)
            ORDER BY id ASC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, SubscriberRow>(&query)
            .bind(site_id)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Subscriber::try_from).collect()
    }

    async fn count_active_by_site(&self, site_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscribers WHERE site_id = $1 AND status = 'active'",
        )
        .bind(site_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn update_last_seen(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE subscribers SET last_seen_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_subscribers(&self, ids: &[Uuid]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM subscribers WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_endpoint_hash(
        &self,
        site_id: Uuid,
        endpoint_hash: &str,
    ) -> StoreResult<Option<Subscriber>> {
        let query = format!(
            "DELETE FROM subscribers WHERE site_id = $1 AND endpoint_hash = $2 RETURNING {SUBSCRIBER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SubscriberRow>(&query)
            .bind(site_id)
            .bind(endpoint_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Subscriber::try_from).transpose()
    }

    async fn merge_tags(
        &self,
        site_id: Uuid,
        endpoint_hash: &str,
        tags: serde_json::Map<String, serde_json::Value>,
        max_tags: usize,
    ) -> StoreResult<TagMerge> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(Uuid, serde_json::Value)> = sqlx::query_as(
            "SELECT id, tags FROM subscribers WHERE site_id = $1 AND endpoint_hash = $2 FOR UPDATE",
        )
        .bind(site_id)
        .bind(endpoint_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id, existing)) = current else {
            tx.rollback().await?;
            return Ok(TagMerge::NotFound);
        };

        let mut merged = existing.as_object().cloned().unwrap_or_default();
        merged.extend(tags);
        if merged.len() > max_tags {
            tx.rollback().await?;
            return Ok(TagMerge::LimitExceeded(merged.len()));
        }

        let query = format!(
            "UPDATE subscribers SET tags = $2, updated_at = NOW() WHERE id = $1 RETURNING {SUBSCRIBER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SubscriberRow>(&query)
            .bind(id)
            .bind(serde_json::Value::Object(merged))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(TagMerge::Updated(row.try_into()?))
    }
}

// ============================================
// Campaigns
// ============================================

#[async_trait]
impl CampaignStore for Database {
    async fn create_campaign(&self, input: NewCampaign) -> StoreResult<Campaign> {
        let status = if input.scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };
        let query = format!(
            r#"
            INSERT INTO campaigns (id, site_id, title, body, icon_url, badge_url, image_url, target_url, segment_filters, status, scheduled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, CampaignRow>(&query)
            .bind(Uuid::now_v7())
            .bind(input.site_id)
            .bind(&input.title)
            .bind(&input.body)
            .bind(&input.icon_url)
            .bind(&input.badge_url)
            .bind(&input.image_url)
            .bind(&input.target_url)
            .bind(&input.segment_filters)
            .bind(status.as_str())
            .bind(input.scheduled_at)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn get_campaign(&self, id: Uuid) -> StoreResult<Option<Campaign>> {
        let query = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1");
        let row = sqlx::query_as::<_, CampaignRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Campaign::try_from).transpose()
    }

    async fn begin_dispatch(&self, id: Uuid) -> StoreResult<Option<Campaign>> {
        let query = format!(
            r#"
            UPDATE campaigns
            SET status = 'dispatching', dispatched_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('draft', 'scheduled')
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, CampaignRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Campaign::try_from).transpose()
    }

    async fn update_status(&self, id: Uuid, status: CampaignStatus) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = $2,
                completed_at = CASE WHEN $2 = 'completed' THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("campaign", id));
        }
        Ok(())
    }

    async fn set_targeted(&self, id: Uuid, targeted: i64) -> StoreResult<()> {
        sqlx::query("UPDATE campaigns SET targeted_count = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(targeted)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_progress(
        &self,
        id: Uuid,
        sent: i64,
        delivered: i64,
        failed: i64,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET sent_count = $2, delivered_count = $3, failed_count = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sent)
        .bind(delivered)
        .bind(failed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_counters(&self, id: Uuid, delta: CounterDelta) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET sent_count = sent_count + $2,
                delivered_count = delivered_count + $3,
                failed_count = failed_count + $4,
                clicked_count = clicked_count + $5,
                dismissed_count = dismissed_count + $6,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delta.sent)
        .bind(delta.delivered)
        .bind(delta.failed)
        .bind(delta.clicked)
        .bind(delta.dismissed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_campaign(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = $1 AND status <> 'dispatching'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM campaigns WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        if exists {
            Err(StoreError::Conflict(
                "campaign is currently dispatching".to_string(),
            ))
        } else {
            Err(StoreError::not_found("campaign", id))
        }
    }

    async fn list_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Campaign>> {
        let query = format!(
            r#"
            SELECT {CAMPAIGN_COLUMNS}
            FROM campaigns
            WHERE status = 'scheduled' AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, CampaignRow>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Campaign::try_from).collect()
    }

    async fn has_delivered(&self, campaign_id: Uuid, subscriber_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM campaign_logs
                WHERE campaign_id = $1 AND subscriber_id = $2 AND event_type = 'delivered'
            )
            "#,
        )
        .bind(campaign_id)
        .bind(subscriber_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn create_log(&self, input: NewCampaignLog) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO campaign_logs (id, campaign_id, subscriber_id, event_type, http_status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.campaign_id)
        .bind(input.subscriber_id)
        .bind(input.event_type.as_str())
        .bind(input.http_status)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_delivery(&self, input: NewCampaignLog) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO campaign_logs (id, campaign_id, subscriber_id, event_type, http_status)
            VALUES ($1, $2, $3, 'delivered', $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.campaign_id)
        .bind(input.subscriber_id)
        .bind(input.http_status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE campaigns SET delivered_count = delivered_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(input.campaign_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn record_unsubscribe(&self, input: NewCampaignLog) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO campaign_logs (id, campaign_id, subscriber_id, event_type, http_status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.campaign_id)
        .bind(input.subscriber_id)
        .bind(input.event_type.as_str())
        .bind(input.http_status)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE campaigns SET failed_count = failed_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(input.campaign_id)
        .execute(&mut *tx)
        .await?;

        if let Some(subscriber_id) = input.subscriber_id {
            sqlx::query("DELETE FROM subscribers WHERE id = $1")
                .bind(subscriber_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_logs(&self, campaign_id: Uuid) -> StoreResult<Vec<CampaignLog>> {
        let rows = sqlx::query_as::<_, CampaignLogRow>(
            r#"
            SELECT id, campaign_id, subscriber_id, event_type, http_status, created_at
            FROM campaign_logs
            WHERE campaign_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CampaignLog::try_from).collect()
    }
}

// ============================================
// Webhooks
// ============================================

#[async_trait]
impl WebhookStore for Database {
    async fn create_webhook(&self, input: NewWebhook) -> StoreResult<Webhook> {
        let query = format!(
            r#"
            INSERT INTO webhooks (id, site_id, target_url, events, secret_token)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {WEBHOOK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, WebhookRow>(&query)
            .bind(Uuid::now_v7())
            .bind(input.site_id)
            .bind(&input.target_url)
            .bind(&input.events)
            .bind(&input.secret_token)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn create_webhook_within_limit(
        &self,
        input: NewWebhook,
        max_per_site: i64,
    ) -> StoreResult<Option<Webhook>> {
        let mut tx = self.pool.begin().await?;

        // Site row lock serializes concurrent registrations for one site
        sqlx::query("SELECT id FROM sites WHERE id = $1 FOR UPDATE")
            .bind(input.site_id)
            .fetch_optional(&mut *tx)
            .await?;

        let query = format!(
            r#"
            INSERT INTO webhooks (id, site_id, target_url, events, secret_token)
            SELECT $1, $2, $3, $4, $5
            WHERE (SELECT count(*) FROM webhooks WHERE site_id = $2) < $6
            RETURNING {WEBHOOK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, WebhookRow>(&query)
            .bind(Uuid::now_v7())
            .bind(input.site_id)
            .bind(&input.target_url)
            .bind(&input.events)
            .bind(&input.secret_token)
            .bind(max_per_site)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.map(Into::into))
    }

    async fn get_webhook(&self, id: Uuid) -> StoreResult<Option<Webhook>> {
        let query = format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = $1");
        let row = sqlx::query_as::<_, WebhookRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn count_webhooks_for_site(&self, site_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhooks WHERE site_id = $1")
            .bind(site_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_active_by_site_and_event(
        &self,
        site_id: Uuid,
        event_name: &str,
    ) -> StoreResult<Vec<Webhook>> {
        let query = format!(
            r#"
            SELECT {WEBHOOK_COLUMNS}
            FROM webhooks
            WHERE site_id = $1 AND is_active AND $2 = ANY(events)
            "#
        );
        let rows = sqlx::query_as::<_, WebhookRow>(&query)
            .bind(site_id)
            .bind(event_name)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_delivery(&self, input: NewWebhookDelivery) -> StoreResult<WebhookDelivery> {
        let query = format!(
            r#"
            INSERT INTO webhook_deliveries (id, webhook_id, event_name, payload, status, attempt)
            VALUES ($1, $2, $3, $4, 'pending', 1)
            RETURNING {DELIVERY_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, WebhookDeliveryRow>(&query)
            .bind(Uuid::now_v7())
            .bind(input.webhook_id)
            .bind(&input.event_name)
            .bind(&input.payload)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn update_delivery(&self, id: Uuid, update: DeliveryUpdate) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = $2, attempt = $3, http_status = $4, response = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.attempt)
        .bind(update.http_status)
        .bind(&update.response)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("webhook delivery", id));
        }
        Ok(())
    }

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<WebhookDelivery>> {
        let query = format!("SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1");
        let row = sqlx::query_as::<_, WebhookDeliveryRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(WebhookDelivery::try_from).transpose()
    }

    async fn list_deliveries(
        &self,
        webhook_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<WebhookDelivery>> {
        let query = format!(
            r#"
            SELECT {DELIVERY_COLUMNS}
            FROM webhook_deliveries
            WHERE webhook_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, WebhookDeliveryRow>(&query)
            .bind(webhook_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(WebhookDelivery::try_from).collect()
    }
}
