// Engine configuration
// Decision: Plain env vars with defaults, read once at startup (no config files)

use std::time::Duration;

/// Tunables of the dispatch engine.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Concurrent sends per inline batch
    pub batch_size: usize,
    /// Subscribers per page in the broadcast job
    pub page_size: i64,
    /// Concurrent `push.send` jobs per worker process
    pub send_concurrency: usize,
    /// Concurrent `campaign.broadcast` jobs per worker process
    pub broadcast_concurrency: usize,
    /// Whether the queue backend should be used at all
    pub queue_enabled: bool,
    /// Queue database, falls back to the store database
    pub queue_database_url: Option<String>,
    /// Reachability probe budget per send request
    pub queue_probe_timeout: Duration,
    /// Public base URL of the API, used for click tracking
    pub app_url: Option<String>,
    pub scheduler_interval: Duration,
    pub webhook_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            page_size: 500,
            send_concurrency: 50,
            broadcast_concurrency: 2,
            queue_enabled: false,
            queue_database_url: None,
            queue_probe_timeout: Duration::from_millis(2000),
            app_url: None,
            scheduler_interval: Duration::from_secs(30),
            webhook_timeout: Duration::from_millis(5000),
        }
    }
}

impl DispatchConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse("DISPATCH_BATCH_SIZE").unwrap_or(defaults.batch_size),
            page_size: env_parse("DISPATCH_PAGE_SIZE").unwrap_or(defaults.page_size),
            send_concurrency: env_parse("SEND_WORKER_CONCURRENCY")
                .unwrap_or(defaults.send_concurrency),
            broadcast_concurrency: env_parse("BROADCAST_WORKER_CONCURRENCY")
                .unwrap_or(defaults.broadcast_concurrency),
            queue_enabled: env_parse("QUEUE_ENABLED").unwrap_or(defaults.queue_enabled),
            queue_database_url: std::env::var("QUEUE_DATABASE_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .ok(),
            queue_probe_timeout: env_parse("QUEUE_PROBE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.queue_probe_timeout),
            app_url: std::env::var("APP_URL").ok(),
            scheduler_interval: env_parse("SCHEDULER_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.scheduler_interval),
            webhook_timeout: env_parse("WEBHOOK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.webhook_timeout),
        }
    }

    /// Get the app URL with default
    pub fn app_url(&self) -> String {
        self.app_url
            .clone()
            .unwrap_or_else(|| "http://localhost:3001".to_string())
    }

    /// Beacon endpoint the service worker reports clicks to.
    pub fn click_tracking_url(&self) -> String {
        format!("{}/api/track/click", self.app_url().trim_end_matches('/'))
    }

    /// Queue database URL, only when the queue is enabled.
    pub fn queue_url(&self) -> Option<&str> {
        if self.queue_enabled {
            self.queue_database_url.as_deref()
        } else {
            None
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.page_size, 500);
        assert_eq!(config.send_concurrency, 50);
        assert_eq!(config.broadcast_concurrency, 2);
        assert_eq!(config.webhook_timeout, Duration::from_secs(5));
        assert!(config.queue_url().is_none());
    }

    #[test]
    fn test_click_tracking_url() {
        let config = DispatchConfig {
            app_url: Some("https://push.example.com/".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.click_tracking_url(),
            "https://push.example.com/api/track/click"
        );
    }

    #[test]
    fn test_queue_url_requires_enabled() {
        let mut config = DispatchConfig {
            queue_database_url: Some("postgres://localhost/push".to_string()),
            ..Default::default()
        };
        assert!(config.queue_url().is_none());

        config.queue_enabled = true;
        assert_eq!(config.queue_url(), Some("postgres://localhost/push"));
    }
}
