// HTTP server configuration

use axum::http::HeaderValue;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Only needed when the dashboard is served from a different origin than the API
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            // Example: CORS_ALLOWED_ORIGINS="https://app.example.com,https://admin.example.com"
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Origins that parse as header values; malformed entries are dropped.
    pub fn cors_origins(&self) -> Vec<HeaderValue> {
        self.cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:3001");
        assert!(config.cors_origins().is_empty());
    }

    #[test]
    fn test_cors_origins_skip_malformed() {
        let config = ServerConfig {
            cors_allowed_origins: vec![
                "https://app.example.com".to_string(),
                "bad\norigin".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(config.cors_origins().len(), 1);
    }
}
