//! API configuration.

use std::time::Duration;

/// Default ffmpeg timeout in seconds.
pub const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 1800;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Timeout for requests other than processing
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Upper bound on one ffmpeg run, `None` for unbounded
    pub transcode_timeout: Option<Duration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB
            environment: "development".to_string(),
            transcode_timeout: Some(Duration::from_secs(DEFAULT_TRANSCODE_TIMEOUT_SECS)),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            request_timeout: std::env::var("REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            transcode_timeout: parse_transcode_timeout(
                std::env::var("TRANSCODE_TIMEOUT_SECS").ok().as_deref(),
            ),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// `0` disables the timeout; missing or unparsable values use the default.
fn parse_transcode_timeout(value: Option<&str>) -> Option<Duration> {
    match value.and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => Some(Duration::from_secs(DEFAULT_TRANSCODE_TIMEOUT_SECS)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_transcode_timeout() {
        assert_eq!(
            parse_transcode_timeout(None),
            Some(Duration::from_secs(DEFAULT_TRANSCODE_TIMEOUT_SECS))
        );
        assert_eq!(parse_transcode_timeout(Some("0")), None);
        assert_eq!(
            parse_transcode_timeout(Some("90")),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            parse_transcode_timeout(Some("soon")),
            Some(Duration::from_secs(DEFAULT_TRANSCODE_TIMEOUT_SECS))
        );
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("PORT", "8080");
        std::env::set_var("ENVIRONMENT", "Production");
        std::env::remove_var("API_HOST");
        std::env::remove_var("TRANSCODE_TIMEOUT_SECS");

        let config = ApiConfig::from_env();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(config.is_production());

        std::env::remove_var("PORT");
        std::env::remove_var("ENVIRONMENT");

        let config = ApiConfig::from_env();
        assert_eq!(config.port, 3000);
        assert!(!config.is_production());
    }
}
