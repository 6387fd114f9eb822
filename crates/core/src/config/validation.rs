//! Configuration validation rules.
//!
//! Applied to `AppConfig` after it has been loaded from environment, files,
//! or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(invalid("base_url", "must be an http(s) URL"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_retries > 10 {
            return Err(invalid("max_retries", "must not exceed 10"));
        }

        if self.backoff_base_ms > 60_000 {
            return Err(invalid("backoff_base_ms", "must not exceed 60000ms"));
        }
        if self.backoff_jitter_ms > 60_000 {
            return Err(invalid("backoff_jitter_ms", "must not exceed 60000ms"));
        }

        if self.cache_ttl_secs == 0 {
            return Err(invalid("cache_ttl_secs", "must be greater than 0"));
        }
        if self.cache_ttl_secs > 7 * 24 * 60 * 60 {
            return Err(invalid("cache_ttl_secs", "must not exceed 7 days"));
        }

        if self.pool_concurrency == 0 || self.pool_concurrency > 32 {
            return Err(invalid("pool_concurrency", "must be between 1 and 32"));
        }

        if self.page_limit == 0 || self.page_limit > 100 {
            return Err(invalid("page_limit", "must be between 1 and 100"));
        }

        if !self.cache_enabled {
            tracing::debug!("response cache disabled; every query goes to the network");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<(), ConfigError>) -> Option<String> {
        match result {
            Err(ConfigError::Invalid { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_base_url_scheme() {
        let config = AppConfig { base_url: "ftp://pokeapi.co".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("base_url"));
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("timeout_ms"));

        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("timeout_ms"));
    }

    #[test]
    fn test_validate_max_retries() {
        let config = AppConfig { max_retries: 11, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("max_retries"));

        let config = AppConfig { max_retries: 0, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_pool_concurrency() {
        let config = AppConfig { pool_concurrency: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("pool_concurrency"));

        let config = AppConfig { pool_concurrency: 33, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("pool_concurrency"));
    }

    #[test]
    fn test_validate_page_limit_and_ttl() {
        let config = AppConfig { page_limit: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("page_limit"));

        let config = AppConfig { cache_ttl_secs: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("cache_ttl_secs"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("user_agent"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { timeout_ms: 100, pool_concurrency: 1, page_limit: 100, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
