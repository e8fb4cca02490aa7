//! Configuration validation

use super::types::{Config, StoreKind};
use crate::{Error, Result};

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::InvalidConfig("database_url cannot be empty".to_string()));
        }

        if !(1..=256).contains(&self.worker.concurrency) {
            return Err(Error::InvalidConfig(
                "worker.concurrency must be 1-256".to_string(),
            ));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "worker.poll_interval_ms must be positive".to_string(),
            ));
        }

        if self.lock.ttl_ms < 1_000 {
            return Err(Error::InvalidConfig(
                "lock.ttl_ms must be at least 1000".to_string(),
            ));
        }
        if self.lock.extend_after_ms >= self.lock.ttl_ms {
            return Err(Error::InvalidConfig(
                "lock.extend_after_ms must be below lock.ttl_ms".to_string(),
            ));
        }
        if self.lock.factor == 0 {
            return Err(Error::InvalidConfig("lock.factor must be positive".to_string()));
        }
        if self.lock.max_delay_ms < self.lock.retry_delay_ms {
            return Err(Error::InvalidConfig(
                "lock.max_delay_ms must be at least lock.retry_delay_ms".to_string(),
            ));
        }

        if self.queue.attempts == 0 {
            return Err(Error::InvalidConfig("queue.attempts must be positive".to_string()));
        }

        if self.store.kind == StoreKind::Http
            && self
                .store
                .base_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(Error::InvalidConfig(
                "store.base_url is required when store.kind = \"http\"".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.worker.concurrency = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn extend_threshold_must_fit_in_ttl() {
        let mut config = Config::default();
        config.lock.extend_after_ms = config.lock.ttl_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn http_store_needs_base_url() {
        let mut config = Config::default();
        config.store.kind = StoreKind::Http;
        assert!(config.validate().is_err());

        config.store.base_url = Some("http://localhost:8080/documents".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut config = Config::default();
        config.queue.attempts = 0;
        let err = config.validate().err();
        assert!(err.is_some_and(|e| e.to_string().contains("queue.attempts")));
    }
}
