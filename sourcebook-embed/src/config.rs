//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an embedding provider.
///
/// The configuration serializes deterministically (serde field order), which
/// lets providers derive stable cache keys from it. All knobs have defaults
/// tuned for the `all-MiniLM-L6-v2` sentence-transformer running locally.
///
/// # Example
///
/// ```
/// use sourcebook_embed::EmbedConfig;
///
/// let config = EmbedConfig::default()
///     .with_batch_size(32)
///     .with_max_concurrent_batches(4);
/// assert_eq!(config.batch_size, 32);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedConfig {
    /// Name of the embedding model to load.
    pub model_name: String,
    /// Number of texts embedded per model call.
    pub batch_size: usize,
    /// Upper bound on batches running concurrently.
    pub max_concurrent_batches: usize,
    /// Per-batch deadline in seconds.
    pub batch_timeout_secs: u64,
    /// Capacity of the text-to-embedding cache, in entries.
    pub cache_capacity: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: "all-MiniLM-L6-v2".to_string(),
            batch_size: 16,
            max_concurrent_batches: 2,
            batch_timeout_secs: 60,
            cache_capacity: 1024,
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for a named model with all other knobs at defaults.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the number of texts per model call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the maximum number of concurrently running batches.
    pub fn with_max_concurrent_batches(mut self, max_concurrent_batches: usize) -> Self {
        self.max_concurrent_batches = max_concurrent_batches;
        self
    }

    /// Set the per-batch deadline in seconds.
    pub fn with_batch_timeout_secs(mut self, batch_timeout_secs: u64) -> Self {
        self.batch_timeout_secs = batch_timeout_secs;
        self
    }

    /// Set the embedding cache capacity in entries.
    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    /// The model name this configuration targets.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The per-batch deadline as a [`Duration`].
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    /// Check that the configuration can actually drive a provider.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.is_empty() {
            return Err(EmbedError::invalid_config("model_name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be nonzero"));
        }
        if self.max_concurrent_batches == 0 {
            return Err(EmbedError::invalid_config(
                "max_concurrent_batches must be nonzero",
            ));
        }
        if self.batch_timeout_secs == 0 {
            return Err(EmbedError::invalid_config(
                "batch_timeout_secs must be nonzero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EmbedConfig::default();
        assert_eq!(config.model_name, "all-MiniLM-L6-v2");
        assert_eq!(config.batch_size, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = EmbedConfig::new("bge-small-en-v1.5")
            .with_batch_size(8)
            .with_max_concurrent_batches(4)
            .with_batch_timeout_secs(10)
            .with_cache_capacity(64);
        assert_eq!(config.model_name(), "bge-small-en-v1.5");
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.max_concurrent_batches, 4);
        assert_eq!(config.batch_timeout(), Duration::from_secs(10));
        assert_eq!(config.cache_capacity, 64);
    }

    #[test]
    fn zero_knobs_are_rejected() {
        assert!(EmbedConfig::default().with_batch_size(0).validate().is_err());
        assert!(
            EmbedConfig::default()
                .with_max_concurrent_batches(0)
                .validate()
                .is_err()
        );
        assert!(
            EmbedConfig::default()
                .with_batch_timeout_secs(0)
                .validate()
                .is_err()
        );
        assert!(EmbedConfig::new("").validate().is_err());
    }
}
