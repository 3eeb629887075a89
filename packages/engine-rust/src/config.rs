use batchwise_core::{FallbackStrategy, RequestOptions};

/// Engine-level configuration.
///
/// Controls validation, chunking, fallback recovery, and the concurrency
/// and timeout limits applied to remote store calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Run the configured validator before submission.
    pub auto_validate: bool,
    /// Recovery policy for failed chunks.
    pub fallback_strategy: FallbackStrategy,
    /// Maximum operations per bulk call. Values below 1 are treated as 1.
    pub max_batch_size: usize,
    /// Apply the fallback strategy to failures. When false, first-attempt
    /// failures are final.
    pub retry_failed: bool,
    /// Timeout for each individual remote call in milliseconds.
    pub call_timeout_ms: u64,
    /// Upper bound on concurrently dispatched chunks within one group. The
    /// effective pool is also capped by the store's advertised budget.
    pub chunk_workers: usize,
    /// Maximum remote calls in flight across all groups.
    pub max_in_flight_calls: usize,
    /// Delay before a retry-batch attempt that follows a transient failure.
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_validate: true,
            fallback_strategy: FallbackStrategy::Individual,
            max_batch_size: 100,
            retry_failed: true,
            call_timeout_ms: 30_000,
            chunk_workers: 4,
            max_in_flight_calls: 16,
            retry_backoff_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Returns a copy with the request's explicit options applied.
    #[must_use]
    pub fn with_request(&self, options: &RequestOptions) -> Self {
        Self {
            auto_validate: options.auto_validate.unwrap_or(self.auto_validate),
            fallback_strategy: options
                .fallback_strategy
                .unwrap_or(self.fallback_strategy),
            max_batch_size: options.max_batch_size.unwrap_or(self.max_batch_size),
            retry_failed: options.retry_failed.unwrap_or(self.retry_failed),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.max_batch_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.auto_validate);
        assert_eq!(config.fallback_strategy, FallbackStrategy::Individual);
        assert_eq!(config.max_batch_size, 100);
        assert!(config.retry_failed);
        assert_eq!(config.call_timeout_ms, 30_000);
        assert_eq!(config.chunk_workers, 4);
        assert_eq!(config.max_in_flight_calls, 16);
    }

    #[test]
    fn request_options_override_only_what_they_set() {
        let base = EngineConfig {
            call_timeout_ms: 500,
            ..EngineConfig::default()
        };
        let options = RequestOptions {
            fallback_strategy: Some(FallbackStrategy::SkipFailed),
            max_batch_size: Some(10),
            ..RequestOptions::default()
        };

        let merged = base.with_request(&options);
        assert_eq!(merged.fallback_strategy, FallbackStrategy::SkipFailed);
        assert_eq!(merged.max_batch_size, 10);
        assert!(merged.auto_validate);
        assert!(merged.retry_failed);
        assert_eq!(merged.call_timeout_ms, 500);
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let config = EngineConfig {
            max_batch_size: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.effective_batch_size(), 1);
    }
}
