// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for fetch operations.

use flightline::SharedError;

/// The error type data providers report failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error delivered to the waiters of a failed fetch.
///
/// One provider failure fans out to every waiter of the affected key (or
/// batch), so the underlying cause is held behind a clonable
/// [`SharedError`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The data provider failed and no retries remained.
    #[error("data provider failed after {attempts} attempt(s): {source}")]
    Provider {
        /// How many times the provider was invoked for this key or batch.
        attempts: u32,
        /// The provider's final error.
        source: SharedError,
    },

    /// The fetcher was dropped before the outcome could be delivered.
    #[error("fetcher dropped before the outcome was delivered")]
    Dropped,
}

impl FetchError {
    pub(crate) fn provider(attempts: u32, source: SharedError) -> Self {
        Self::Provider { attempts, source }
    }

    /// Returns how many provider attempts were made, if this is a provider
    /// failure.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Provider { attempts, .. } => Some(*attempts),
            Self::Dropped => None,
        }
    }
}

/// An invalid fetcher configuration, rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No data provider was configured.
    #[error("a data provider is required")]
    MissingProvider,

    /// `max_concurrency` was zero.
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    /// A multifetch provider was configured with `max_batch == 0`.
    #[error("multifetch max_batch must be at least 1")]
    ZeroBatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_reports_attempts() {
        let error = FetchError::provider(3, SharedError::new("boom"));
        assert_eq!(error.attempts(), Some(3));
        assert_eq!(error.to_string(), "data provider failed after 3 attempt(s): boom");
    }

    #[test]
    fn dropped_has_no_attempts() {
        assert_eq!(FetchError::Dropped.attempts(), None);
    }

    #[test]
    fn clones_share_the_cause() {
        let error = FetchError::provider(1, SharedError::new("boom"));
        let clone = error.clone();
        assert_eq!(error.to_string(), clone.to_string());
    }

    #[test]
    fn config_errors_display() {
        assert_eq!(ConfigError::ZeroConcurrency.to_string(), "max_concurrency must be at least 1");
        assert_eq!(ConfigError::ZeroBatch.to_string(), "multifetch max_batch must be at least 1");
    }
}
