// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Retry policy and inter-attempt intervals.

use std::sync::Arc;
use std::time::Duration;

type IntervalProxy = dyn Fn(u32) -> Duration + Send + Sync;

/// How a task handles body failures.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// A single attempt; the first failure is terminal. The default.
    #[default]
    Never,

    /// Up to `retries` additional attempts after a failure, separated by
    /// the configured interval.
    Count {
        /// The maximum number of retries (so up to `retries + 1` attempts
        /// in total).
        retries: u32,
        /// The gap between attempts.
        interval: RetryInterval,
    },
}

impl RetryPolicy {
    /// A single attempt, no retries.
    #[must_use]
    pub fn never() -> Self {
        Self::Never
    }

    /// Up to `retries` retries with the given inter-attempt interval.
    #[must_use]
    pub fn count(retries: u32, interval: RetryInterval) -> Self {
        Self::Count { retries, interval }
    }

    pub(crate) fn retries(&self) -> u32 {
        match self {
            Self::Never => 0,
            Self::Count { retries, .. } => *retries,
        }
    }

    /// The gap before the given retry (1-based: the first retry is 1).
    pub(crate) fn interval_before(&self, retry: u32) -> Duration {
        match self {
            Self::Never => Duration::ZERO,
            Self::Count { interval, .. } => interval.duration_for(retry),
        }
    }
}

/// The gap between a failed attempt and the next one.
#[derive(Debug, Clone)]
pub enum RetryInterval {
    /// The same gap before every retry.
    Fixed(Duration),

    /// A computed gap. Created via [`RetryInterval::from_fn`].
    Computed(IntervalFn),
}

impl RetryInterval {
    /// A fixed gap before every retry.
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self::Fixed(interval)
    }

    /// A gap computed per retry.
    ///
    /// The function receives the 1-based index of the retry being
    /// scheduled, so exponential backoff is
    /// `|retry| base * 2_u32.pow(retry - 1)`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::Computed(IntervalFn(Arc::new(f)))
    }

    pub(crate) fn duration_for(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed(interval) => *interval,
            Self::Computed(f) => (f.0)(retry),
        }
    }
}

/// Internal wrapper for computed interval functions.
#[derive(Clone)]
pub struct IntervalFn(Arc<IntervalProxy>);

impl std::fmt::Debug for IntervalFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalFn").finish_non_exhaustive()
    }
}
