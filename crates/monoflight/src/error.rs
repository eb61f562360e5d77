// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for task execution.

use flightline::SharedError;

/// The error type task bodies report failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error delivered to the waiters of a failed or cancelled execution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// The execution was cancelled by `clear_result`.
    #[error("execution cancelled by clear_result")]
    Cancelled,

    /// The task body failed and no retries remained.
    #[error("task failed after {attempts} attempt(s): {source}")]
    Failed {
        /// How many times the body was invoked.
        attempts: u32,
        /// The body's final error.
        source: SharedError,
    },

    /// The task was dropped before the outcome could be delivered.
    #[error("task dropped before the outcome was delivered")]
    Dropped,
}

impl TaskError {
    pub(crate) fn failed(attempts: u32, source: SharedError) -> Self {
        Self::Failed { attempts, source }
    }

    /// Returns how many body invocations were made, if this is a failure.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Failed { attempts, .. } => Some(*attempts),
            Self::Cancelled | Self::Dropped => None,
        }
    }

    /// Returns true if this is the cancellation error raised by
    /// `clear_result`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
