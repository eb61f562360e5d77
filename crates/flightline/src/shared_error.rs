// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A clonable error wrapper for fan-out delivery.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// A cheaply clonable wrapper around a boxed error.
///
/// When one failure must be delivered to many waiters, the error is wrapped
/// once and a clone handed to each. The original error remains reachable
/// through [`Error::source`].
///
/// # Examples
///
/// ```
/// use flightline::SharedError;
///
/// let error = SharedError::new(std::io::Error::other("connection reset"));
/// let for_first_waiter = error.clone();
/// let for_second_waiter = error.clone();
///
/// assert_eq!(for_first_waiter.to_string(), for_second_waiter.to_string());
/// ```
#[derive(Clone)]
pub struct SharedError {
    inner: Arc<dyn Error + Send + Sync + 'static>,
}

impl SharedError {
    /// Wraps any error (or message) for shared delivery.
    pub fn new(cause: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self {
            inner: Arc::from(cause.into()),
        }
    }

    /// Returns a reference to the wrapped error.
    #[must_use]
    pub fn get_ref(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl Error for SharedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner.as_ref() as &(dyn Error + 'static))
    }
}

impl From<String> for SharedError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for SharedError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
