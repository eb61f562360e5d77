// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Single-task coalescing executor with retries, TTL result caching, and
//! cancellable clear-result semantics.
//!
//! [`MonoTask`] wraps one logical unit of work:
//!
//! - Concurrent `execute` calls share a single invocation of the body;
//!   every attached waiter receives the outcome exactly once, in
//!   attachment order, on a configurable callback context.
//! - Failures retry up to a configured count, with fixed or computed
//!   inter-attempt intervals ([`RetryPolicy`], [`RetryInterval`]).
//! - A successful result can be cached for a TTL and served without
//!   re-invoking the body until it expires.
//! - [`clear_result`](MonoTask::clear_result) discards cached state, with
//!   a [`ClearStrategy`] governing in-flight work: let it complete
//!   (uncached), cancel it, or restart it.
//!
//! # Example
//!
//! ```
//! use monoflight::{MonoTask, RetryInterval, RetryPolicy};
//! use std::time::Duration;
//!
//! futures::executor::block_on(async {
//!     let task = MonoTask::builder(|reply| {
//!         // Hand the reply to any thread; consume it exactly once.
//!         reply(Ok("ready".to_string()));
//!     })
//!     .retry(RetryPolicy::count(3, RetryInterval::fixed(Duration::from_millis(50))))
//!     .result_ttl(Duration::from_secs(30))
//!     .build();
//!
//!     assert_eq!(task.execute().await.unwrap(), "ready");
//! });
//! ```

mod error;
mod retry;
mod task;

pub use error::{BoxError, TaskError};
pub use retry::{IntervalFn, RetryInterval, RetryPolicy};
pub use task::{ClearStrategy, MonoTask, MonoTaskBuilder, TaskOutcome, TaskReply};

#[doc(inline)]
pub use flightline::{Dispatcher, SharedError};
