// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The single-task coalescing executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flightline::{Dispatcher, SharedError};
use parking_lot::Mutex;

use crate::error::{BoxError, TaskError};
use crate::retry::RetryPolicy;

/// The completion callback handed to the task body.
///
/// Being `FnOnce`, a reply can only be consumed once; a double completion
/// is unrepresentable.
pub type TaskReply<V> = Box<dyn FnOnce(Result<V, BoxError>) + Send>;

/// The terminal outcome delivered to each waiter.
pub type TaskOutcome<V> = Result<V, TaskError>;

type TaskBody<V> = Arc<dyn Fn(TaskReply<V>) + Send + Sync>;
type TaskCallback<V> = Box<dyn FnOnce(TaskOutcome<V>) + Send>;

/// What happens to in-flight work when `clear_result` discards state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearStrategy {
    /// Forget any cached result. An in-flight execution keeps running and
    /// its waiters still receive the outcome, but the result is not
    /// cached. The default.
    #[default]
    AllowCompletion,

    /// Forget any cached result and cancel the in-flight execution: every
    /// attached waiter receives [`TaskError::Cancelled`] and the body's
    /// eventual reply is dropped.
    Cancel,

    /// [`Cancel`](Self::Cancel), then immediately start a fresh execution
    /// with an initially empty waiter set.
    Restart,
}

/// The task's lifecycle. One mutex guards the state and the generation
/// counter, so a terminal state is never observable without its data.
enum State<V> {
    Idle,
    Executing {
        attempt: u32,
        generation: u64,
        waiters: Vec<TaskCallback<V>>,
        cache_result: bool,
    },
    Cached {
        value: V,
        expires_at: Instant,
    },
}

struct StateCell<V> {
    state: State<V>,
    /// Bumped whenever a new execution starts. A reply or scheduled retry
    /// tagged with an older generation is dropped: the work it belonged to
    /// was cancelled or superseded.
    next_generation: u64,
}

struct TaskInner<V> {
    body: TaskBody<V>,
    retry: RetryPolicy,
    result_ttl: Duration,
    task_context: Dispatcher,
    callback_context: Dispatcher,
    cell: Mutex<StateCell<V>>,
}

/// A coalescing executor for one logical unit of work.
///
/// Concurrent `execute` calls share a single invocation of the body: the
/// first call starts it, later calls attach as waiters, and everyone
/// receives the same outcome in attachment order. A successful result can
/// be cached for [`result_ttl`](MonoTaskBuilder::result_ttl) and served
/// without re-invoking the body until it expires.
///
/// Cloning is cheap; clones share the same task.
///
/// # Examples
///
/// ```
/// use monoflight::MonoTask;
/// use std::time::Duration;
///
/// futures::executor::block_on(async {
///     let task = MonoTask::builder(|reply| reply(Ok(42)))
///         .result_ttl(Duration::from_secs(60))
///         .build();
///
///     assert_eq!(task.execute().await.unwrap(), 42);
///     // Served from the cached result; the body does not run again.
///     assert_eq!(task.execute().await.unwrap(), 42);
/// });
/// ```
pub struct MonoTask<V> {
    inner: Arc<TaskInner<V>>,
}

impl<V> Clone for MonoTask<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> MonoTask<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a builder around the task body.
    ///
    /// The body receives a reply it must eventually consume exactly once,
    /// from any thread. It runs on the configured
    /// [`task_context`](MonoTaskBuilder::task_context).
    pub fn builder<B>(body: B) -> MonoTaskBuilder<V>
    where
        B: Fn(TaskReply<V>) + Send + Sync + 'static,
    {
        MonoTaskBuilder {
            body: Arc::new(body),
            retry: RetryPolicy::default(),
            result_ttl: Duration::ZERO,
            task_context: Dispatcher::default(),
            callback_context: Dispatcher::default(),
        }
    }

    /// Executes the task, delivering the outcome to `callback`.
    ///
    /// If a live cached result exists it is delivered immediately without
    /// invoking the body. If an execution is in flight, the callback
    /// attaches as a waiter. Otherwise a fresh execution starts.
    pub fn execute_with<C>(&self, callback: C)
    where
        C: FnOnce(TaskOutcome<V>) + Send + 'static,
    {
        self.enqueue(Some(Box::new(callback)));
    }

    /// Executes the task without observing the outcome.
    pub fn execute_detached(&self) {
        self.enqueue(None);
    }

    /// Executes the task, suspending until the outcome is delivered.
    pub async fn execute(&self) -> TaskOutcome<V> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.execute_with(move |outcome| drop(tx.send(outcome)));
        rx.await.unwrap_or(Err(TaskError::Dropped))
    }

    /// Returns the cached result, if one exists and has not expired.
    #[must_use]
    pub fn current_result(&self) -> Option<V> {
        let cell = self.inner.cell.lock();
        match &cell.state {
            State::Cached { value, expires_at } if Instant::now() < *expires_at => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns true if an execution is currently in flight.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        matches!(self.inner.cell.lock().state, State::Executing { .. })
    }

    /// Discards any cached result, letting in-flight work complete
    /// (uncached). Shorthand for
    /// `clear_result_with(ClearStrategy::AllowCompletion)`.
    pub fn clear_result(&self) {
        self.clear_result_with(ClearStrategy::AllowCompletion);
    }

    /// Discards any cached result, handling in-flight work per `strategy`.
    ///
    /// A waiter that attaches *after* this call observes the next
    /// execution's outcome, never the cancellation.
    pub fn clear_result_with(&self, strategy: ClearStrategy) {
        let mut cancelled_waiters: Option<Vec<TaskCallback<V>>> = None;
        let mut restart_generation: Option<u64> = None;

        {
            let mut cell = self.inner.cell.lock();
            match strategy {
                ClearStrategy::AllowCompletion => match &mut cell.state {
                    State::Cached { .. } => cell.state = State::Idle,
                    State::Executing { cache_result, .. } => *cache_result = false,
                    State::Idle => {}
                },
                ClearStrategy::Cancel | ClearStrategy::Restart => {
                    if let State::Executing { waiters, .. } = &mut cell.state {
                        cancelled_waiters = Some(std::mem::take(waiters));
                    }
                    cell.state = State::Idle;
                    if strategy == ClearStrategy::Restart {
                        restart_generation = Some(cell.begin_execution(None));
                    }
                }
            }
        }

        if let Some(waiters) = cancelled_waiters {
            tracing::debug!(waiters = waiters.len(), "execution cancelled by clear_result");
            deliver(&self.inner, waiters, Err(TaskError::Cancelled));
        }
        if let Some(generation) = restart_generation {
            start_attempt(&self.inner, generation, 1, Duration::ZERO);
        }
    }

    fn enqueue(&self, callback: Option<TaskCallback<V>>) {
        let mut callback = callback;
        let mut cached_value: Option<V> = None;
        let mut started: Option<u64> = None;

        {
            let mut cell = self.inner.cell.lock();

            // An expired cached result is gone the moment anyone looks.
            if let State::Cached { expires_at, .. } = &cell.state
                && Instant::now() >= *expires_at
            {
                cell.state = State::Idle;
            }

            let mut start_fresh = false;
            match &mut cell.state {
                State::Cached { value, .. } => cached_value = Some(value.clone()),
                State::Executing { waiters, .. } => {
                    if let Some(callback) = callback.take() {
                        waiters.push(callback);
                    }
                }
                State::Idle => start_fresh = true,
            }
            if start_fresh {
                started = Some(cell.begin_execution(callback.take()));
            }
        }

        if let Some(value) = cached_value
            && let Some(callback) = callback.take()
        {
            self.inner.callback_context.dispatch(move || callback(Ok(value)));
        }
        if let Some(generation) = started {
            start_attempt(&self.inner, generation, 1, Duration::ZERO);
        }
    }
}

impl<V> StateCell<V> {
    /// Transitions to `Executing` for a fresh generation and returns it.
    fn begin_execution(&mut self, callback: Option<TaskCallback<V>>) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.state = State::Executing {
            attempt: 1,
            generation,
            waiters: callback.into_iter().collect(),
            cache_result: true,
        };
        generation
    }
}

/// Dispatches one body invocation on the task context, tagged with its
/// generation. A stale generation (cancelled or superseded execution) skips
/// the body entirely; a stale reply is dropped without a state transition.
fn start_attempt<V>(inner: &Arc<TaskInner<V>>, generation: u64, attempt: u32, delay: Duration)
where
    V: Clone + Send + Sync + 'static,
{
    let body = Arc::clone(&inner.body);
    let reply_inner = Arc::clone(inner);
    let reply: TaskReply<V> = Box::new(move |result| on_reply(&reply_inner, generation, attempt, result));

    let run_inner = Arc::clone(inner);
    let task = move || {
        let live = matches!(
            &run_inner.cell.lock().state,
            State::Executing { generation: current, .. } if *current == generation
        );
        if live {
            (body)(reply);
        }
    };

    if delay.is_zero() {
        inner.task_context.dispatch(task);
    } else {
        inner.task_context.dispatch_after(delay, task);
    }
}

fn on_reply<V>(inner: &Arc<TaskInner<V>>, generation: u64, attempt: u32, result: Result<V, BoxError>)
where
    V: Clone + Send + Sync + 'static,
{
    match result {
        Ok(value) => {
            let drained = {
                let mut cell = inner.cell.lock();
                match &mut cell.state {
                    State::Executing {
                        generation: current,
                        waiters,
                        cache_result,
                        ..
                    } if *current == generation => {
                        let cache_result = *cache_result;
                        let waiters = std::mem::take(waiters);
                        cell.state = if cache_result && !inner.result_ttl.is_zero() {
                            State::Cached {
                                value: value.clone(),
                                expires_at: Instant::now() + inner.result_ttl,
                            }
                        } else {
                            State::Idle
                        };
                        Some(waiters)
                    }
                    _ => None,
                }
            };
            if let Some(waiters) = drained {
                deliver(inner, waiters, Ok(value));
            }
        }
        Err(error) => {
            let mut retry_delay: Option<Duration> = None;
            let mut failed_waiters: Option<Vec<TaskCallback<V>>> = None;

            {
                let mut cell = inner.cell.lock();
                if let State::Executing {
                    generation: current,
                    attempt: recorded,
                    waiters,
                    ..
                } = &mut cell.state
                    && *current == generation
                {
                    if attempt <= inner.retry.retries() {
                        *recorded = attempt + 1;
                        retry_delay = Some(inner.retry.interval_before(attempt));
                    } else {
                        failed_waiters = Some(std::mem::take(waiters));
                        cell.state = State::Idle;
                    }
                }
            }

            if let Some(delay) = retry_delay {
                tracing::debug!(attempt, error = %error, "attempt failed, scheduling retry");
                start_attempt(inner, generation, attempt + 1, delay);
            } else if let Some(waiters) = failed_waiters {
                deliver(inner, waiters, Err(TaskError::failed(attempt, SharedError::new(error))));
            }
        }
    }
}

/// Drains one waiter set on the callback context as a single task, so
/// delivery order equals attachment order.
fn deliver<V>(inner: &Arc<TaskInner<V>>, waiters: Vec<TaskCallback<V>>, outcome: TaskOutcome<V>)
where
    V: Clone + Send + Sync + 'static,
{
    if waiters.is_empty() {
        return;
    }
    inner.callback_context.dispatch(move || {
        for waiter in waiters {
            waiter(outcome.clone());
        }
    });
}

/// Builder for configuring a [`MonoTask`].
pub struct MonoTaskBuilder<V> {
    body: TaskBody<V>,
    retry: RetryPolicy,
    result_ttl: Duration,
    task_context: Dispatcher,
    callback_context: Dispatcher,
}

impl<V> MonoTaskBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Sets the retry policy. Defaults to [`RetryPolicy::Never`].
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how long a successful result stays cached.
    ///
    /// Defaults to zero: results are delivered but not cached, and every
    /// idle `execute` runs the body again.
    #[must_use]
    pub fn result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    /// Sets the execution context the body runs on.
    ///
    /// Defaults to [`Dispatcher::Inline`].
    #[must_use]
    pub fn task_context(mut self, context: Dispatcher) -> Self {
        self.task_context = context;
        self
    }

    /// Sets the execution context waiter callbacks are delivered on.
    ///
    /// Defaults to [`Dispatcher::Inline`].
    #[must_use]
    pub fn callback_context(mut self, context: Dispatcher) -> Self {
        self.callback_context = context;
        self
    }

    /// Builds the task.
    #[must_use]
    pub fn build(self) -> MonoTask<V> {
        MonoTask {
            inner: Arc::new(TaskInner {
                body: self.body,
                retry: self.retry,
                result_ttl: self.result_ttl,
                task_context: self.task_context,
                callback_context: self.callback_context,
                cell: Mutex::new(StateCell {
                    state: State::Idle,
                    next_generation: 0,
                }),
            }),
        }
    }
}

impl<V> std::fmt::Debug for MonoTask<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = self.inner.cell.lock();
        let state = match &cell.state {
            State::Idle => "Idle".to_string(),
            State::Executing { attempt, .. } => format!("Executing(attempt {attempt})"),
            State::Cached { .. } => "Cached".to_string(),
        };
        f.debug_struct("MonoTask")
            .field("state", &state)
            .field("retry", &self.inner.retry)
            .field("result_ttl", &self.inner.result_ttl)
            .finish_non_exhaustive()
    }
}

impl<V> std::fmt::Debug for MonoTaskBuilder<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonoTaskBuilder")
            .field("retry", &self.retry)
            .field("result_ttl", &self.result_ttl)
            .finish_non_exhaustive()
    }
}
