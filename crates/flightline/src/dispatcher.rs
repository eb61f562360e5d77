// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`Dispatcher`] enum for plugging in callback execution contexts.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// A boxed, sendable unit of work.
pub type BoxedTask = Box<dyn FnOnce() + Send>;

type DispatchFn = dyn Fn(BoxedTask) + Send + Sync;

/// An execution context for callbacks.
///
/// `Dispatcher` decides where a unit of work runs. Use the built-in variants
/// for common policies, or [`Dispatcher::new_custom`] to forward work to any
/// other executor.
///
/// # Examples
///
/// Inline execution (the default):
///
/// ```
/// use flightline::Dispatcher;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// let context = Dispatcher::Inline;
/// let ran = Arc::new(AtomicBool::new(false));
///
/// let flag = Arc::clone(&ran);
/// context.dispatch(move || flag.store(true, Ordering::SeqCst));
///
/// // Inline dispatch has completed by the time `dispatch` returns.
/// assert!(ran.load(Ordering::SeqCst));
/// ```
///
/// A serial queue backed by a worker thread:
///
/// ```
/// use flightline::Dispatcher;
/// use std::sync::mpsc;
///
/// let context = Dispatcher::new_serial();
/// let (tx, rx) = mpsc::channel();
/// context.dispatch(move || tx.send(42).unwrap());
/// assert_eq!(rx.recv().unwrap(), 42);
/// ```
///
/// A custom context:
///
/// ```
/// use flightline::Dispatcher;
///
/// let context = Dispatcher::new_custom(|task| {
///     std::thread::spawn(task);
/// });
/// context.dispatch(|| println!("running elsewhere"));
/// ```
#[derive(Debug, Clone, Default)]
pub enum Dispatcher {
    /// Runs each task immediately on the thread that dispatches it.
    ///
    /// This is the default, and the right choice for tests: everything a
    /// dispatching thread triggers has completed by the time `dispatch`
    /// returns.
    #[default]
    Inline,

    /// Runs tasks one at a time, in submission order, on a dedicated worker
    /// thread.
    ///
    /// Created via [`Dispatcher::new_serial`].
    Serial(SerialQueue),

    /// Custom dispatch function.
    ///
    /// Created via [`Dispatcher::new_custom`].
    Custom(CustomDispatcher),
}

impl Dispatcher {
    /// Creates a dispatcher backed by a new serial queue.
    ///
    /// The queue owns a worker thread that drains tasks in submission order.
    /// The worker exits once every clone of the dispatcher has been dropped
    /// and the queue is empty.
    #[must_use]
    pub fn new_serial() -> Self {
        Self::Serial(SerialQueue::new())
    }

    /// Creates a dispatcher from a custom dispatch function.
    ///
    /// The function receives each boxed task and is responsible for running
    /// it. Tasks must eventually run exactly once; a dispatch function that
    /// drops tasks will strand the waiters those tasks would have notified.
    pub fn new_custom<F>(f: F) -> Self
    where
        F: Fn(BoxedTask) + Send + Sync + 'static,
    {
        Self::Custom(CustomDispatcher(Arc::new(f)))
    }

    /// Dispatches a unit of work onto this context.
    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
        self.dispatch_boxed(Box::new(task));
    }

    /// Dispatches an already-boxed unit of work onto this context.
    pub fn dispatch_boxed(&self, task: BoxedTask) {
        match self {
            Self::Inline => task(),
            Self::Serial(queue) => queue.enqueue(task),
            Self::Custom(custom) => (custom.0)(task),
        }
    }

    /// Dispatches a unit of work onto this context after a delay.
    ///
    /// The delay is served by a detached sleeper thread, so the context
    /// itself is not occupied while waiting; an `Inline` dispatcher runs the
    /// task on the sleeper thread once the delay elapses.
    pub fn dispatch_after(&self, delay: Duration, task: impl FnOnce() + Send + 'static) {
        let context = self.clone();
        drop(thread::spawn(move || {
            thread::sleep(delay);
            context.dispatch_boxed(Box::new(task));
        }));
    }
}

/// A handle to a serial task queue backed by a dedicated worker thread.
///
/// Clones share the same queue and worker. Tasks run in submission order,
/// one at a time. A panicking task is contained; the worker keeps draining.
#[derive(Clone)]
pub struct SerialQueue {
    tx: mpsc::Sender<BoxedTask>,
}

impl SerialQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel::<BoxedTask>();
        let worker = thread::Builder::new()
            .name("flightline-serial".to_owned())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    // A panicking task must not take the queue down with it.
                    drop(catch_unwind(AssertUnwindSafe(task)));
                }
            })
            .expect("failed to spawn serial queue worker thread");
        drop(worker);
        Self { tx }
    }

    fn enqueue(&self, task: BoxedTask) {
        // The worker holds the receiver for as long as any sender exists,
        // so a send can only fail if the worker itself has died.
        drop(self.tx.send(task));
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue").finish_non_exhaustive()
    }
}

/// Internal wrapper for custom dispatch functions.
#[derive(Clone)]
pub struct CustomDispatcher(Arc<DispatchFn>);

impl std::fmt::Debug for CustomDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomDispatcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;

    #[test]
    fn inline_runs_on_calling_thread() {
        let context = Dispatcher::Inline;
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();

        context.dispatch(move || tx.send(thread::current().id()).unwrap());

        assert_eq!(rx.recv().unwrap(), caller);
    }

    #[test]
    fn inline_completes_before_dispatch_returns() {
        let context = Dispatcher::Inline;
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        context.dispatch(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn serial_preserves_submission_order() {
        let context = Dispatcher::new_serial();
        let (tx, rx) = mpsc::channel();

        for i in 0..100 {
            let tx = tx.clone();
            context.dispatch(move || tx.send(i).unwrap());
        }

        for i in 0..100 {
            assert_eq!(rx.recv().unwrap(), i);
        }
    }

    #[test]
    fn serial_runs_off_the_calling_thread() {
        let context = Dispatcher::new_serial();
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();

        context.dispatch(move || tx.send(thread::current().id()).unwrap());

        assert_ne!(rx.recv().unwrap(), caller);
    }

    #[test]
    fn serial_survives_a_panicking_task() {
        let context = Dispatcher::new_serial();
        let (tx, rx) = mpsc::channel();

        context.dispatch(|| panic!("intentional"));
        context.dispatch(move || tx.send(7).unwrap());

        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[test]
    fn serial_clones_share_one_worker() {
        let context = Dispatcher::new_serial();
        let clone = context.clone();
        let (tx, rx) = mpsc::channel();

        let tx2 = tx.clone();
        context.dispatch(move || tx.send(thread::current().id()).unwrap());
        clone.dispatch(move || tx2.send(thread::current().id()).unwrap());

        assert_eq!(rx.recv().unwrap(), rx.recv().unwrap());
    }

    #[test]
    fn custom_receives_every_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let context = Dispatcher::new_custom(move |task| {
            seen.fetch_add(1, Ordering::SeqCst);
            task();
        });

        context.dispatch(|| {});
        context.dispatch(|| {});

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dispatch_after_waits_at_least_the_delay() {
        let context = Dispatcher::Inline;
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();

        context.dispatch_after(Duration::from_millis(50), move || {
            tx.send(start.elapsed()).unwrap();
        });

        assert!(rx.recv().unwrap() >= Duration::from_millis(50));
    }

    #[test]
    fn dispatch_after_does_not_block_the_caller() {
        let context = Dispatcher::new_serial();
        let (tx, rx) = mpsc::channel();

        let tx_delayed = tx.clone();
        context.dispatch_after(Duration::from_millis(100), move || {
            tx_delayed.send("late").unwrap();
        });
        context.dispatch(move || tx.send("early").unwrap());

        assert_eq!(rx.recv().unwrap(), "early");
        assert_eq!(rx.recv().unwrap(), "late");
    }

    #[test]
    fn default_is_inline() {
        assert!(matches!(Dispatcher::default(), Dispatcher::Inline));
    }

    #[test]
    fn debug_impls() {
        assert!(format!("{:?}", Dispatcher::Inline).contains("Inline"));
        assert!(format!("{:?}", Dispatcher::new_serial()).contains("SerialQueue"));
        assert!(format!("{:?}", Dispatcher::new_custom(|t| t())).contains("CustomDispatcher"));
    }
}
