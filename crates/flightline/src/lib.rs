// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pluggable execution contexts for callback-driven engines.
//!
//! This crate provides [`Dispatcher`], an abstraction over *where* a
//! callback runs. Engines that deliver results through user callbacks take a
//! `Dispatcher` at construction and route every delivery through it, so the
//! engine itself never hardcodes a threading policy.
//!
//! Three contexts are built in:
//!
//! - [`Dispatcher::Inline`] runs the task immediately on the calling thread.
//! - A serial queue (see [`Dispatcher::new_serial`]) runs tasks one at a
//!   time, in submission order, on a dedicated worker thread.
//! - A custom context (see [`Dispatcher::new_custom`]) forwards tasks to an
//!   arbitrary dispatch function, e.g. a thread pool or an async runtime.
//!
//! # Example
//!
//! ```
//! use flightline::Dispatcher;
//! use std::sync::mpsc;
//!
//! let queue = Dispatcher::new_serial();
//! let (tx, rx) = mpsc::channel();
//!
//! for i in 0..3 {
//!     let tx = tx.clone();
//!     queue.dispatch(move || tx.send(i).unwrap());
//! }
//!
//! assert_eq!(rx.recv().unwrap(), 0);
//! assert_eq!(rx.recv().unwrap(), 1);
//! assert_eq!(rx.recv().unwrap(), 2);
//! ```
//!
//! The crate also provides [`SharedError`], a cheaply clonable error wrapper
//! used when one failure has to be delivered to many waiters.

mod dispatcher;
mod shared_error;

pub use dispatcher::{BoxedTask, CustomDispatcher, Dispatcher, SerialQueue};
pub use shared_error::SharedError;
