#![forbid(unsafe_code)]

//! Deferred actions and a manually paced call queue.
//!
//! # Role in habiter
//! `habiter-sync` sequences effectful work, typically API requests, one
//! call at a time. Building a call and running it are separate: a
//! [`DeferredAction`] is assembled up front and executed later by a
//! [`CallQueue`], whose `due` and `done` lists are observable sequences
//! from `habiter-model`.
//!
//! # Primary responsibilities
//! - **DeferredAction**: ordered steps, first failure stops the chain,
//!   optional per-step error handlers, single invocation.
//! - **CallQueue**: idempotent calls wait in `due`; mutating calls settle
//!   directly in `done`; `perform_one` runs the oldest due call.
//! - **Request layer**: [`ApiCallFactory`] builds [`ApiCall`]s over a
//!   pluggable [`Transport`] and classifies them by HTTP method.
//! - **Configuration**: [`ApiConfig`] with environment overrides.
//!
//! Execution is synchronous and single-threaded; "deferred" refers only to
//! when an action runs, not how.
//!
//! # Example
//!
//! ```
//! use habiter_sync::{CallKind, CallQueue, DeferredAction, Performed, Step};
//!
//! let mut queue: CallQueue<i32, String> = CallQueue::new();
//! let read = DeferredAction::new("read counter", || Ok(20))
//!     .chain_action(Step::with_previous(|n| Ok(n + 1)));
//! queue.add(read, CallKind::Idempotent).unwrap();
//!
//! assert_eq!(queue.perform_one(), Ok(Performed::Completed(21)));
//! assert_eq!(queue.perform_one(), Ok(Performed::Idle));
//! assert_eq!(queue.done().len(), 1);
//! ```

pub mod action;
pub mod api;
pub mod config;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod queue;

pub use action::{ActionError, ActionStatus, DeferredAction, Step};
pub use api::{ApiCall, ApiCallFactory, ApiError, ApiRequest, ApiResponse, Method, Transport};
pub use config::ApiConfig;
pub use queue::{CallKind, CallQueue, Performed, QueueError, QueuedCall};
