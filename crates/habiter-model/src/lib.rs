#![forbid(unsafe_code)]

//! Reactive list models: observable sequences and derived views.
//!
//! # Role in habiter
//! `habiter-model` is the state layer of the client. Application data lives
//! in [`ObservableSeq`]s; presentation code never copies it but reads it
//! through derived views that stay consistent with their source one change
//! at a time.
//!
//! # Primary responsibilities
//! - **ObservableSeq**: ordered, shared, mutable sequence that emits a typed
//!   [`Change`] on every mutation.
//! - **MappingProxy**: `derived[i] == f(source[i])`, maintained per change.
//! - **FilteringProxy**: the subsequence of source elements satisfying a
//!   predicate, maintained per change by translating source positions.
//! - **FilterCycle**: named predicates that a view rotates through.
//!
//! # Architecture
//!
//! Everything here is single-threaded (`Rc` with interior mutability).
//! Change delivery is synchronous: a mutation returns only after every
//! subscriber, and every proxy downstream of it, has processed the change.
//! Proxies subscribe to their source without owning it and release their
//! subscription when dropped or detached. The subscription graph must stay
//! acyclic; a subscriber that writes back into the sequence it observes gets
//! [`SeqError::Reentrant`].
//!
//! # Example
//!
//! ```
//! use habiter_model::{FilteringProxy, MappingProxy, ObservableSeq};
//!
//! let tasks = ObservableSeq::from_vec(vec![3, 1, 4, 1, 5]);
//! let odd = FilteringProxy::new(&tasks, |x: &i32| x % 2 != 0);
//! let labels = MappingProxy::new(&odd, |x: &i32| format!("task {x}"));
//!
//! tasks.insert(0, 9).unwrap();
//! tasks.set(2, 8).unwrap();
//!
//! assert_eq!(odd.to_vec(), vec![9, 3, 1, 5]);
//! assert_eq!(labels.get(0).as_deref(), Some("task 9"));
//! ```

pub mod channel;
pub mod error;
pub mod filter_cycle;
pub mod filtering;
mod index_table;
pub mod mapping;
pub mod range;
pub mod sequence;

pub use channel::{Change, ChangeKind, OwnedChange, SubscriberId, Subscription};
pub use error::SeqError;
pub use filter_cycle::{FilterCycle, NamedFilter};
pub use filtering::FilteringProxy;
pub use mapping::MappingProxy;
pub use range::{ResolvedRange, SliceRange};
pub use sequence::{ObservableSeq, SeqView, SetPolicy};
