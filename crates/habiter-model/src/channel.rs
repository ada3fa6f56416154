#![forbid(unsafe_code)]

//! Typed change channel shared by every observable sequence.
//!
//! # Design
//!
//! A sequence emits exactly one [`Change`] per mutation. The set of change
//! kinds is fixed at compile time, so a subscriber matches on an enum instead
//! of registering for named signals.
//!
//! Subscribers live in an explicit registry keyed by [`SubscriberId`]. The
//! [`Subscription`] guard returned by `subscribe` removes its entry when it
//! is dropped or when [`Subscription::unsubscribe`] is called; nothing relies
//! on weak callbacks being collected.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. A subscriber registered or removed while an event is being delivered
//!    takes effect from the next event on.
//! 3. The registry never holds an entry whose guard has been released.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// A single change emitted by an observable sequence.
///
/// Values are borrowed from the sequence's own storage; a subscriber that
/// wants to keep one must clone it.
#[derive(Debug)]
pub enum Change<'a, T> {
    /// `value` was inserted at `index`; later elements shifted right.
    Insert { index: usize, value: &'a T },
    /// The element at `index` was replaced by `value`.
    Update { index: usize, value: &'a T },
    /// The element at `index` was removed; later elements shifted left.
    Remove { index: usize },
    /// The whole content was replaced by `contents`.
    Reset { contents: &'a [T] },
}

impl<T> Change<'_, T> {
    /// The kind of this change, without its payload.
    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert { .. } => ChangeKind::Insert,
            Self::Update { .. } => ChangeKind::Update,
            Self::Remove { .. } => ChangeKind::Remove,
            Self::Reset { .. } => ChangeKind::Reset,
        }
    }

    /// The position this change applies to, or `None` for a reset.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match *self {
            Self::Insert { index, .. } | Self::Update { index, .. } | Self::Remove { index } => {
                Some(index)
            }
            Self::Reset { .. } => None,
        }
    }
}

impl<T: Clone> Change<'_, T> {
    /// Detach the change from the sequence storage.
    #[must_use]
    pub fn to_owned(&self) -> OwnedChange<T> {
        match *self {
            Self::Insert { index, value } => OwnedChange::Insert(index, value.clone()),
            Self::Update { index, value } => OwnedChange::Update(index, value.clone()),
            Self::Remove { index } => OwnedChange::Remove(index),
            Self::Reset { contents } => OwnedChange::Reset(contents.to_vec()),
        }
    }
}

/// Payload-free discriminant of a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Remove,
    Reset,
}

/// An owned copy of a [`Change`], convenient for recording event logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedChange<T> {
    Insert(usize, T),
    Update(usize, T),
    Remove(usize),
    Reset(Vec<T>),
}

/// Identifier of a registered subscriber, unique per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

type Callback<T> = Rc<dyn Fn(&Change<'_, T>)>;

/// Registry of subscriber callbacks for one sequence.
pub(crate) struct ChangeChannel<T> {
    slots: RefCell<Vec<(SubscriberId, Callback<T>)>>,
    next_id: Cell<u64>,
}

impl<T> Default for ChangeChannel<T> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<T> ChangeChannel<T> {
    pub(crate) fn register(&self, callback: Callback<T>) -> SubscriberId {
        let id = SubscriberId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.slots.borrow_mut().push((id, callback));
        id
    }

    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|(slot_id, _)| *slot_id != id);
        slots.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Deliver `change` to every subscriber registered at call time.
    pub(crate) fn emit(&self, change: &Change<'_, T>) {
        // Snapshot first: callbacks may subscribe or unsubscribe.
        let callbacks: Vec<Callback<T>> = self
            .slots
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for cb in &callbacks {
            cb(change);
        }
    }
}

/// Something a [`Subscription`] can detach itself from.
pub(crate) trait Detach {
    fn detach(&self, id: SubscriberId);
}

/// Guard for a registered subscriber.
///
/// Dropping the guard, or calling [`unsubscribe`](Self::unsubscribe),
/// removes the callback from the sequence's registry. The guard does not keep
/// the sequence alive.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriberId,
    owner: Option<Weak<dyn Detach>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, owner: Weak<dyn Detach>) -> Self {
        Self {
            id,
            owner: Some(owner),
        }
    }

    /// Identifier of the registered callback.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the callback is still registered with a live sequence.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|owner| owner.strong_count() > 0)
    }

    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(owner) = self.owner.take().and_then(|weak| weak.upgrade()) {
            owner.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
