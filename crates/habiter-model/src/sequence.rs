#![forbid(unsafe_code)]

//! Observable ordered sequence.
//!
//! # Design
//!
//! [`ObservableSeq<T>`] wraps a `Vec<T>` in shared, reference-counted
//! storage (`Rc<..>` with interior mutability). Every mutation applies to the
//! storage first and then synchronously emits one [`Change`] to all
//! subscribers before returning. Cloning an `ObservableSeq` yields a second
//! handle to the same storage.
//!
//! [`SeqView<T>`] is the read-and-subscribe half of the API. Proxies hand out
//! views of their derived sequences so that nothing but the proxy itself can
//! write to them. `ObservableSeq` dereferences to `SeqView`, so every read
//! method is available on both.
//!
//! # Invariants
//!
//! 1. Each primitive mutation (`insert`, `set`, `remove`, `reset`) emits
//!    exactly one change, after the storage reflects it.
//! 2. Validation (bounds, slice lengths, re-entrancy) happens before any
//!    element is touched; a failed operation leaves no trace.
//! 3. Changes are delivered in the order the mutations happened.
//! 4. Bulk operations are compositions of primitive mutations, so
//!    subscribers only ever need to handle the four change kinds.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Bad index | Index outside the sequence | `SeqError::IndexOutOfRange` |
//! | Strided length mismatch | `splice_assign` with step > 1 | `SeqError::LengthMismatch` |
//! | Zero step | `SliceRange` with step 0 | `SeqError::ZeroStep` |
//! | Re-entrant mutation | A subscriber mutates the sequence it is observing | `SeqError::Reentrant` |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::channel::{Change, ChangeChannel, Detach, SubscriberId, Subscription};
use crate::error::SeqError;
use crate::range::SliceRange;

/// What `set` does when the new value equals the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetPolicy {
    /// Always store the value and emit `Update`.
    #[default]
    Always,
    /// Skip both the store and the event when the values compare equal.
    SkipUnchanged,
}

/// Which change to emit once the storage has been mutated.
#[derive(Debug, Clone, Copy)]
enum Emitted {
    Insert(usize),
    Update(usize),
    Remove(usize),
    Reset,
}

pub(crate) struct SeqInner<T> {
    items: RefCell<Vec<T>>,
    channel: ChangeChannel<T>,
    emitting: Cell<bool>,
    /// Equality check used by `SetPolicy::SkipUnchanged`.
    unchanged: Option<fn(&T, &T) -> bool>,
}

impl<T> SeqInner<T> {
    fn ensure_idle(&self) -> Result<(), SeqError> {
        if self.emitting.get() {
            return Err(SeqError::Reentrant);
        }
        Ok(())
    }

    /// Deliver the change for a mutation that has just been stored.
    ///
    /// Insert and update positions are in bounds: the caller wrote the
    /// element there before releasing the storage.
    fn emit(&self, what: Emitted) {
        let items = self.items.borrow();
        let change = match what {
            Emitted::Insert(index) => Change::Insert {
                index,
                value: &items[index],
            },
            Emitted::Update(index) => Change::Update {
                index,
                value: &items[index],
            },
            Emitted::Remove(index) => Change::Remove { index },
            Emitted::Reset => Change::Reset {
                contents: items.as_slice(),
            },
        };
        let _guard = EmitGuard::enter(&self.emitting);
        self.channel.emit(&change);
    }
}

impl<T: 'static> Detach for SeqInner<T> {
    fn detach(&self, id: SubscriberId) {
        self.channel.remove(id);
    }
}

/// Marks a sequence as emitting for the lifetime of the guard.
struct EmitGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> EmitGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for EmitGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Read-only, subscribable handle to an observable sequence.
pub struct SeqView<T> {
    inner: Rc<SeqInner<T>>,
}

impl<T> Clone for SeqView<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> SeqView<T> {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// Whether the sequence has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Access the elements by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.items.borrow())
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.channel.len()
    }

    /// The policy applied by `set`.
    #[must_use]
    pub fn set_policy(&self) -> SetPolicy {
        if self.inner.unchanged.is_some() {
            SetPolicy::SkipUnchanged
        } else {
            SetPolicy::Always
        }
    }

    /// Whether this sequence is currently delivering a change.
    #[must_use]
    pub fn is_emitting(&self) -> bool {
        self.inner.emitting.get()
    }

    /// Whether two handles refer to the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakSeqView<T> {
        WeakSeqView {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: Clone> SeqView<T> {
    /// Clone of the element at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Clone of the whole content.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    /// Clone of the elements selected by `range`.
    ///
    /// # Errors
    ///
    /// Returns [`SeqError::ZeroStep`] for a zero step.
    pub fn slice(&self, range: impl Into<SliceRange>) -> Result<Vec<T>, SeqError> {
        let items = self.inner.items.borrow();
        let resolved = range.into().resolve(items.len())?;
        Ok(resolved.indices().map(|i| items[i].clone()).collect())
    }
}

impl<T: 'static> SeqView<T> {
    /// Register a callback for every change of this sequence.
    ///
    /// The callback runs synchronously inside the mutating call. It may read
    /// this sequence and mutate other sequences; mutating this one from the
    /// callback fails with [`SeqError::Reentrant`].
    pub fn subscribe(&self, callback: impl Fn(&Change<'_, T>) + 'static) -> Subscription {
        let id = self.inner.channel.register(Rc::new(callback));
        let as_dyn: Rc<dyn Detach> = self.inner.clone();
        Subscription::new(id, Rc::downgrade(&as_dyn))
    }
}

impl<T: fmt::Debug> fmt::Debug for SeqView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeqView")
            .field("items", &*self.inner.items.borrow())
            .field("subscriber_count", &self.inner.channel.len())
            .finish()
    }
}

/// Non-owning back-reference to a sequence.
pub(crate) struct WeakSeqView<T> {
    inner: Weak<SeqInner<T>>,
}

impl<T> WeakSeqView<T> {
    pub(crate) fn upgrade(&self) -> Option<SeqView<T>> {
        self.inner.upgrade().map(|inner| SeqView { inner })
    }
}

/// A shared, mutable, observable ordered sequence.
///
/// Cloning creates a new handle to the **same** sequence; both handles see
/// the same elements and share subscribers.
pub struct ObservableSeq<T> {
    view: SeqView<T>,
}

impl<T> Clone for ObservableSeq<T> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
        }
    }
}

impl<T> Default for ObservableSeq<T> {
    fn default() -> Self {
        Self::from_vec(Vec::new())
    }
}

impl<T> Deref for ObservableSeq<T> {
    type Target = SeqView<T>;

    fn deref(&self) -> &SeqView<T> {
        &self.view
    }
}

impl<T> From<Vec<T>> for ObservableSeq<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T> FromIterator<T> for ObservableSeq<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableSeq<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableSeq")
            .field("items", &*self.inner().items.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl<T> ObservableSeq<T> {
    /// Create an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sequence holding `items`, with [`SetPolicy::Always`].
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::build(items, None)
    }

    fn build(items: Vec<T>, unchanged: Option<fn(&T, &T) -> bool>) -> Self {
        Self {
            view: SeqView {
                inner: Rc::new(SeqInner {
                    items: RefCell::new(items),
                    channel: ChangeChannel::default(),
                    emitting: Cell::new(false),
                    unchanged,
                }),
            },
        }
    }

    fn inner(&self) -> &SeqInner<T> {
        &self.view.inner
    }

    /// A read-only handle to this sequence.
    #[must_use]
    pub fn view(&self) -> SeqView<T> {
        self.view.clone()
    }

    /// Insert `value` at `index`, shifting later elements right.
    ///
    /// # Errors
    ///
    /// [`SeqError::IndexOutOfRange`] unless `index <= len`;
    /// [`SeqError::Reentrant`] when called from one of this sequence's
    /// subscribers.
    pub fn insert(&self, index: usize, value: T) -> Result<(), SeqError> {
        let inner = self.inner();
        inner.ensure_idle()?;
        {
            let mut items = inner.items.borrow_mut();
            if index > items.len() {
                return Err(SeqError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value);
            trace!(index, len = items.len(), "sequence insert");
        }
        inner.emit(Emitted::Insert(index));
        Ok(())
    }

    /// Append `value` at the end.
    ///
    /// # Errors
    ///
    /// [`SeqError::Reentrant`] when called from one of this sequence's
    /// subscribers.
    pub fn push(&self, value: T) -> Result<(), SeqError> {
        self.insert(self.len(), value)
    }

    /// Append every value of `values`, one `Insert` each.
    ///
    /// # Errors
    ///
    /// [`SeqError::Reentrant`] when called from one of this sequence's
    /// subscribers.
    pub fn extend(&self, values: impl IntoIterator<Item = T>) -> Result<(), SeqError> {
        self.inner().ensure_idle()?;
        for value in values {
            self.push(value)?;
        }
        Ok(())
    }

    /// Replace the element at `index`.
    ///
    /// Under [`SetPolicy::SkipUnchanged`] an equal value is discarded and no
    /// event is emitted.
    ///
    /// # Errors
    ///
    /// [`SeqError::IndexOutOfRange`] unless `index < len`;
    /// [`SeqError::Reentrant`] when called from one of this sequence's
    /// subscribers.
    pub fn set(&self, index: usize, value: T) -> Result<(), SeqError> {
        let inner = self.inner();
        inner.ensure_idle()?;
        {
            let mut items = inner.items.borrow_mut();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(SeqError::IndexOutOfRange { index, len })?;
            if inner.unchanged.is_some_and(|same| same(slot, &value)) {
                trace!(index, "sequence set skipped, value unchanged");
                return Ok(());
            }
            *slot = value;
            trace!(index, len, "sequence set");
        }
        inner.emit(Emitted::Update(index));
        Ok(())
    }

    /// Remove and return the element at `index`, shifting later elements
    /// left.
    ///
    /// # Errors
    ///
    /// [`SeqError::IndexOutOfRange`] unless `index < len`;
    /// [`SeqError::Reentrant`] when called from one of this sequence's
    /// subscribers.
    pub fn remove(&self, index: usize) -> Result<T, SeqError> {
        let inner = self.inner();
        inner.ensure_idle()?;
        let removed = {
            let mut items = inner.items.borrow_mut();
            if index >= items.len() {
                return Err(SeqError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            let removed = items.remove(index);
            trace!(index, len = items.len(), "sequence remove");
            removed
        };
        inner.emit(Emitted::Remove(index));
        Ok(removed)
    }

    /// Replace the whole content, emitting a single `Reset`.
    ///
    /// # Errors
    ///
    /// [`SeqError::Reentrant`] when called from one of this sequence's
    /// subscribers.
    pub fn reset(&self, contents: Vec<T>) -> Result<(), SeqError> {
        let inner = self.inner();
        inner.ensure_idle()?;
        let len = contents.len();
        *inner.items.borrow_mut() = contents;
        debug!(len, "sequence reset");
        inner.emit(Emitted::Reset);
        Ok(())
    }

    /// Remove every element, emitting a single `Reset`.
    ///
    /// # Errors
    ///
    /// [`SeqError::Reentrant`] when called from one of this sequence's
    /// subscribers.
    pub fn clear(&self) -> Result<(), SeqError> {
        self.reset(Vec::new())
    }

    /// Generalized slice assignment.
    ///
    /// With a step other than 1, `values` must have exactly as many elements
    /// as the range selects, and each selected position is `set`.
    ///
    /// With step 1 the overlapping prefix is `set`; surplus values are
    /// inserted right after it in order; surplus positions are removed from
    /// the highest index down.
    ///
    /// # Errors
    ///
    /// [`SeqError::LengthMismatch`], [`SeqError::ZeroStep`] or
    /// [`SeqError::Reentrant`], always before anything is changed.
    pub fn splice_assign(
        &self,
        range: impl Into<SliceRange>,
        values: Vec<T>,
    ) -> Result<(), SeqError> {
        self.inner().ensure_idle()?;
        let resolved = range.into().resolve(self.len())?;
        let selected = resolved.len();

        if !resolved.is_contiguous() {
            if selected != values.len() {
                return Err(SeqError::LengthMismatch {
                    expected: selected,
                    actual: values.len(),
                });
            }
            debug!(
                start = resolved.start,
                step = resolved.step,
                count = selected,
                "strided slice assignment"
            );
            for (index, value) in resolved.indices().zip(values) {
                self.set(index, value)?;
            }
            return Ok(());
        }

        let start = resolved.start;
        let overlap = selected.min(values.len());
        debug!(
            start,
            replaced = selected,
            supplied = values.len(),
            "contiguous slice assignment"
        );
        let mut values = values.into_iter();
        for (offset, value) in values.by_ref().take(overlap).enumerate() {
            self.set(start + offset, value)?;
        }
        for (offset, value) in values.enumerate() {
            self.insert(start + overlap + offset, value)?;
        }
        for index in (start + overlap..start + selected).rev() {
            self.remove(index)?;
        }
        Ok(())
    }

    /// Remove every position selected by `range`, highest index first, one
    /// `Remove` each. Returns the number of removed elements.
    ///
    /// # Errors
    ///
    /// [`SeqError::ZeroStep`] or [`SeqError::Reentrant`], before anything
    /// is changed.
    pub fn delete_range(&self, range: impl Into<SliceRange>) -> Result<usize, SeqError> {
        self.inner().ensure_idle()?;
        let resolved = range.into().resolve(self.len())?;
        let doomed: Vec<usize> = resolved.indices().collect();
        debug!(
            start = resolved.start,
            step = resolved.step,
            count = doomed.len(),
            "slice deletion"
        );
        for &index in doomed.iter().rev() {
            self.remove(index)?;
        }
        Ok(doomed.len())
    }
}

impl<T: PartialEq> ObservableSeq<T> {
    /// Create a sequence with an explicit [`SetPolicy`].
    #[must_use]
    pub fn with_policy(items: Vec<T>, policy: SetPolicy) -> Self {
        let unchanged: Option<fn(&T, &T) -> bool> = match policy {
            SetPolicy::Always => None,
            SetPolicy::SkipUnchanged => Some(<T as PartialEq>::eq),
        };
        Self::build(items, unchanged)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
