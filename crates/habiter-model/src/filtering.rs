#![forbid(unsafe_code)]

//! Incrementally maintained filtered view of an observable sequence.
//!
//! [`FilteringProxy`] shows the subsequence of source elements that satisfy a
//! predicate, optionally passed through a mapping. It keeps an ascending
//! table of the source positions it shows and turns every source change into
//! at most one change of its own:
//!
//! | Source change | Derived change |
//! |---------------|----------------|
//! | insert, predicate holds | `Insert` at the translated position |
//! | insert, predicate fails | none (positions above are shifted) |
//! | update, shown, still holds | `Update` |
//! | update, shown, now fails | `Remove` |
//! | update, hidden, now holds | `Insert` |
//! | update, hidden, still fails | none |
//! | remove of a shown element | `Remove` (positions above are shifted) |
//! | remove of a hidden element | none (positions above are shifted) |
//! | reset | `Reset` |
//!
//! Replacing the predicate rebuilds the view from the current source content
//! with a single `Reset`.
//!
//! A source change that arrives while the view itself is delivering a change
//! (a view subscriber writing into the source during a `set_filter` reset)
//! cannot be applied. The proxy then leaves its table untouched, marks
//! itself stale, and rebuilds with a single `Reset` on the next source
//! change.
//!
//! # Invariants
//!
//! 1. After every individual source change the derived content equals
//!    `source.filter(predicate).map(f)`.
//! 2. `source_indices()` is strictly increasing and as long as the view,
//!    including after a change that could not be applied.
//! 3. The predicate runs once per inserted or updated element; the mapping
//!    runs only for elements that end up shown.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::channel::{Change, Subscription};
use crate::error::SeqError;
use crate::index_table::{IndexTable, TableEdit};
use crate::sequence::{ObservableSeq, SeqView, WeakSeqView};

type Predicate<S> = Rc<dyn Fn(&S) -> bool>;
type Mapping<S, T> = Rc<dyn Fn(&S) -> T>;

struct FilterState<S, T> {
    predicate: Predicate<S>,
    map: Mapping<S, T>,
    table: IndexTable,
    /// A source change was skipped; the next one triggers a rebuild.
    stale: bool,
}

impl<S, T> FilterState<S, T> {
    fn functions(&self) -> (Predicate<S>, Mapping<S, T>) {
        (Rc::clone(&self.predicate), Rc::clone(&self.map))
    }
}

/// Build the index table and the shown values for a source snapshot.
fn snapshot<S, T>(
    items: &[S],
    predicate: &dyn Fn(&S) -> bool,
    map: &dyn Fn(&S) -> T,
) -> (IndexTable, Vec<T>) {
    let table = IndexTable::from_inclusion(items.iter().map(predicate));
    let values = table.as_slice().iter().map(|&i| map(&items[i])).collect();
    (table, values)
}

/// A derived sequence holding the source elements that satisfy a predicate.
///
/// `T` defaults to the source element type, in which case shown elements are
/// clones of the source elements. Use [`with_mapping`](Self::with_mapping) to
/// filter and map in one stage.
pub struct FilteringProxy<S, T = S> {
    state: Rc<RefCell<FilterState<S, T>>>,
    derived: ObservableSeq<T>,
    source: WeakSeqView<S>,
    subscription: Option<Subscription>,
}

impl<S: Clone + 'static> FilteringProxy<S, S> {
    /// Show the elements of `source` for which `predicate` holds.
    pub fn new(source: &SeqView<S>, predicate: impl Fn(&S) -> bool + 'static) -> Self {
        Self::with_mapping(source, predicate, S::clone)
    }
}

impl<S: 'static, T: 'static> FilteringProxy<S, T> {
    /// Show `map(x)` for every element `x` of `source` for which
    /// `predicate` holds.
    pub fn with_mapping(
        source: &SeqView<S>,
        predicate: impl Fn(&S) -> bool + 'static,
        map: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let predicate: Predicate<S> = Rc::new(predicate);
        let map: Mapping<S, T> = Rc::new(map);
        let (table, values) = source.with(|items| snapshot(items, &*predicate, &*map));
        debug!(
            source_len = source.len(),
            shown = table.len(),
            "filtering proxy created"
        );

        let state = Rc::new(RefCell::new(FilterState {
            predicate,
            map,
            table,
            stale: false,
        }));
        let derived = ObservableSeq::from_vec(values);

        let subscription = {
            let state = Rc::clone(&state);
            let target = derived.clone();
            let upstream = source.downgrade();
            source.subscribe(move |change| {
                if let Err(err) = follow(&state, &target, &upstream, change) {
                    warn!(%err, kind = ?change.kind(), "filtering proxy could not apply source change");
                }
            })
        };

        Self {
            state,
            derived,
            source: source.downgrade(),
            subscription: Some(subscription),
        }
    }

    /// Replace the predicate and rebuild the view from the current source
    /// content with a single `Reset`.
    ///
    /// A source that no longer exists counts as empty.
    ///
    /// # Errors
    ///
    /// [`SeqError::Reentrant`] when called while the source or this view is
    /// delivering a change; the predicate is left untouched.
    pub fn set_filter(&self, predicate: impl Fn(&S) -> bool + 'static) -> Result<(), SeqError> {
        if self.derived.is_emitting() {
            return Err(SeqError::Reentrant);
        }
        let source = self.source.upgrade();
        if source.as_ref().is_some_and(SeqView::is_emitting) {
            return Err(SeqError::Reentrant);
        }

        let predicate: Predicate<S> = Rc::new(predicate);
        let map = Rc::clone(&self.state.borrow().map);
        let (table, values) = match &source {
            Some(source) => source.with(|items| snapshot(items, &*predicate, &*map)),
            None => (IndexTable::default(), Vec::new()),
        };
        debug!(shown = table.len(), "filter replaced");
        {
            let mut state = self.state.borrow_mut();
            state.predicate = predicate;
            state.table = table;
            state.stale = false;
        }
        self.derived.reset(values)
    }

    /// Source position of every shown element, ascending.
    #[must_use]
    pub fn source_indices(&self) -> Vec<usize> {
        self.state.borrow().table.as_slice().to_vec()
    }

    /// Whether `value` passes the current predicate.
    #[must_use]
    pub fn accepts(&self, value: &S) -> bool {
        let predicate = Rc::clone(&self.state.borrow().predicate);
        predicate(value)
    }
}

impl<S, T> FilteringProxy<S, T> {
    /// Read-only handle to the filtered sequence.
    #[must_use]
    pub fn view(&self) -> SeqView<T> {
        self.derived.view()
    }

    /// Whether the proxy still follows its source.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Stop following the source. The view keeps its last content.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

/// Translate one source change into the derived view.
///
/// The table is only edited once the derived write is known to be accepted.
fn follow<S, T>(
    state: &RefCell<FilterState<S, T>>,
    target: &ObservableSeq<T>,
    source: &WeakSeqView<S>,
    change: &Change<'_, S>,
) -> Result<(), SeqError> {
    if target.is_emitting() {
        state.borrow_mut().stale = true;
        return Err(SeqError::Reentrant);
    }
    let (predicate, map) = state.borrow().functions();
    if state.borrow().stale {
        // The source already contains `change`; a rebuild covers it.
        let (table, values) = match source.upgrade() {
            Some(source) => source.with(|items| snapshot(items, &*predicate, &*map)),
            None => (IndexTable::default(), Vec::new()),
        };
        debug!(shown = table.len(), "filtering proxy resynchronised");
        {
            let mut state = state.borrow_mut();
            state.table = table;
            state.stale = false;
        }
        return target.reset(values);
    }
    let (edit, value) = match *change {
        Change::Insert { index, value } => {
            let included = predicate(value);
            (state.borrow_mut().table.on_insert(index, included), Some(value))
        }
        Change::Update { index, value } => {
            let included = predicate(value);
            (state.borrow_mut().table.on_update(index, included), Some(value))
        }
        Change::Remove { index } => (state.borrow_mut().table.on_remove(index), None),
        Change::Reset { contents } => {
            let (table, values) = snapshot(contents, &*predicate, &*map);
            state.borrow_mut().table = table;
            return target.reset(values);
        }
    };

    match (edit, value) {
        (TableEdit::Insert(pos), Some(value)) => target.insert(pos, map(value)),
        (TableEdit::Update(pos), Some(value)) => target.set(pos, map(value)),
        (TableEdit::Remove(pos), _) => target.remove(pos).map(drop),
        _ => Ok(()),
    }
}

impl<S, T> Deref for FilteringProxy<S, T> {
    type Target = SeqView<T>;

    fn deref(&self) -> &SeqView<T> {
        &self.derived
    }
}

impl<S, T: fmt::Debug> fmt::Debug for FilteringProxy<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteringProxy")
            .field("derived", &self.derived)
            .field("source_indices", &self.state.borrow().table.as_slice())
            .field("attached", &self.is_attached())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
