#![forbid(unsafe_code)]

//! Element-wise mapped view of an observable sequence.
//!
//! [`MappingProxy`] keeps `derived[i] == f(source[i])` for every position,
//! translating each source change into the same change on the derived
//! sequence. `f` runs once per inserted or updated element and once per
//! element of a reset; removals never call it.
//!
//! The proxy keeps no state besides the derived sequence, and the derived
//! sequence only changes while the source is delivering a change. A
//! subscriber of the mapped view that writes into the source is therefore
//! rejected by the source with [`SeqError::Reentrant`] before anything
//! moves.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use tracing::warn;

use crate::channel::{Change, Subscription};
use crate::error::SeqError;
use crate::sequence::{ObservableSeq, SeqView};

/// A derived sequence holding `f(x)` for every `x` of its source.
///
/// The proxy subscribes to the source without keeping it alive. Dropping
/// the proxy, or calling [`detach`](Self::detach), ends the subscription;
/// the derived view then keeps its last content.
pub struct MappingProxy<S, T> {
    derived: ObservableSeq<T>,
    subscription: Option<Subscription>,
    _source: PhantomData<fn(&S)>,
}

impl<S: 'static, T: 'static> MappingProxy<S, T> {
    /// Snapshot `source` through `map` and follow its changes from now on.
    pub fn new(source: &SeqView<S>, map: impl Fn(&S) -> T + 'static) -> Self {
        let initial: Vec<T> = source.with(|items| items.iter().map(&map).collect());
        let derived = ObservableSeq::from_vec(initial);
        let target = derived.clone();
        let subscription = source.subscribe(move |change| {
            if let Err(err) = apply(&target, &map, change) {
                warn!(%err, kind = ?change.kind(), "mapping proxy could not apply source change");
            }
        });
        Self {
            derived,
            subscription: Some(subscription),
            _source: PhantomData,
        }
    }
}

impl<S, T> MappingProxy<S, T> {
    /// Read-only handle to the mapped sequence.
    #[must_use]
    pub fn view(&self) -> SeqView<T> {
        self.derived.view()
    }

    /// Whether the proxy still follows its source.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Stop following the source.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

fn apply<S, T>(
    target: &ObservableSeq<T>,
    map: &impl Fn(&S) -> T,
    change: &Change<'_, S>,
) -> Result<(), SeqError> {
    match *change {
        Change::Insert { index, value } => target.insert(index, map(value)),
        Change::Update { index, value } => target.set(index, map(value)),
        Change::Remove { index } => target.remove(index).map(drop),
        Change::Reset { contents } => target.reset(contents.iter().map(map).collect()),
    }
}

impl<S, T> Deref for MappingProxy<S, T> {
    type Target = SeqView<T>;

    fn deref(&self) -> &SeqView<T> {
        &self.derived
    }
}

impl<S, T: fmt::Debug> fmt::Debug for MappingProxy<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingProxy")
            .field("derived", &self.derived)
            .field("attached", &self.is_attached())
            .finish()
    }
}
