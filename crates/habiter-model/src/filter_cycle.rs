#![forbid(unsafe_code)]

//! Ring of named filters for a [`FilteringProxy`].
//!
//! A list view typically offers a handful of filters ("all", "due",
//! "done", ...) and a key that switches to the next one. [`FilterCycle`]
//! holds those filters with their labels, remembers the current one and
//! applies the next one to a proxy, wrapping around at the end.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::SeqError;
use crate::filtering::FilteringProxy;

/// A predicate with a display label.
pub struct NamedFilter<S> {
    label: String,
    predicate: Rc<dyn Fn(&S) -> bool>,
}

impl<S> Clone for NamedFilter<S> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            predicate: Rc::clone(&self.predicate),
        }
    }
}

impl<S: 'static> NamedFilter<S> {
    /// Create a filter named `label`.
    pub fn new(label: impl Into<String>, predicate: impl Fn(&S) -> bool + 'static) -> Self {
        Self {
            label: label.into(),
            predicate: Rc::new(predicate),
        }
    }

    /// A filter named `"all"` that accepts everything.
    #[must_use]
    pub fn all() -> Self {
        Self::new("all", |_| true)
    }

    /// The display label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate the predicate.
    #[must_use]
    pub fn accepts(&self, value: &S) -> bool {
        (self.predicate)(value)
    }
}

impl<S> fmt::Debug for NamedFilter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedFilter")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Cyclic list of named filters; never empty.
#[derive(Debug)]
pub struct FilterCycle<S> {
    filters: Vec<NamedFilter<S>>,
    current: usize,
}

impl<S: 'static> FilterCycle<S> {
    /// Start a cycle whose current filter is `first`.
    #[must_use]
    pub fn new(first: NamedFilter<S>) -> Self {
        Self {
            filters: vec![first],
            current: 0,
        }
    }

    /// Append another filter to the ring.
    #[must_use]
    pub fn with(mut self, filter: NamedFilter<S>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Number of filters in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the ring has no filters. A cycle is built from a first
    /// filter and only grows, so it is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// The filter currently selected.
    #[must_use]
    pub fn current(&self) -> &NamedFilter<S> {
        &self.filters[self.current]
    }

    /// Label of the current filter.
    #[must_use]
    pub fn current_label(&self) -> &str {
        self.current().label()
    }

    /// Apply the current filter to `proxy`.
    ///
    /// # Errors
    ///
    /// Propagates [`FilteringProxy::set_filter`] errors.
    pub fn apply<T: 'static>(&self, proxy: &FilteringProxy<S, T>) -> Result<(), SeqError> {
        let predicate = Rc::clone(&self.current().predicate);
        proxy.set_filter(move |value| predicate(value))
    }

    /// Move to the next filter (wrapping) and apply it to `proxy`.
    ///
    /// The selection only moves if the proxy accepted the new filter.
    ///
    /// # Errors
    ///
    /// Propagates [`FilteringProxy::set_filter`] errors.
    pub fn advance<T: 'static>(&mut self, proxy: &FilteringProxy<S, T>) -> Result<&str, SeqError> {
        let previous = self.current;
        self.current = (self.current + 1) % self.filters.len();
        if let Err(err) = self.apply(proxy) {
            self.current = previous;
            return Err(err);
        }
        debug!(label = self.current_label(), "switched list filter");
        Ok(self.current_label())
    }
}
