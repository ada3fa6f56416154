#![forbid(unsafe_code)]

//! Slice ranges for bulk assignment and deletion.
//!
//! A [`SliceRange`] has an optional start, an optional stop and a positive
//! step. It is resolved against the current length of a sequence: missing
//! bounds default to the ends, and bounds past the end are clamped instead
//! of rejected. A range whose stop lies before its start selects nothing but
//! keeps its start, which is where a contiguous assignment will insert.

use std::iter::StepBy;
use std::ops::{Range, RangeFrom, RangeFull, RangeInclusive, RangeTo};

use crate::error::SeqError;

/// An unresolved `start:stop:step` selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRange {
    start: Option<usize>,
    stop: Option<usize>,
    step: usize,
}

impl SliceRange {
    /// Select `start..stop` with step 1.
    #[must_use]
    pub fn new(start: usize, stop: usize) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// Select the whole sequence.
    #[must_use]
    pub fn full() -> Self {
        Self {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// Use a different step. A step of zero is rejected on resolution.
    #[must_use]
    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    /// The configured step.
    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Resolve the range against a sequence of length `len`.
    ///
    /// # Errors
    ///
    /// Returns [`SeqError::ZeroStep`] if the step is zero.
    pub fn resolve(&self, len: usize) -> Result<ResolvedRange, SeqError> {
        if self.step == 0 {
            return Err(SeqError::ZeroStep);
        }
        let start = self.start.unwrap_or(0).min(len);
        let stop = self.stop.unwrap_or(len).min(len).max(start);
        Ok(ResolvedRange {
            start,
            stop,
            step: self.step,
        })
    }
}

impl Default for SliceRange {
    fn default() -> Self {
        Self::full()
    }
}

impl From<Range<usize>> for SliceRange {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl From<RangeInclusive<usize>> for SliceRange {
    fn from(range: RangeInclusive<usize>) -> Self {
        Self::new(*range.start(), range.end().saturating_add(1))
    }
}

impl From<RangeTo<usize>> for SliceRange {
    fn from(range: RangeTo<usize>) -> Self {
        Self {
            start: None,
            stop: Some(range.end),
            step: 1,
        }
    }
}

impl From<RangeFrom<usize>> for SliceRange {
    fn from(range: RangeFrom<usize>) -> Self {
        Self {
            start: Some(range.start),
            stop: None,
            step: 1,
        }
    }
}

impl From<RangeFull> for SliceRange {
    fn from(_: RangeFull) -> Self {
        Self::full()
    }
}

/// A [`SliceRange`] clamped to a concrete length.
///
/// Always satisfies `start <= stop <= len` and `step >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl ResolvedRange {
    /// Number of selected positions.
    #[must_use]
    pub fn len(&self) -> usize {
        (self.stop - self.start).div_ceil(self.step)
    }

    /// Whether no position is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Whether the range has step 1.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.step == 1
    }

    /// Selected positions in ascending order.
    pub fn indices(&self) -> StepBy<Range<usize>> {
        (self.start..self.stop).step_by(self.step)
    }
}
