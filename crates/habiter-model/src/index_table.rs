#![forbid(unsafe_code)]

//! Ascending table of source indices backing a filtered view.
//!
//! Entry `k` holds the source position of the element shown at derived
//! position `k`. Every source change is translated into at most one derived
//! edit, and the table is shifted so it keeps pointing at the same source
//! elements.
//!
//! # Invariants
//!
//! 1. Entries are strictly increasing.
//! 2. The table length equals the derived length.
//! 3. After each `on_*` call the table lists exactly the source positions
//!    whose element satisfies the predicate, given that the caller reports
//!    inclusion truthfully.
//!
//! # Performance
//!
//! | Operation      | Complexity                         |
//! |----------------|------------------------------------|
//! | lookup         | O(log k) binary search             |
//! | insert/remove  | O(k) shift of the entries above    |
//! | rebuild        | O(n) over the source               |

use tracing::trace;

/// Derived-side edit produced by a source change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableEdit {
    /// Insert into the derived view at this position.
    Insert(usize),
    /// Update the derived view at this position.
    Update(usize),
    /// Remove from the derived view at this position.
    Remove(usize),
    /// The derived view is unaffected.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct IndexTable {
    entries: Vec<usize>,
}

impl IndexTable {
    /// Build the table from per-element inclusion flags in source order.
    pub(crate) fn from_inclusion(flags: impl IntoIterator<Item = bool>) -> Self {
        let entries = flags
            .into_iter()
            .enumerate()
            .filter_map(|(index, included)| included.then_some(index))
            .collect();
        Self { entries }
    }

    pub(crate) fn as_slice(&self) -> &[usize] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// First derived position whose source index is `>= index`.
    fn lower_bound(&self, index: usize) -> usize {
        self.entries.partition_point(|&entry| entry < index)
    }

    /// A source element was inserted at `index`.
    pub(crate) fn on_insert(&mut self, index: usize, included: bool) -> TableEdit {
        let pos = self.lower_bound(index);
        for entry in &mut self.entries[pos..] {
            *entry += 1;
        }
        if !included {
            trace!(index, shifted = self.entries.len() - pos, "filter skip insert");
            return TableEdit::Unchanged;
        }
        self.entries.insert(pos, index);
        trace!(index, pos, "filter insert");
        TableEdit::Insert(pos)
    }

    /// The source element at `index` was replaced.
    pub(crate) fn on_update(&mut self, index: usize, included: bool) -> TableEdit {
        match (self.entries.binary_search(&index), included) {
            (Ok(pos), true) => TableEdit::Update(pos),
            (Ok(pos), false) => {
                self.entries.remove(pos);
                trace!(index, pos, "filter drop on update");
                TableEdit::Remove(pos)
            }
            (Err(pos), true) => {
                self.entries.insert(pos, index);
                trace!(index, pos, "filter admit on update");
                TableEdit::Insert(pos)
            }
            (Err(_), false) => TableEdit::Unchanged,
        }
    }

    /// The source element at `index` was removed.
    pub(crate) fn on_remove(&mut self, index: usize) -> TableEdit {
        let (edit, above) = match self.entries.binary_search(&index) {
            Ok(pos) => {
                self.entries.remove(pos);
                (TableEdit::Remove(pos), pos)
            }
            Err(pos) => (TableEdit::Unchanged, pos),
        };
        for entry in &mut self.entries[above..] {
            *entry -= 1;
        }
        trace!(index, ?edit, "filter remove");
        edit
    }
}
