#![forbid(unsafe_code)]

//! Errors raised by observable sequence operations.
//!
//! Every variant is reported *before* any element is touched or any change
//! event is emitted, so a failed operation leaves the sequence exactly as it
//! was.

/// Errors from [`ObservableSeq`](crate::ObservableSeq) mutations and proxy
/// maintenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeqError {
    /// An index was outside the valid range for the operation.
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Length of the sequence when the operation was attempted.
        len: usize,
    },
    /// A strided slice assignment received a different number of values
    /// than the slice selects.
    LengthMismatch {
        /// Number of positions selected by the slice.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
    /// A slice range with a step of zero.
    ZeroStep,
    /// The sequence was mutated while it was still delivering a change
    /// event to its subscribers.
    Reentrant,
}

impl SeqError {
    /// Whether this error is a validation failure (bad index, bad slice)
    /// rather than a lifecycle violation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Reentrant)
    }
}

impl std::fmt::Display for SeqError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for sequence of length {len}")
            }
            Self::LengthMismatch { expected, actual } => write!(
                f,
                "attempt to assign {actual} values to an extended slice of size {expected}"
            ),
            Self::ZeroStep => write!(f, "slice step cannot be zero"),
            Self::Reentrant => write!(f, "sequence mutated while emitting a change event"),
        }
    }
}

impl std::error::Error for SeqError {}
