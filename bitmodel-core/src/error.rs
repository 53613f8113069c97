use thiserror::Error;

/// Faults raised by [`crate::BitCursor`]
///
/// These are the only faults the open-ended repetition loops of `Array` and
/// `Sequence` are allowed to recover from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("Read past visible end: need {need} bits at bit {pos}, visible end is bit {end}")]
    OutOfBounds { pos: usize, need: usize, end: usize },

    #[error("Too many bits for a single integer read: {0}")]
    TooManyBits(usize),

    #[error("Bound past visible end: {pos} + {len} > {end}")]
    BoundPastEnd { pos: usize, len: usize, end: usize },

    #[error("Cannot rewind to bit {target} from bit {pos}")]
    Rewind { target: usize, pos: usize },
}

/// Main error type for element operations
///
/// Every variant except [`EltError::Cursor`] names the element and the
/// operation that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EltError {
    #[error("{elt}: {op}: invalid value: {detail}")]
    Type {
        elt: String,
        op: &'static str,
        detail: String,
    },

    #[error("{elt}: {op}: index {index} out of range (len {len})")]
    Index {
        elt: String,
        op: &'static str,
        index: usize,
        len: usize,
    },

    #[error("{elt}: {op}: {detail}")]
    Contract {
        elt: String,
        op: &'static str,
        detail: String,
    },

    #[error("{elt}: {op}: resolution failed: {detail}")]
    Resolution {
        elt: String,
        op: &'static str,
        detail: String,
    },

    #[error("{elt}: {op}: no alternative for selector {key}")]
    NoSelection {
        elt: String,
        op: &'static str,
        key: String,
    },

    #[error("Cursor error: {0}")]
    Cursor(#[from] CursorError),
}

impl EltError {
    pub fn type_error(elt: &str, op: &'static str, detail: impl Into<String>) -> Self {
        EltError::Type {
            elt: elt.to_string(),
            op,
            detail: detail.into(),
        }
    }

    pub fn index(elt: &str, op: &'static str, index: usize, len: usize) -> Self {
        EltError::Index {
            elt: elt.to_string(),
            op,
            index,
            len,
        }
    }

    pub fn contract(elt: &str, op: &'static str, detail: impl Into<String>) -> Self {
        EltError::Contract {
            elt: elt.to_string(),
            op,
            detail: detail.into(),
        }
    }

    pub fn resolution(elt: &str, op: &'static str, detail: impl Into<String>) -> Self {
        EltError::Resolution {
            elt: elt.to_string(),
            op,
            detail: detail.into(),
        }
    }

    /// True for faults coming from the bit cursor
    pub fn is_cursor(&self) -> bool {
        matches!(self, EltError::Cursor(_))
    }
}

/// Result type alias for element operations
pub type EltResult<T> = Result<T, EltError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_element_and_operation() {
        let err = EltError::contract("Items", "append", "count 3 reached");
        assert_eq!(err.to_string(), "Items: append: count 3 reached");
        assert!(!err.is_cursor());
    }

    #[test]
    fn test_cursor_error_conversion() {
        let err: EltError = CursorError::TooManyBits(65).into();
        assert!(err.is_cursor());
        assert_eq!(
            err.to_string(),
            "Cursor error: Too many bits for a single integer read: 65"
        );
    }
}
