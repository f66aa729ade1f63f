use thiserror::Error;

use crate::field::FieldId;

/// Failures reported by a host field tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("unknown field {0}")]
    UnknownField(FieldId),

    #[error("field {0} is not a list")]
    NotAList(FieldId),

    #[error("field {0} does not hold a value")]
    NotAValue(FieldId),

    #[error("index {index} out of bounds for list {list} of length {len}")]
    IndexOutOfBounds {
        list: FieldId,
        index: usize,
        len: usize,
    },

    #[error("list {list} already holds the maximum of {max} items")]
    ListFull { list: FieldId, max: usize },

    #[error("field {field} expects {expected}")]
    InvalidValue {
        field: FieldId,
        expected: &'static str,
    },
}

/// Failures that prevent a synchronizer from attaching to a form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("required field '{path}' not found")]
    MissingField { path: String },

    #[error("field '{path}' is not a list")]
    NotAList { path: String },

    #[error(transparent)]
    Field(#[from] FieldError),
}
