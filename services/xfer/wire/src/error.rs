//! Wire protocol error types.

use thiserror::Error;

/// Payload encoding and decoding errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Payload could not be serialized
    #[error("si payload encode failed")]
    Encode,

    /// Payload bytes are not a stream initiation element
    #[error("si payload decode failed: {0}")]
    Decode(String),
}

/// Ways a peer response can miss the submit form shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormShapeError {
    /// Form type is not `submit`
    #[error("form type {0:?} is not submit")]
    WrongType(String),

    /// Form does not carry exactly one field
    #[error("expected exactly one field, got {0}")]
    FieldCount(usize),

    /// The single field is not the stream method field
    #[error("unexpected field {0:?}")]
    WrongField(String),

    /// The stream method field does not carry exactly one value
    #[error("expected exactly one selected value, got {0}")]
    ValueCount(usize),
}
