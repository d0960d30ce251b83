//! Error types for Trellis models.

use std::fmt;

/// The error type for recoverable model operations.
///
/// Fatal contract violations (constructing a model over an unregistered
/// type, indexing an array model out of range, touching the registry before
/// [`init_type_registry`](crate::init_type_registry)) panic instead; this
/// enum covers the failures a caller can meaningfully handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A value of the wrong dynamic type was written into a model.
    TypeMismatch {
        /// The type name the model was declared with.
        expected: &'static str,
        /// The type name of the rejected value.
        got: &'static str,
    },
    /// An absent value was written into a slot that requires one.
    NullNotAllowed {
        /// The type name of the slot that rejected the write.
        type_name: &'static str,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, got } => {
                write!(f, "Value type mismatch: expected {}, got {}", expected, got)
            }
            Self::NullNotAllowed { type_name } => {
                write!(f, "A value of type {} is required and cannot be absent", type_name)
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// A specialized `Result` type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
