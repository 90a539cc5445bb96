//! Core traits for the pipeline domain

use super::errors::FieldError;

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}

/// Result of validating a part of the pipeline document
pub type FieldResult = std::result::Result<(), FieldError>;
