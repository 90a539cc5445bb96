//! Error types for pipeline domain

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A validation error pinned to one or more field paths in the pipeline document.
///
/// Paths are built bottom-up: the innermost validator reports the offending
/// field and every caller prepends its own segment with [`via_field`] or
/// [`via_field_index`], yielding paths like `stages[0].steps[1].loop.variable`.
///
/// [`via_field`]: FieldError::via_field
/// [`via_field_index`]: FieldError::via_field_index
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FieldError {
    /// Human readable description of the problem.
    pub message: String,
    /// Field paths the error applies to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    /// Optional extra information.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl FieldError {
    /// Creates an error for a single field.
    pub fn new(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            paths: vec![path.into()],
            details: String::new(),
        }
    }

    /// Creates an error that is not tied to any particular field.
    pub fn without_path(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attaches details to the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// One or more required fields are missing.
    #[must_use]
    pub fn missing_field(fields: &[&str]) -> Self {
        Self {
            message: "missing field(s)".to_string(),
            paths: fields.iter().map(ToString::to_string).collect(),
            details: String::new(),
        }
    }

    /// None of a set of mutually exclusive fields is present.
    #[must_use]
    pub fn missing_one_of(fields: &[&str]) -> Self {
        Self {
            message: "expected exactly one, got neither".to_string(),
            paths: fields.iter().map(ToString::to_string).collect(),
            details: String::new(),
        }
    }

    /// More than one of a set of mutually exclusive fields is present.
    #[must_use]
    pub fn multiple_one_of(fields: &[&str]) -> Self {
        Self {
            message: "expected exactly one, got both".to_string(),
            paths: fields.iter().map(ToString::to_string).collect(),
            details: String::new(),
        }
    }

    /// Prefixes every path with `field`.
    #[must_use]
    pub fn via_field(mut self, field: &str) -> Self {
        self.paths = self
            .paths
            .into_iter()
            .map(|path| {
                if path.is_empty() {
                    field.to_string()
                } else if path.starts_with('[') {
                    format!("{field}{path}")
                } else {
                    format!("{field}.{path}")
                }
            })
            .collect();
        self
    }

    /// Prefixes every path with `[index]`.
    #[must_use]
    pub fn via_index(mut self, index: usize) -> Self {
        self.paths = self
            .paths
            .into_iter()
            .map(|path| {
                if path.is_empty() {
                    format!("[{index}]")
                } else if path.starts_with('[') {
                    format!("[{index}]{path}")
                } else {
                    format!("[{index}].{path}")
                }
            })
            .collect();
        self
    }

    /// Prefixes every path with `field[index]`.
    #[must_use]
    pub fn via_field_index(self, field: &str, index: usize) -> Self {
        self.via_index(index).via_field(field)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.paths.is_empty() {
            write!(f, "{}", self.message)?;
        } else {
            write!(f, "{}: {}", self.message, self.paths.join(", "))?;
        }
        if !self.details.is_empty() {
            write!(f, "\n{}", self.details)?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldError {}

/// Path-prefixing helpers on validation results.
pub trait FieldResultExt {
    /// See [`FieldError::via_field`].
    #[must_use]
    fn via_field(self, field: &str) -> Self;

    /// See [`FieldError::via_field_index`].
    #[must_use]
    fn via_field_index(self, field: &str, index: usize) -> Self;
}

impl<T> FieldResultExt for Result<T, FieldError> {
    fn via_field(self, field: &str) -> Self {
        self.map_err(|e| e.via_field(field))
    }

    fn via_field_index(self, field: &str, index: usize) -> Self {
        self.map_err(|e| e.via_field_index(field, index))
    }
}

/// A container merge that cannot be represented.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// An entry of a keyed list has no key, so it cannot be matched up.
    #[error("{list} entry is missing its merge key '{key}'")]
    MissingMergeKey {
        /// The list field, e.g. `env`.
        list: &'static str,
        /// The key used to match entries, e.g. `name`.
        key: &'static str,
    },

    /// A keyed list names the same key twice.
    #[error("{list} contains duplicate entries for '{value}'")]
    DuplicateMergeKey {
        /// The list field.
        list: &'static str,
        /// The repeated key value.
        value: String,
    },
}

/// Errors that abort a compile call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The pipeline document could not be decoded
    #[error("Failed to parse pipeline: {0}")]
    Parse(String),

    /// Structural validation failed, including stage name collisions
    #[error("Validation failed: {0}")]
    Validation(#[from] FieldError),

    /// The definition uses a feature this compiler does not implement
    #[error("{0}")]
    Unsupported(String),

    /// Two container configurations could not be merged
    #[error("Error merging {context}: {source}")]
    Merge {
        /// Which merge failed.
        context: String,
        /// Underlying merge problem.
        #[source]
        source: MergeError,
    },
}

impl CompileError {
    /// Creates an unsupported-feature error with a fixed message.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Wraps a merge failure with the name of the merge site.
    pub fn merge(context: impl Into<String>, source: MergeError) -> Self {
        Self::Merge {
            context: context.into(),
            source,
        }
    }

    /// Returns the field error if this is a validation failure.
    #[must_use]
    pub fn as_field_error(&self) -> Option<&FieldError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for CompileError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
