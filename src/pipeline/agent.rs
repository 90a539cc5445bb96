//! Agent configuration
//!
//! An agent names where a stage runs: either a node `label` or a container
//! `image`. Stages inherit the agent of their parent when they declare none.

use super::Validate;
use super::errors::FieldError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a stage or step runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Agent {
    /// Node label or pod template name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Container image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Agent {
    /// Creates an agent that runs in the given image
    #[must_use]
    pub fn image(image: impl Into<String>) -> Self {
        Self {
            label: None,
            image: Some(image.into()),
        }
    }

    /// Creates an agent that runs on the given label
    #[must_use]
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            image: None,
        }
    }

    /// Returns true if neither label nor image is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.label_str().is_empty() && self.image_str().is_empty()
    }

    /// The image, or an empty string
    #[must_use]
    pub fn image_str(&self) -> &str {
        self.image.as_deref().unwrap_or_default()
    }

    /// The label, or an empty string
    #[must_use]
    pub fn label_str(&self) -> &str {
        self.label.as_deref().unwrap_or_default()
    }
}

impl Validate for Agent {
    type Error = FieldError;

    fn validate(&self) -> Result<(), Self::Error> {
        match (self.label_str().is_empty(), self.image_str().is_empty()) {
            (false, false) => Err(FieldError::multiple_one_of(&["label", "image"])),
            (true, true) => Err(FieldError::missing_one_of(&["label", "image"])),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.label, &self.image) {
            (_, Some(image)) if !image.is_empty() => write!(f, "image {image}"),
            (Some(label), _) if !label.is_empty() => write!(f, "label {label}"),
            _ => write!(f, "none"),
        }
    }
}
