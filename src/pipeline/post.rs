//! Post actions
//!
//! Post blocks parse so that pipelines carrying them can be loaded and
//! reported on, but the compiler rejects them.

#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// When a post block runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostCondition {
    /// Only after success
    Success,
    /// Only after failure
    Failure,
    /// Regardless of result
    Always,
}

impl fmt::Display for PostCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Always => write!(f, "always"),
        }
    }
}

/// A built-in action with its options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostAction {
    /// Action name
    pub name: String,

    /// Action options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// Actions run after a pipeline or stage when `condition` holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Post {
    /// Condition
    pub condition: PostCondition,

    /// Actions
    #[serde(default)]
    pub actions: Vec<PostAction>,
}

impl Post {
    /// Creates a post block with no actions
    pub fn new(condition: PostCondition) -> Self {
        Self {
            condition,
            actions: Vec::new(),
        }
    }
}
