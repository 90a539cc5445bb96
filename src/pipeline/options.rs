//! Pipeline and stage options
//!
//! Options shared by the pipeline root and stages (timeout, retry and
//! container overrides) plus the stage-only stash, unstash and workspace
//! settings.

use super::Validate;
use super::container::Container;
use super::errors::{FieldError, FieldResultExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Units accepted by [`Timeout`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutUnit {
    /// Seconds
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
    /// Days
    Days,
}

impl TimeoutUnit {
    /// All units, in the order they are listed in error messages
    pub const ALL: [Self; 4] = [Self::Seconds, Self::Minutes, Self::Hours, Self::Days];

    /// Lowercase name as written in pipeline files
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }

    /// Length of one unit in seconds
    #[must_use]
    pub fn seconds(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 24 * 60 * 60,
        }
    }
}

impl FromStr for TimeoutUnit {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|u| u.as_str() == s).ok_or_else(|| {
            let valid: Vec<&str> = Self::ALL.iter().map(|u| u.as_str()).collect();
            FieldError::new(
                format!(
                    "{s} is not a valid time unit. Valid time units are {}",
                    valid.join(", ")
                ),
                "unit",
            )
        })
    }
}

impl fmt::Display for TimeoutUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a pipeline or stage may run
///
/// The unit is kept as written so that an unknown unit is reported by
/// validation with its field path instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Timeout {
    /// Amount of `unit`
    pub time: i64,
    /// One of `seconds`, `minutes`, `hours` or `days`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

impl Timeout {
    /// Creates a timeout
    #[must_use]
    pub fn new(time: i64, unit: TimeoutUnit) -> Self {
        Self {
            time,
            unit: unit.as_str().to_string(),
        }
    }

    /// Converts to a [`Duration`], treating a missing unit as seconds
    ///
    /// # Errors
    ///
    /// Returns an error if the unit is unknown or the time is negative.
    pub fn to_duration(&self) -> Result<Duration, FieldError> {
        let unit = if self.unit.is_empty() {
            TimeoutUnit::Seconds
        } else {
            self.unit.parse()?
        };
        let time = u64::try_from(self.time)
            .map_err(|_| FieldError::new("Timeout must be greater than zero", "time"))?;
        Ok(Duration::from_secs(time.saturating_mul(unit.seconds())))
    }
}

impl Validate for Timeout {
    type Error = FieldError;

    fn validate(&self) -> Result<(), Self::Error> {
        self.unit.parse::<TimeoutUnit>()?;
        if self.time < 1 {
            return Err(FieldError::new("Timeout must be greater than zero", "time"));
        }
        Ok(())
    }
}

/// Options available on both the pipeline and its stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RootOptions {
    /// Overall timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,

    /// Number of retries
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry: i8,

    /// Container settings applied to every generated step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_options: Option<Container>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &i8) -> bool {
    *n == 0
}

impl Validate for RootOptions {
    type Error = FieldError;

    fn validate(&self) -> Result<(), Self::Error> {
        validate_root_options(
            self.timeout.as_ref(),
            self.retry,
            self.container_options.as_ref(),
        )
    }
}

/// Files saved for a later stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Stash {
    /// Stash name
    #[serde(default)]
    pub name: String,
    /// File pattern to stash
    #[serde(default)]
    pub files: String,
}

impl Validate for Stash {
    type Error = FieldError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.is_empty() {
            return Err(FieldError::new("The stash name must be provided", "name"));
        }
        if self.files.is_empty() {
            return Err(FieldError::new("files to stash must be provided", "files"));
        }
        Ok(())
    }
}

/// A stash restored into the stage workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Unstash {
    /// Stash name
    #[serde(default)]
    pub name: String,
    /// Directory to restore into
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dir: String,
}

impl Validate for Unstash {
    type Error = FieldError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.is_empty() {
            return Err(FieldError::new("The unstash name must be provided", "name"));
        }
        Ok(())
    }
}

/// Stage options: the root options plus stage-only settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StageOptions {
    /// Stage timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,

    /// Stage retries
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry: i8,

    /// Container settings for the stage's steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_options: Option<Container>,

    /// Files to stash after the stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stash: Option<Stash>,

    /// Stash to restore before the stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unstash: Option<Unstash>,

    /// Named workspace; `"empty"` means no upstream workspace is needed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

impl StageOptions {
    /// Sets the workspace name
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Sets the container overrides
    #[must_use]
    pub fn with_container_options(mut self, container: Container) -> Self {
        self.container_options = Some(container);
        self
    }
}

impl Validate for StageOptions {
    type Error = FieldError;

    fn validate(&self) -> Result<(), Self::Error> {
        if let Some(stash) = &self.stash {
            stash.validate().via_field("stash")?;
        }
        if let Some(unstash) = &self.unstash {
            unstash.validate().via_field("unstash")?;
        }
        if let Some(workspace) = &self.workspace
            && workspace.is_empty()
        {
            return Err(FieldError::new(
                "The workspace name must be unspecified or non-empty",
                "workspace",
            ));
        }
        validate_root_options(
            self.timeout.as_ref(),
            self.retry,
            self.container_options.as_ref(),
        )
    }
}

fn validate_root_options(
    timeout: Option<&Timeout>,
    retry: i8,
    container_options: Option<&Container>,
) -> Result<(), FieldError> {
    if let Some(timeout) = timeout {
        timeout.validate().via_field("timeout")?;
    }
    if retry < 0 {
        return Err(FieldError::new("Retry count cannot be negative", "retry"));
    }
    if let Some(container) = container_options {
        validate_container_options(container).via_field("containerOptions")?;
    }
    Ok(())
}

/// Rejects container fields that the compiler fills in itself.
fn validate_container_options(c: &Container) -> Result<(), FieldError> {
    let owned = [
        (!c.command.is_empty(), "Command", "command"),
        (!c.args.is_empty(), "Arguments", "args"),
        (!c.image.is_empty(), "Image", "image"),
        (!c.working_dir.is_empty(), "WorkingDir", "workingDir"),
        (!c.name.is_empty(), "Name", "name"),
        (c.stdin, "Stdin", "stdin"),
        (c.tty, "TTY", "tty"),
    ];
    match owned.into_iter().find(|(set, _, _)| *set) {
        Some((_, label, path)) => Err(FieldError::new(
            format!("{label} cannot be specified in containerOptions"),
            path,
        )),
        None => Ok(()),
    }
}
