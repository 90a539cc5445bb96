//! Step types for pipeline stages
//!
//! A step is exactly one of a shell `command`, a reference to a reusable
//! `step`, or a `loop` that repeats nested steps over a list of values.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::Validate;
use super::agent::Agent;
use super::container::EnvVar;
use super::errors::{FieldError, FieldResultExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single action inside a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Optional name, used for the generated container name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Shell command to run
    #[serde(default, alias = "sh", skip_serializing_if = "String::is_empty")]
    pub command: String,

    /// Arguments appended to `command`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Working directory, relative to the source checkout unless absolute
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dir: String,

    /// Name of a reusable step
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub step: String,

    /// Options passed to a reusable step
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,

    /// Repeats nested steps
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_: Option<Loop>,

    /// Agent override; only its image is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,

    /// Image override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Step-local environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// What a validated step does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind<'a> {
    /// Run a shell command with arguments
    Command {
        /// The command
        command: &'a str,
        /// Its arguments
        args: &'a [String],
    },
    /// Invoke a reusable step
    Reference(&'a str),
    /// Repeat nested steps
    Loop(&'a Loop),
}

impl Step {
    /// Creates a command step
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Creates a loop step
    pub fn looped(loop_: Loop) -> Self {
        Self {
            loop_: Some(loop_),
            ..Default::default()
        }
    }

    /// Creates a reusable-step reference
    pub fn reference(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            ..Default::default()
        }
    }

    /// Sets the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds an argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory
    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Sets the image
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Adds an environment variable
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar::new(name, value));
        self
    }

    /// Classifies the step, or `None` if it does not set exactly one of
    /// `command`, `step` and `loop`.
    pub fn kind(&self) -> Option<StepKind<'_>> {
        match (
            self.command.is_empty(),
            self.step.is_empty(),
            self.loop_.as_ref(),
        ) {
            (false, true, None) => Some(StepKind::Command {
                command: &self.command,
                args: &self.args,
            }),
            (true, false, None) => Some(StepKind::Reference(&self.step)),
            (true, true, Some(l)) => Some(StepKind::Loop(l)),
            _ => None,
        }
    }

    /// The image this step asks for: `image`, then the agent's image
    pub fn requested_image(&self) -> Option<&str> {
        if !self.image.is_empty() {
            return Some(&self.image);
        }
        self.agent
            .as_ref()
            .map(Agent::image_str)
            .filter(|image| !image.is_empty())
    }

    /// Command followed by its arguments, space separated
    pub fn full_command(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

impl Validate for Step {
    type Error = FieldError;

    fn validate(&self) -> Result<(), Self::Error> {
        let has_command = !self.command.is_empty();
        let has_step = !self.step.is_empty();
        let has_loop = self.loop_.is_some();

        let set = [has_command, has_step, has_loop]
            .into_iter()
            .filter(|b| *b)
            .count();
        if set == 0 {
            return Err(FieldError::missing_one_of(&["command", "step", "loop"]));
        }
        if set > 1 {
            return Err(FieldError::multiple_one_of(&["command", "step", "loop"]));
        }

        if (has_command || has_loop) && !self.options.is_empty() {
            return Err(FieldError::new(
                "Cannot set options for a command or a loop",
                "options",
            ));
        }
        if (has_step || has_loop) && !self.args.is_empty() {
            return Err(FieldError::new(
                "Cannot set command-line arguments for a step or a loop",
                "args",
            ));
        }

        if let Some(l) = &self.loop_ {
            l.validate().via_field("loop")?;
        }
        if let Some(agent) = &self.agent {
            agent.validate().via_field("agent")?;
        }
        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(StepKind::Command { .. }) => write!(f, "sh '{}'", self.full_command()),
            Some(StepKind::Reference(step)) => write!(f, "step {step}"),
            Some(StepKind::Loop(l)) => write!(
                f,
                "loop {} over {} values ({} steps)",
                l.variable,
                l.values.len(),
                l.steps.len()
            ),
            None => write!(f, "invalid step"),
        }
    }
}

/// Repeats `steps` once per entry of `values`, binding `variable` to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Loop {
    /// Environment variable bound to the current value
    #[serde(default)]
    pub variable: String,

    /// Values to iterate over, in order
    #[serde(default)]
    pub values: Vec<String>,

    /// Steps run for every value
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Loop {
    /// Creates a loop
    pub fn new(variable: impl Into<String>, values: Vec<String>, steps: Vec<Step>) -> Self {
        Self {
            variable: variable.into(),
            values,
            steps,
        }
    }
}

impl Validate for Loop {
    type Error = FieldError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.variable.is_empty() {
            return Err(FieldError::missing_field(&["variable"]));
        }
        if self.steps.is_empty() {
            return Err(FieldError::missing_field(&["steps"]));
        }
        if self.values.is_empty() {
            return Err(FieldError::missing_field(&["values"]));
        }
        for (i, step) in self.steps.iter().enumerate() {
            step.validate().via_field_index("steps", i)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_step_kind() {
        let step = Step::command("make").with_arg("build");
        assert_eq!(
            step.kind(),
            Some(StepKind::Command {
                command: "make",
                args: &["build".to_string()],
            })
        );
        assert_eq!(step.full_command(), "make build");
        assert!(step.validate().is_ok());
    }

    #[test]
    fn test_step_requires_exactly_one_action() {
        let err = Step::default().validate().unwrap_err();
        assert_eq!(err.message, "expected exactly one, got neither");
        assert_eq!(err.paths, vec!["command", "step", "loop"]);

        let mut step = Step::command("echo");
        step.step = "some-step".into();
        let err = step.validate().unwrap_err();
        assert_eq!(err.message, "expected exactly one, got both");
        assert_eq!(step.kind(), None);
    }

    #[test]
    fn test_options_only_with_step_reference() {
        let mut step = Step::command("echo");
        step.options.insert("key".into(), "value".into());
        let err = step.validate().unwrap_err();
        assert_eq!(err.message, "Cannot set options for a command or a loop");

        let mut reference = Step::reference("some-step");
        reference.options.insert("key".into(), "value".into());
        assert!(reference.validate().is_ok());
    }

    #[test]
    fn test_args_only_with_command() {
        let step = Step::reference("some-step").with_arg("--flag");
        let err = step.validate().unwrap_err();
        assert_eq!(err.paths, vec!["args"]);
    }

    #[test]
    fn test_loop_missing_fields_in_order() {
        let step = Step::looped(Loop::default());
        let err = step.validate().unwrap_err();
        assert_eq!(err.message, "missing field(s)");
        assert_eq!(err.paths, vec!["loop.variable"]);

        let step = Step::looped(Loop::new("LANG", vec![], vec![]));
        assert_eq!(step.validate().unwrap_err().paths, vec!["loop.steps"]);

        let step = Step::looped(Loop::new("LANG", vec![], vec![Step::command("echo")]));
        assert_eq!(step.validate().unwrap_err().paths, vec!["loop.values"]);
    }

    #[test]
    fn test_nested_loop_step_error_path() {
        let step = Step::looped(Loop::new(
            "LANG",
            vec!["go".into()],
            vec![Step::command("echo"), Step::default()],
        ));
        let err = step.validate().unwrap_err();
        assert_eq!(
            err.paths,
            vec!["loop.steps[1].command", "loop.steps[1].step", "loop.steps[1].loop"]
        );
    }

    #[test]
    fn test_requested_image() {
        let mut step = Step::command("go build");
        assert_eq!(step.requested_image(), None);
        step.agent = Some(Agent::image("golang"));
        assert_eq!(step.requested_image(), Some("golang"));
        step.image = "maven".into();
        assert_eq!(step.requested_image(), Some("maven"));
    }

    #[test]
    fn test_step_from_yaml_with_sh_alias() {
        let yaml = r#"
name: build
sh: mvn
args: [clean, install]
dir: ./sub
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.command, "mvn");
        assert_eq!(step.full_command(), "mvn clean install");
    }

    #[test]
    fn test_unknown_step_field_is_rejected() {
        let result: Result<Step, _> = serde_yaml::from_str("command: ls\ncolour: red\n");
        assert!(result.is_err());
    }
}
