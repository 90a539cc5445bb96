//! Stage types for pipeline definition
//!
//! A stage is either a leaf with `steps`, a group of sequential `stages`, or
//! a group of `parallel` stages. Agent, environment, working directory and
//! container options are inherited by nested stages.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::Validate;
use super::agent::Agent;
use super::container::EnvVar;
use super::errors::{FieldError, FieldResultExt};
use super::options::StageOptions;
use super::post::Post;
use super::steps::Step;
use crate::compiler::mangle::contains_ascii_letter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A stage in a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    /// Stage name
    pub name: String,

    /// Agent override for this stage and its children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,

    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Legacy name for `env`, used only when `env` is empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvVar>,

    /// Stage options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<StageOptions>,

    /// Steps of a leaf stage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,

    /// Nested stages run one after another
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,

    /// Nested stages run side by side
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallel: Vec<Stage>,

    /// Post blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<Post>,

    /// Base working directory for steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// The body of a validated stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBody<'a> {
    /// Leaf stage
    Steps(&'a [Step]),
    /// Sequential group
    Sequential(&'a [Stage]),
    /// Parallel group
    Parallel(&'a [Stage]),
}

impl Stage {
    /// Creates an empty stage
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Creates a stage builder
    pub fn builder(name: impl Into<String>) -> StageBuilder {
        StageBuilder::new(name)
    }

    /// Effective environment: `env`, or the legacy `environment` when empty
    pub fn env(&self) -> &[EnvVar] {
        if self.env.is_empty() {
            &self.environment
        } else {
            &self.env
        }
    }

    /// Name used for the pipeline task: lowercased, spaces become hyphens
    pub fn task_name(&self) -> String {
        self.name.to_lowercase().replace(' ', "-")
    }

    /// Explicit workspace, if any
    pub fn workspace(&self) -> Option<&str> {
        self.options.as_ref().and_then(|o| o.workspace.as_deref())
    }

    /// Container overrides declared on this stage
    pub fn container_options(&self) -> Option<&super::Container> {
        self.options
            .as_ref()
            .and_then(|o| o.container_options.as_ref())
    }

    /// Classifies the stage, or `None` unless exactly one body is set
    pub fn body(&self) -> Option<StageBody<'_>> {
        match (
            self.steps.is_empty(),
            self.stages.is_empty(),
            self.parallel.is_empty(),
        ) {
            (false, true, true) => Some(StageBody::Steps(&self.steps)),
            (true, false, true) => Some(StageBody::Sequential(&self.stages)),
            (true, true, false) => Some(StageBody::Parallel(&self.parallel)),
            _ => None,
        }
    }

    /// Appends this stage's name and every nested stage name, depth first
    pub fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        names.push(&self.name);
        for child in self.stages.iter().chain(&self.parallel) {
            child.collect_names(names);
        }
    }

    /// Validates this stage given the agent its ancestors resolve to.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, with a path relative to this stage.
    pub fn validate_with_parent(&self, parent_agent: Option<&Agent>) -> Result<(), FieldError> {
        if self.steps.is_empty() && self.stages.is_empty() && self.parallel.is_empty() {
            return Err(FieldError::missing_one_of(&["steps", "stages", "parallel"]));
        }

        if !contains_ascii_letter(&self.name) {
            return Err(FieldError::new(
                "Stage name must contain at least one ASCII letter",
                "name",
            ));
        }

        let Some(agent) = self.agent.as_ref().or(parent_agent) else {
            return Err(FieldError::new(
                "No agent specified for stage or for its parent(s)",
                "agent",
            ));
        };
        if let Some(own) = &self.agent {
            own.validate().via_field("agent")?;
        }

        if !self.steps.is_empty() {
            if !self.stages.is_empty() || !self.parallel.is_empty() {
                return Err(FieldError::multiple_one_of(&["steps", "stages", "parallel"]));
            }
            for (i, step) in self.steps.iter().enumerate() {
                step.validate().via_field_index("steps", i)?;
            }
            self.validate_unique_step_names()?;
        }

        if !self.stages.is_empty() {
            if !self.parallel.is_empty() {
                return Err(FieldError::multiple_one_of(&["steps", "stages", "parallel"]));
            }
            for (i, stage) in self.stages.iter().enumerate() {
                stage
                    .validate_with_parent(Some(agent))
                    .via_field_index("stages", i)?;
            }
        }

        for (i, stage) in self.parallel.iter().enumerate() {
            stage
                .validate_with_parent(Some(agent))
                .via_field_index("parallel", i)?;
        }

        if let Some(options) = &self.options {
            options.validate().via_field("options")?;
        }
        Ok(())
    }

    fn validate_unique_step_names(&self) -> Result<(), FieldError> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for step in self.steps.iter().filter(|s| !s.name.is_empty()) {
            *counts.entry(&step.name).or_default() += 1;
        }
        let duplicates: Vec<&str> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name)
            .collect();

        if duplicates.is_empty() {
            return Ok(());
        }
        Err(
            FieldError::new("step names within a stage must be unique", "steps").with_details(
                format!(
                    "The following step names in the stage {} are used more than once: {}",
                    self.name,
                    duplicates.join(", ")
                ),
            ),
        )
    }
}

impl Validate for Stage {
    type Error = FieldError;

    fn validate(&self) -> Result<(), Self::Error> {
        self.validate_with_parent(None)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.body() {
            Some(StageBody::Steps(steps)) => {
                write!(f, "Stage({}): {} steps", self.name, steps.len())
            }
            Some(StageBody::Sequential(stages)) => {
                write!(f, "Stage({}): {} stages", self.name, stages.len())
            }
            Some(StageBody::Parallel(stages)) => {
                write!(f, "Stage({}): {} parallel", self.name, stages.len())
            }
            None => write!(f, "Stage({}): invalid", self.name),
        }
    }
}

/// Builder for creating stages
#[derive(Debug, Clone)]
pub struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    /// Creates a new stage builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stage: Stage::new(name),
        }
    }

    /// Sets the agent
    pub fn agent(mut self, agent: Agent) -> Self {
        self.stage.agent = Some(agent);
        self
    }

    /// Adds a step
    pub fn step(mut self, step: Step) -> Self {
        self.stage.steps.push(step);
        self
    }

    /// Adds a sequential child stage
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage.stages.push(stage);
        self
    }

    /// Adds a parallel child stage
    pub fn parallel(mut self, stage: Stage) -> Self {
        self.stage.parallel.push(stage);
        self
    }

    /// Adds an environment variable
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.stage.env.push(EnvVar::new(name, value));
        self
    }

    /// Sets the options
    pub fn options(mut self, options: StageOptions) -> Self {
        self.stage.options = Some(options);
        self
    }

    /// Sets the workspace
    pub fn workspace(mut self, workspace: impl Into<String>) -> Self {
        let options = self.stage.options.take().unwrap_or_default();
        self.stage.options = Some(options.with_workspace(workspace));
        self
    }

    /// Sets the base working directory
    pub fn dir(mut self, dir: impl Into<String>) -> Self {
        self.stage.dir = Some(dir.into());
        self
    }

    /// Adds a post block
    pub fn post(mut self, post: Post) -> Self {
        self.stage.post.push(post);
        self
    }

    /// Builds the stage
    pub fn build(self) -> Stage {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::options::{Timeout, TimeoutUnit};

    fn leaf(name: &str) -> Stage {
        Stage::builder(name).step(Step::command("echo hi")).build()
    }

    #[test]
    fn test_leaf_stage_is_valid_with_parent_agent() {
        let stage = leaf("Build");
        assert!(stage.validate_with_parent(Some(&Agent::image("x"))).is_ok());
        assert_eq!(stage.body(), Some(StageBody::Steps(&stage.steps)));
    }

    #[test]
    fn test_stage_without_agent() {
        let err = leaf("Build").validate().unwrap_err();
        assert_eq!(err.message, "No agent specified for stage or for its parent(s)");
        assert_eq!(err.paths, vec!["agent"]);
    }

    #[test]
    fn test_stage_name_needs_a_letter() {
        let err = leaf("123")
            .validate_with_parent(Some(&Agent::image("x")))
            .unwrap_err();
        assert_eq!(err.paths, vec!["name"]);
    }

    #[test]
    fn test_empty_stage() {
        let err = Stage::new("Empty").validate().unwrap_err();
        assert_eq!(err.message, "expected exactly one, got neither");
        assert_eq!(err.paths, vec!["steps", "stages", "parallel"]);
    }

    #[test]
    fn test_steps_and_stages_together() {
        let stage = Stage::builder("Both")
            .agent(Agent::image("x"))
            .step(Step::command("ls"))
            .stage(leaf("Child"))
            .build();
        let err = stage.validate().unwrap_err();
        assert_eq!(err.message, "expected exactly one, got both");
        assert_eq!(stage.body(), None);
    }

    #[test]
    fn test_children_inherit_the_stage_agent() {
        let stage = Stage::builder("Parent")
            .agent(Agent::label("jenkins-maven"))
            .stage(leaf("A"))
            .build();
        assert!(stage.validate().is_ok());
    }

    #[test]
    fn test_parallel_child_error_is_reported() {
        let stage = Stage::builder("Parent")
            .agent(Agent::image("x"))
            .parallel(leaf("A"))
            .parallel(Stage::new("B"))
            .build();
        let err = stage.validate().unwrap_err();
        assert_eq!(
            err.paths,
            vec!["parallel[1].steps", "parallel[1].stages", "parallel[1].parallel"]
        );
    }

    #[test]
    fn test_duplicate_step_names() {
        let stage = Stage::builder("Build Stage")
            .agent(Agent::image("x"))
            .step(Step::command("a").with_name("b"))
            .step(Step::command("c").with_name("a"))
            .step(Step::command("d").with_name("b"))
            .step(Step::command("e").with_name("a"))
            .step(Step::command("f"))
            .step(Step::command("g"))
            .build();
        let err = stage.validate().unwrap_err();
        assert_eq!(err.message, "step names within a stage must be unique");
        assert_eq!(err.paths, vec!["steps"]);
        assert_eq!(
            err.details,
            "The following step names in the stage Build Stage are used more than once: a, b"
        );
    }

    #[test]
    fn test_nested_step_error_path() {
        let stage = Stage::builder("Build")
            .agent(Agent::image("x"))
            .step(Step::command("ls"))
            .step(Step::default())
            .build();
        let err = stage.validate().unwrap_err();
        assert_eq!(err.paths[0], "steps[1].command");
    }

    #[test]
    fn test_options_error_path() {
        let stage = Stage::builder("Build")
            .agent(Agent::image("x"))
            .step(Step::command("ls"))
            .options(StageOptions {
                timeout: Some(Timeout::new(0, TimeoutUnit::Minutes)),
                ..Default::default()
            })
            .build();
        assert_eq!(
            stage.validate().unwrap_err().paths,
            vec!["options.timeout.time"]
        );
    }

    #[test]
    fn test_legacy_environment_fallback() {
        let mut stage = leaf("A");
        stage.environment = vec![EnvVar::new("OLD", "1")];
        assert_eq!(stage.env()[0].name, "OLD");
        stage.env = vec![EnvVar::new("NEW", "1")];
        assert_eq!(stage.env()[0].name, "NEW");
    }

    #[test]
    fn test_task_name_and_collect_names() {
        let stage = Stage::builder("A Working Stage")
            .stage(leaf("Inner One"))
            .stage(Stage::builder("Group").parallel(leaf("P")).build())
            .build();
        assert_eq!(stage.task_name(), "a-working-stage");

        let mut names = Vec::new();
        stage.collect_names(&mut names);
        assert_eq!(names, vec!["A Working Stage", "Inner One", "Group", "P"]);
    }
}
