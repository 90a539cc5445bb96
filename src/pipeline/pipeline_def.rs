//! Pipeline definition and builder

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use crate::compiler::mangle::mangle_to_rfc1035_label;
use crate::pipeline::agent::Agent;
use crate::pipeline::container::EnvVar;
use crate::pipeline::errors::{CompileError, FieldError, FieldResultExt};
use crate::pipeline::options::RootOptions;
use crate::pipeline::post::Post;
use crate::pipeline::stage::Stage;
use crate::pipeline::types::Validate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Reference to a base pipeline this one extends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Extends {
    /// Named import the file is looked up in; empty means a local file
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub import: String,

    /// File holding the base pipeline
    pub file: String,
}

/// A parsed pipeline document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineDefinition {
    /// Base pipeline, resolved before compiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<Extends>,

    /// Default agent for every stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,

    /// Environment variables for every stage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Legacy name for `env`, used only when `env` is empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvVar>,

    /// Pipeline options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RootOptions>,

    /// Top-level stages, in execution order
    #[serde(default)]
    pub stages: Vec<Stage>,

    /// Post blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<Post>,

    /// Base working directory for every step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl PipelineDefinition {
    /// Creates a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Parses a pipeline from YAML without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Parse`] for malformed YAML or unknown fields.
    pub fn from_yaml(yaml: &str) -> Result<Self, CompileError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serializes the pipeline back to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Parse`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, CompileError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Effective environment: `env`, or the legacy `environment` when empty
    pub fn env(&self) -> &[EnvVar] {
        if self.env.is_empty() {
            &self.environment
        } else {
            &self.env
        }
    }

    /// Returns number of top-level stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Fails if two stages anywhere in the tree mangle to the same label.
    ///
    /// Every original name involved in a collision is listed once, sorted.
    ///
    /// # Errors
    ///
    /// Returns a single aggregated [`FieldError`] naming all colliding stages.
    pub fn validate_stage_names(&self) -> Result<(), FieldError> {
        let mut names = Vec::new();
        for stage in &self.stages {
            stage.collect_names(&mut names);
        }

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for name in &names {
            *counts
                .entry(mangle_to_rfc1035_label(name, ""))
                .or_default() += 1;
        }

        let duplicates: BTreeSet<String> = names
            .iter()
            .filter(|name| counts[&mangle_to_rfc1035_label(name, "")] > 1)
            .map(|name| format!("'{name}'"))
            .collect();

        if duplicates.is_empty() {
            return Ok(());
        }
        Err(
            FieldError::without_path("Stage names must be unique").with_details(format!(
                "The following stage names are used more than once: {}",
                duplicates.into_iter().collect::<Vec<_>>().join(", ")
            )),
        )
    }
}

impl Validate for PipelineDefinition {
    type Error = FieldError;

    /// Checks agent, stages, stage name uniqueness and root options, in that
    /// order, returning the first problem.
    fn validate(&self) -> Result<(), Self::Error> {
        if let Some(agent) = &self.agent {
            agent.validate().via_field("agent")?;
        }

        if self.stages.is_empty() {
            return Err(FieldError::missing_field(&["stages"]));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            stage
                .validate_with_parent(self.agent.as_ref())
                .via_field_index("stages", i)?;
        }

        self.validate_stage_names()?;

        if let Some(options) = &self.options {
            options.validate().via_field("options")?;
        }
        Ok(())
    }
}

impl fmt::Display for PipelineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let agent = self.agent.clone().unwrap_or_default();
        write!(f, "Pipeline({agent}): {} stages", self.stages.len())
    }
}

/// Builder for creating pipelines
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    pipeline: PipelineDefinition,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets agent for pipeline
    pub fn agent(mut self, agent: Agent) -> Self {
        self.pipeline.agent = Some(agent);
        self
    }

    /// Adds a stage to pipeline
    pub fn stage(mut self, stage: Stage) -> Self {
        self.pipeline.stages.push(stage);
        self
    }

    /// Adds multiple stages to pipeline
    pub fn stages(mut self, mut stages: Vec<Stage>) -> Self {
        self.pipeline.stages.append(&mut stages);
        self
    }

    /// Adds an environment variable
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pipeline.env.push(EnvVar::new(name, value));
        self
    }

    /// Sets pipeline options
    pub fn options(mut self, options: RootOptions) -> Self {
        self.pipeline.options = Some(options);
        self
    }

    /// Sets the base working directory
    pub fn dir(mut self, dir: impl Into<String>) -> Self {
        self.pipeline.dir = Some(dir.into());
        self
    }

    /// Adds a post block
    pub fn post(mut self, post: Post) -> Self {
        self.pipeline.post.push(post);
        self
    }

    /// Builds pipeline
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<PipelineDefinition, FieldError> {
        self.pipeline.validate()?;
        Ok(self.pipeline)
    }

    /// Builds pipeline without validation
    #[must_use]
    pub fn build_unchecked(self) -> PipelineDefinition {
        self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::steps::Step;
    use pretty_assertions::assert_eq;

    fn leaf(name: &str) -> Stage {
        Stage::builder(name).step(Step::command("echo")).build()
    }

    #[test]
    fn test_parse_minimal_pipeline() {
        let yaml = r#"
agent:
  image: some-image
stages:
  - name: A Working Stage
    steps:
      - command: echo
        args: [hello, world]
"#;
        let pipeline = PipelineDefinition::from_yaml(yaml).unwrap();
        assert_eq!(pipeline.stage_count(), 1);
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_is_a_parse_error() {
        let err = PipelineDefinition::from_yaml("stages: []\nbogus: true\n").unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }

    #[test]
    fn test_missing_stages() {
        let err = PipelineDefinition::builder()
            .agent(Agent::image("x"))
            .build()
            .unwrap_err();
        assert_eq!(err.message, "missing field(s)");
        assert_eq!(err.paths, vec!["stages"]);
    }

    #[test]
    fn test_agent_checked_before_stages() {
        let err = PipelineDefinition::builder()
            .agent(Agent {
                label: Some("a".into()),
                image: Some("b".into()),
            })
            .build()
            .unwrap_err();
        assert_eq!(err.paths, vec!["agent.label", "agent.image"]);
    }

    #[test]
    fn test_stage_error_has_indexed_path() {
        let err = PipelineDefinition::builder()
            .agent(Agent::image("x"))
            .stage(leaf("A"))
            .stage(Stage::new("B"))
            .build()
            .unwrap_err();
        assert_eq!(err.paths[0], "stages[1].steps");
    }

    #[test]
    fn test_stage_name_collisions_are_aggregated() {
        let err = PipelineDefinition::builder()
            .agent(Agent::image("x"))
            .stage(leaf("A Stage"))
            .stage(leaf("a-stage"))
            .stage(
                Stage::builder("Group")
                    .stage(leaf("Build"))
                    .stage(leaf("build!"))
                    .build(),
            )
            .build()
            .unwrap_err();
        assert_eq!(err.message, "Stage names must be unique");
        assert!(err.paths.is_empty());
        assert_eq!(
            err.details,
            "The following stage names are used more than once: 'A Stage', 'Build', 'a-stage', 'build!'"
        );
    }

    #[test]
    fn test_stage_names_inside_parallel_are_checked() {
        let pipeline = PipelineDefinition::builder()
            .agent(Agent::image("x"))
            .stage(leaf("Test"))
            .stage(Stage::builder("Group").parallel(leaf("test")).build())
            .build_unchecked();
        assert!(pipeline.validate_stage_names().is_err());
    }

    #[test]
    fn test_root_options_checked_last() {
        let err = PipelineDefinition::builder()
            .agent(Agent::image("x"))
            .stage(leaf("A"))
            .options(RootOptions {
                retry: -2,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert_eq!(err.paths, vec!["options.retry"]);
    }

    #[test]
    fn test_legacy_environment() {
        let yaml = r#"
agent:
  label: jenkins-go
environment:
  - name: GOPATH
    value: /go
stages:
  - name: Build
    steps:
      - sh: make
"#;
        let pipeline = PipelineDefinition::from_yaml(yaml).unwrap();
        assert_eq!(pipeline.env(), &[EnvVar::new("GOPATH", "/go")]);
    }

    #[test]
    fn test_display() {
        let pipeline = PipelineDefinition::builder()
            .agent(Agent::image("golang"))
            .stage(leaf("A"))
            .build_unchecked();
        assert_eq!(pipeline.to_string(), "Pipeline(image golang): 1 stages");
    }
}
