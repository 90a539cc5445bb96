//! Pipeline overrides
//!
//! Build packs customise a base pipeline by replacing named steps, inserting
//! steps around them, swapping a stage's whole step list, or changing agents.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::agent::Agent;
use super::pipeline_def::PipelineDefinition;
use super::stage::Stage;
use super::steps::Step;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where override steps go relative to the matched step or step list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverrideType {
    /// Replace the match
    #[default]
    Replace,
    /// Insert before the match
    Before,
    /// Insert after the match
    After,
}

/// A customisation applied to matching stages of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineOverride {
    /// Pipeline this applies to; empty matches every pipeline
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pipeline: String,

    /// Stage this applies to; empty matches every stage
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stage: String,

    /// Step name to match; empty targets the whole step list
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Single replacement step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,

    /// Replacement steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,

    /// Placement of the new steps
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub override_type: Option<OverrideType>,

    /// Agent replacement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
}

impl PipelineOverride {
    /// True if no pipeline is named or `name` is the named one
    pub fn matches_pipeline(&self, name: &str) -> bool {
        self.pipeline.is_empty() || self.pipeline == name
    }

    /// True if no stage is named or `name` is the named one
    pub fn matches_stage(&self, name: &str) -> bool {
        self.stage.is_empty() || self.stage == name
    }

    /// The override's steps: `step` if set, otherwise `steps`
    pub fn as_steps(&self) -> Vec<Step> {
        match &self.step {
            Some(step) => vec![step.clone()],
            None => self.steps.clone(),
        }
    }

    fn kind(&self) -> OverrideType {
        self.override_type.unwrap_or_default()
    }
}

/// Applies `override_` to every matching stage of `pipeline`.
///
/// Stages left with no steps and no agent override are removed.
pub fn extend_pipeline(
    mut pipeline: PipelineDefinition,
    override_: &PipelineOverride,
) -> PipelineDefinition {
    if let Some(agent) = &override_.agent {
        pipeline.agent = Some(agent.clone());
    }
    pipeline.stages = extend_stages(pipeline.stages, override_);
    pipeline
}

fn extend_stages(stages: Vec<Stage>, override_: &PipelineOverride) -> Vec<Stage> {
    stages
        .into_iter()
        .filter_map(|stage| extend_stage(stage, override_))
        .collect()
}

/// Applies `override_` to `stage` and its children.
///
/// Returns `None` when the override removes the stage.
pub fn extend_stage(mut stage: Stage, override_: &PipelineOverride) -> Option<Stage> {
    if override_.matches_stage(&stage.name) {
        if let Some(agent) = &override_.agent {
            stage.agent = Some(agent.clone());
        }
        if !stage.steps.is_empty() {
            let new_steps = if override_.name.is_empty() {
                let steps = override_.as_steps();
                if steps.is_empty() {
                    Vec::new()
                } else {
                    match override_.kind() {
                        OverrideType::Replace => steps,
                        OverrideType::Before => steps.into_iter().chain(stage.steps).collect(),
                        OverrideType::After => stage.steps.into_iter().chain(steps).collect(),
                    }
                }
            } else {
                stage
                    .steps
                    .into_iter()
                    .flat_map(|step| override_step(step, override_))
                    .collect()
            };

            if new_steps.is_empty() && override_.agent.is_none() {
                debug!(stage = %stage.name, "Override removed stage");
                return None;
            }
            stage.steps = new_steps;
        }
    }

    stage.stages = extend_stages(stage.stages, override_);
    stage.parallel = extend_stages(stage.parallel, override_);
    Some(stage)
}

/// Replaces `step` with the override's steps if its name matches, recursing
/// into loop bodies otherwise.
pub fn override_step(mut step: Step, override_: &PipelineOverride) -> Vec<Step> {
    if step.name == override_.name {
        let mut new_steps = Vec::new();
        if let Some(replacement) = &override_.step {
            let mut replacement = replacement.clone();
            if replacement.name.is_empty() {
                replacement.name.clone_from(&step.name);
            }
            new_steps.push(replacement);
        }
        new_steps.extend(override_.steps.iter().cloned());

        return match override_.kind() {
            OverrideType::Replace => new_steps,
            OverrideType::Before => {
                new_steps.push(step);
                new_steps
            }
            OverrideType::After => std::iter::once(step).chain(new_steps).collect(),
        };
    }

    if let Some(l) = step.loop_.as_mut() {
        l.steps = std::mem::take(&mut l.steps)
            .into_iter()
            .flat_map(|s| override_step(s, override_))
            .collect();
    }
    vec![step]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::steps::Loop;
    use pretty_assertions::assert_eq;

    fn base() -> PipelineDefinition {
        PipelineDefinition::builder()
            .agent(Agent::label("jenkins-maven"))
            .stage(
                Stage::builder("build")
                    .step(Step::command("mvn compile").with_name("compile"))
                    .step(Step::command("mvn test").with_name("test"))
                    .build(),
            )
            .stage(
                Stage::builder("release")
                    .step(Step::command("mvn deploy").with_name("deploy"))
                    .build(),
            )
            .build_unchecked()
    }

    fn names(stage: &Stage) -> Vec<&str> {
        stage.steps.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_replace_named_step_keeps_name() {
        let override_ = PipelineOverride {
            name: "test".into(),
            step: Some(Step::command("mvn verify")),
            ..Default::default()
        };
        let pipeline = extend_pipeline(base(), &override_);
        assert_eq!(pipeline.stages[0].steps[1].command, "mvn verify");
        assert_eq!(pipeline.stages[0].steps[1].name, "test");
    }

    #[test]
    fn test_insert_before_and_after_named_step() {
        let before = PipelineOverride {
            stage: "build".into(),
            name: "compile".into(),
            steps: vec![Step::command("lint").with_name("lint")],
            override_type: Some(OverrideType::Before),
            ..Default::default()
        };
        let pipeline = extend_pipeline(base(), &before);
        assert_eq!(names(&pipeline.stages[0]), vec!["lint", "compile", "test"]);

        let after = PipelineOverride {
            override_type: Some(OverrideType::After),
            ..before
        };
        let pipeline = extend_pipeline(base(), &after);
        assert_eq!(names(&pipeline.stages[0]), vec!["compile", "lint", "test"]);
    }

    #[test]
    fn test_whole_step_list_overrides() {
        let append = PipelineOverride {
            stage: "release".into(),
            steps: vec![Step::command("notify").with_name("notify")],
            override_type: Some(OverrideType::After),
            ..Default::default()
        };
        let pipeline = extend_pipeline(base(), &append);
        assert_eq!(names(&pipeline.stages[1]), vec!["deploy", "notify"]);
        assert_eq!(names(&pipeline.stages[0]), vec!["compile", "test"]);
    }

    #[test]
    fn test_empty_override_removes_stage() {
        let remove = PipelineOverride {
            stage: "release".into(),
            ..Default::default()
        };
        let pipeline = extend_pipeline(base(), &remove);
        assert_eq!(pipeline.stages.len(), 1);
        assert_eq!(pipeline.stages[0].name, "build");
    }

    #[test]
    fn test_agent_override_keeps_stage() {
        let agent = PipelineOverride {
            stage: "release".into(),
            agent: Some(Agent::image("maven:3")),
            ..Default::default()
        };
        let pipeline = extend_pipeline(base(), &agent);
        assert_eq!(pipeline.agent, Some(Agent::image("maven:3")));
        assert_eq!(pipeline.stages.len(), 2);
        assert_eq!(pipeline.stages[1].agent, Some(Agent::image("maven:3")));
    }

    #[test]
    fn test_override_reaches_loop_bodies() {
        let looped = Step::looped(Loop::new(
            "LANG",
            vec!["go".into()],
            vec![Step::command("echo").with_name("inner")],
        ));
        let override_ = PipelineOverride {
            name: "inner".into(),
            step: Some(Step::command("printf")),
            ..Default::default()
        };
        let steps = override_step(looped, &override_);
        let body = &steps[0].loop_.as_ref().unwrap().steps;
        assert_eq!(body[0].command, "printf");
    }

    #[test]
    fn test_matching() {
        let override_ = PipelineOverride {
            pipeline: "release".into(),
            ..Default::default()
        };
        assert!(override_.matches_pipeline("release"));
        assert!(!override_.matches_pipeline("pullRequest"));
        assert!(override_.matches_stage("anything"));
    }

    #[test]
    fn test_override_from_yaml() {
        let yaml = r#"
pipeline: release
stage: build
name: test
type: before
steps:
  - command: echo before
"#;
        let override_: PipelineOverride = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(override_.override_type, Some(OverrideType::Before));
        assert_eq!(override_.as_steps().len(), 1);
    }
}
