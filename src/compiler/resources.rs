//! Generated resources
//!
//! Task, Pipeline and `PipelineStructure` documents emitted by the compiler.
//! Every map is a `BTreeMap` so serialized output is stable.

use crate::pipeline::{Container, Volume};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API version of generated Task and Pipeline resources
pub const TEKTON_API_VERSION: &str = "tekton.dev/v1alpha1";

/// API version of the generated pipeline structure
pub const STRUCTURE_API_VERSION: &str = "jenkins.io/v1";

/// Label carrying the mangled stage name on every task
pub const LABEL_STAGE_NAME: &str = "jenkins.io/task-stage-name";

/// Name of the workspace input and output on every task
pub const WORKSPACE_RESOURCE: &str = "workspace";

/// Object metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name
    pub name: String,
    /// Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Kind of a pipeline resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// A git checkout
    #[default]
    Git,
}

/// A resource consumed or produced by a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResource {
    /// Resource name
    pub name: String,
    /// Resource type
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Where the resource is placed under `/workspace`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_path: String,
}

impl TaskResource {
    /// The git workspace resource
    #[must_use]
    pub fn workspace(target_path: impl Into<String>) -> Self {
        Self {
            name: WORKSPACE_RESOURCE.to_string(),
            resource_type: ResourceType::Git,
            target_path: target_path.into(),
        }
    }
}

/// A task parameter declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Task inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Inputs {
    /// Input resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<TaskResource>,
    /// Parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
}

/// Task outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Outputs {
    /// Output resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<TaskResource>,
}

/// Body of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskSpec {
    /// Inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Inputs>,
    /// Outputs, absent on terminal tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,
    /// Ordered step containers
    #[serde(default)]
    pub steps: Vec<Container>,
    /// Volumes, sorted by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

/// A compiled leaf stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// API version
    pub api_version: String,
    /// Always `Task`
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: TaskSpec,
}

impl Task {
    /// Creates an empty task
    #[must_use]
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: TEKTON_API_VERSION.to_string(),
            kind: "Task".to_string(),
            metadata,
            spec: TaskSpec::default(),
        }
    }

    /// Task name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Reference from a pipeline task to its task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskRef {
    /// Task name
    pub name: String,
}

/// Input binding of a pipeline task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PipelineTaskInputResource {
    /// Task-side resource name
    pub name: String,
    /// Pipeline-side resource name
    pub resource: String,
    /// Pipeline tasks whose output feeds this input
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<String>,
}

/// Output binding of a pipeline task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PipelineTaskOutputResource {
    /// Task-side resource name
    pub name: String,
    /// Pipeline-side resource name
    pub resource: String,
}

/// Resource bindings of a pipeline task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PipelineTaskResources {
    /// Inputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PipelineTaskInputResource>,
    /// Outputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<PipelineTaskOutputResource>,
}

/// A node of the execution graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    /// Node name, derived from the stage name
    pub name: String,
    /// Task to run
    pub task_ref: TaskRef,
    /// Resource bindings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<PipelineTaskResources>,
    /// Tasks that must finish first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_after: Vec<String>,
}

impl PipelineTask {
    /// Producers of the workspace input
    #[must_use]
    pub fn workspace_from(&self) -> &[String] {
        self.resources
            .as_ref()
            .and_then(|r| r.inputs.iter().find(|i| i.name == WORKSPACE_RESOURCE))
            .map(|i| i.from.as_slice())
            .unwrap_or_default()
    }

    /// True if the task publishes its workspace
    #[must_use]
    pub fn has_workspace_output(&self) -> bool {
        self.resources
            .as_ref()
            .is_some_and(|r| r.outputs.iter().any(|o| o.name == WORKSPACE_RESOURCE))
    }
}

/// A resource declared at pipeline level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PipelineDeclaredResource {
    /// Resource name
    pub name: String,
    /// Resource type
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
}

/// Body of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    /// Declared resources
    pub resources: Vec<PipelineDeclaredResource>,
    /// Ordered pipeline tasks
    pub tasks: Vec<PipelineTask>,
    /// Overall timeout for the runner to enforce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// The compiled execution graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    /// API version
    pub api_version: String,
    /// Always `Pipeline`
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: PipelineSpec,
}

impl Pipeline {
    /// Creates an empty pipeline
    #[must_use]
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: TEKTON_API_VERSION.to_string(),
            kind: "Pipeline".to_string(),
            metadata,
            spec: PipelineSpec::default(),
        }
    }

    /// Pipeline name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Looks up a pipeline task by name
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&PipelineTask> {
        self.spec.tasks.iter().find(|t| t.name == name)
    }
}

/// One stage in the flattened structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStructureStage {
    /// Stage name as written
    pub name: String,
    /// Nesting depth, zero at top level
    pub depth: usize,
    /// Enclosing stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Preceding sibling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    /// Task of a leaf stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<String>,
    /// Sequential children
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
    /// Parallel children
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallel: Vec<String>,
}

/// Depth-first listing of every stage, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStructure {
    /// API version
    pub api_version: String,
    /// Always `PipelineStructure`
    pub kind: String,
    /// Metadata, named after the pipeline
    pub metadata: ObjectMeta,
    /// Stages
    pub stages: Vec<PipelineStructureStage>,
}

impl PipelineStructure {
    /// Creates an empty structure
    #[must_use]
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: STRUCTURE_API_VERSION.to_string(),
            kind: "PipelineStructure".to_string(),
            metadata,
            stages: Vec::new(),
        }
    }
}

/// Everything produced by one compile call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPipeline {
    /// The execution graph
    pub pipeline: Pipeline,
    /// Tasks in flattened stage order
    pub tasks: Vec<Task>,
    /// Stage structure
    pub structure: PipelineStructure,
}

impl CompiledPipeline {
    /// Looks up a task by name
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name() == name)
    }
}
