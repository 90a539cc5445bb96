//! Pipeline compiler
//!
//! Turns a [`PipelineDefinition`](crate::pipeline::PipelineDefinition) into
//! Task, Pipeline and `PipelineStructure` resources. Compilation is pure: it
//! reads nothing from the environment and performs no I/O.

pub mod assemble;
pub mod mangle;
pub mod options;
pub mod pod_template;
pub mod resources;
pub mod steps;
pub mod transform;

pub use assemble::compile;
pub use mangle::{MAX_LABEL_LENGTH, mangle_to_rfc1035_label};
pub use options::{
    CompileOptions, DEFAULT_BUILDER_IMAGE, DEFAULT_NAMESPACE, DEFAULT_SOURCE_DIR, WORKSPACE_ROOT,
};
pub use pod_template::{NoPodTemplates, PodTemplate, PodTemplateLookup};
pub use resources::{
    CompiledPipeline, Inputs, LABEL_STAGE_NAME, ObjectMeta, Outputs, ParamSpec, Pipeline,
    PipelineDeclaredResource, PipelineSpec, PipelineStructure, PipelineStructureStage,
    PipelineTask, PipelineTaskInputResource, PipelineTaskOutputResource, PipelineTaskResources,
    ResourceType, Task, TaskRef, TaskResource, TaskSpec,
};
pub use steps::{GeneratedSteps, StepContext, generate_steps, working_dir};
pub use transform::{
    DEFAULT_WORKSPACE, EMPTY_WORKSPACE, ParentScope, StageArena, StageId, StageKind,
    TransformedStage, Transformer,
};
