//! Prelude module for common imports

pub use crate::compiler::{
    CompileOptions, CompiledPipeline, NoPodTemplates, PodTemplate, PodTemplateLookup, compile,
};
pub use crate::pipeline::agent::Agent;
pub use crate::pipeline::container::{Container, EnvVar};
pub use crate::pipeline::errors::{CompileError, FieldError};
pub use crate::pipeline::options::{RootOptions, StageOptions, Timeout, TimeoutUnit};
pub use crate::pipeline::pipeline_def::{PipelineBuilder, PipelineDefinition};
pub use crate::pipeline::post::{Post, PostCondition};
pub use crate::pipeline::stage::{Stage, StageBuilder};
pub use crate::pipeline::steps::{Loop, Step};
pub use crate::pipeline::types::Validate;
