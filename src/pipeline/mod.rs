//! Pipeline domain types and validation
//!
//! The YAML pipeline document parses into [`PipelineDefinition`]. Validation
//! walks it top-down and stops at the first problem, reporting a
//! [`FieldError`] whose paths point at the offending field.

pub mod agent;
pub mod container;
pub mod errors;
pub mod options;
pub mod overrides;
pub mod pipeline_def;
pub mod post;
pub mod stage;
pub mod steps;
pub mod types;

pub use agent::Agent;
pub use container::{
    Container, ContainerPort, EnvVar, EnvVarSource, KeySelector, ResourceRequirements,
    SecurityContext, Volume, VolumeMount, merge_containers, merge_optional, scoped_env,
};
pub use errors::{CompileError, FieldError, FieldResultExt, MergeError};
pub use options::{RootOptions, Stash, StageOptions, Timeout, TimeoutUnit, Unstash};
pub use overrides::{OverrideType, PipelineOverride, extend_pipeline, extend_stage};
pub use pipeline_def::{Extends, PipelineBuilder, PipelineDefinition};
pub use post::{Post, PostAction, PostCondition};
pub use stage::{Stage, StageBody, StageBuilder};
pub use steps::{Loop, Step, StepKind};
pub use types::{FieldResult, Validate};
