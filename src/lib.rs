//! # Tekline - a declarative pipeline compiler
//!
//! Tekline reads a declarative YAML pipeline (agent, environment, nested
//! sequential and parallel stages, steps and loops), validates it, and
//! compiles it into Tekton-style `Task` and `Pipeline` resources plus a
//! `PipelineStructure` describing the stage tree.
//!
//! ## Quick Start
//!
//! ```
//! use tekline::prelude::*;
//!
//! let def = PipelineDefinition::from_yaml(
//!     "agent:\n  image: golang\nstages:\n  - name: Build\n    steps:\n      - command: make\n",
//! )
//! .unwrap();
//! let compiled = compile(&def, &CompileOptions::new("myapp", "1"), &NoPodTemplates).unwrap();
//! assert_eq!(compiled.tasks[0].name(), "myapp-build-1");
//! ```
//!
//! ## Layout
//!
//! - [`pipeline`]: the YAML document model and its validation
//! - [`compiler`]: name mangling, step generation, stage transformation and assembly
//! - [`infrastructure`]: configuration, logging, file loading and manifest output

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod compiler;
pub mod infrastructure;
pub mod pipeline;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use compiler::{
    CompileOptions, CompiledPipeline, NoPodTemplates, Pipeline, PipelineStructure, PipelineTask,
    PodTemplate, PodTemplateLookup, Task, compile, mangle_to_rfc1035_label,
};
pub use infrastructure::{Config, DirectorySink, PipelineLoader, ResourceSink};
pub use pipeline::{
    Agent, CompileError, FieldError, PipelineBuilder, PipelineDefinition, Stage, StageBuilder,
    Step, Validate,
};

/// Version of the tekline crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
