//! Infrastructure layer
//!
//! Everything that touches the outside world: configuration, logging,
//! reading pipeline files and writing manifests.

mod config;
mod loader;
mod logging;
mod sink;

pub use config::{
    Config, ConfigError, ENV_BUILDER_IMAGE, ENV_LEGACY_BUILDER_IMAGE, ENV_LOG_LEVEL, ENV_NAMESPACE,
};
pub use loader::{
    DirectoryImports, ImportFileResolver, LoadError, MAX_EXTENDS_DEPTH, NoImports, PipelineLoader,
    extend_definition,
};
pub use logging::init_logging;
pub use sink::{DirectorySink, ResourceSink, SinkError};
