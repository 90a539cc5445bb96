//! Compile options
//!
//! Everything the compiler needs besides the pipeline itself. The compiler
//! never reads the environment; callers build these from
//! [`Config`](crate::infrastructure::Config) or directly.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::resources::ParamSpec;
use std::collections::BTreeMap;

/// Image running the workspace preparation step
pub const DEFAULT_BUILDER_IMAGE: &str = "gcr.io/jenkinsxio/builder-jx:0.1.527";

/// Directory under `/workspace` holding the source checkout
pub const DEFAULT_SOURCE_DIR: &str = "source";

/// Namespace generated resources are placed in
pub const DEFAULT_NAMESPACE: &str = "jx";

/// Root of every task workspace
pub const WORKSPACE_ROOT: &str = "/workspace";

/// Inputs to a compile call besides the pipeline definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Identifies the pipeline; names the git resource and prefixes task names
    pub pipeline_id: String,
    /// Identifies the build; suffixed to task and pipeline names
    pub build_id: String,
    /// Namespace for generated resources
    pub namespace: String,
    /// Source checkout directory under `/workspace`
    pub source_dir: String,
    /// Image for the workspace preparation step
    pub builder_image: String,
    /// Labels added to every generated resource
    pub labels: BTreeMap<String, String>,
    /// Parameters declared on every task
    pub task_params: Vec<ParamSpec>,
    /// Target path of the first task's workspace input, if not the source dir
    pub workspace_path: Option<String>,
}

impl CompileOptions {
    /// Creates options with default namespace, source dir and builder image
    pub fn new(pipeline_id: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            build_id: build_id.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            source_dir: DEFAULT_SOURCE_DIR.to_string(),
            builder_image: DEFAULT_BUILDER_IMAGE.to_string(),
            labels: BTreeMap::new(),
            task_params: Vec::new(),
            workspace_path: None,
        }
    }

    /// Sets the namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the source directory
    pub fn with_source_dir(mut self, source_dir: impl Into<String>) -> Self {
        self.source_dir = source_dir.into();
        self
    }

    /// Sets the builder image
    pub fn with_builder_image(mut self, image: impl Into<String>) -> Self {
        self.builder_image = image.into();
        self
    }

    /// Adds a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds a task parameter
    pub fn with_task_param(mut self, param: ParamSpec) -> Self {
        self.task_params.push(param);
        self
    }

    /// Sets the first task's workspace target path
    pub fn with_workspace_path(mut self, path: impl Into<String>) -> Self {
        self.workspace_path = Some(path.into());
        self
    }

    /// Default working directory of generated steps
    pub fn default_working_dir(&self) -> String {
        format!("{WORKSPACE_ROOT}/{}", self.source_dir)
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::new("pipeline", "1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompileOptions::new("jx-demo", "7");
        assert_eq!(options.namespace, "jx");
        assert_eq!(options.builder_image, DEFAULT_BUILDER_IMAGE);
        assert_eq!(options.default_working_dir(), "/workspace/source");
    }

    #[test]
    fn test_builders() {
        let options = CompileOptions::default()
            .with_namespace("ci")
            .with_source_dir("src")
            .with_label("team", "platform")
            .with_workspace_path("custom");
        assert_eq!(options.default_working_dir(), "/workspace/src");
        assert_eq!(options.labels["team"], "platform");
        assert_eq!(options.workspace_path.as_deref(), Some("custom"));
    }
}
