//! Output sinks for compiled resources
//!
//! The compiler hands its resources to a [`ResourceSink`]; [`DirectorySink`]
//! writes one YAML manifest per resource.

use crate::compiler::{CompiledPipeline, Pipeline, PipelineStructure, Task};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Error writing a resource
#[derive(Error, Debug)]
pub enum SinkError {
    /// The manifest could not be written
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Target file
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The resource could not be serialized
    #[error("Failed to serialize {name}: {source}")]
    Serialize {
        /// Resource name
        name: String,
        /// Underlying error
        source: serde_yaml::Error,
    },
}

/// Receives compiled resources
pub trait ResourceSink {
    /// Stores a task
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the task cannot be stored.
    fn apply_task(&mut self, task: &Task) -> Result<(), SinkError>;

    /// Stores a pipeline
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the pipeline cannot be stored.
    fn apply_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), SinkError>;

    /// Stores a pipeline structure
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the structure cannot be stored.
    fn apply_structure(&mut self, structure: &PipelineStructure) -> Result<(), SinkError>;

    /// Stores tasks first, then the pipeline referencing them, then the structure.
    ///
    /// # Errors
    ///
    /// Stops at the first resource that cannot be stored.
    fn apply_all(&mut self, compiled: &CompiledPipeline) -> Result<(), SinkError> {
        for task in &compiled.tasks {
            self.apply_task(task)?;
        }
        self.apply_pipeline(&compiled.pipeline)?;
        self.apply_structure(&compiled.structure)
    }
}

/// Writes manifests into a directory
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    /// Creates the sink, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, in order
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write<T: Serialize>(&mut self, kind: &str, name: &str, resource: &T) -> Result<(), SinkError> {
        let yaml = serde_yaml::to_string(resource).map_err(|source| SinkError::Serialize {
            name: name.to_string(),
            source,
        })?;
        let path = self.dir.join(format!("{kind}-{name}.yaml"));
        fs::write(&path, yaml).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "Wrote manifest");
        self.written.push(path);
        Ok(())
    }
}

impl ResourceSink for DirectorySink {
    fn apply_task(&mut self, task: &Task) -> Result<(), SinkError> {
        self.write("task", task.name(), task)
    }

    fn apply_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), SinkError> {
        self.write("pipeline", pipeline.name(), pipeline)
    }

    fn apply_structure(&mut self, structure: &PipelineStructure) -> Result<(), SinkError> {
        self.write("structure", &structure.metadata.name, structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, NoPodTemplates, compile};
    use crate::pipeline::PipelineDefinition;
    use tempfile::TempDir;

    #[test]
    fn test_directory_sink_writes_every_resource() {
        let def = PipelineDefinition::from_yaml(
            r"
agent:
  image: node
stages:
  - name: Install
    steps:
      - command: npm ci
  - name: Test
    steps:
      - command: npm test
",
        )
        .unwrap();
        let compiled = compile(&def, &CompileOptions::new("web", "12"), &NoPodTemplates).unwrap();

        let dir = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("out")).unwrap();
        sink.apply_all(&compiled).unwrap();

        let names: Vec<String> = sink
            .written()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "task-web-install-12.yaml",
                "task-web-test-12.yaml",
                "pipeline-web-12.yaml",
                "structure-web-12.yaml",
            ]
        );

        let text = fs::read_to_string(sink.dir().join("pipeline-web-12.yaml")).unwrap();
        let pipeline: Pipeline = serde_yaml::from_str(&text).unwrap();
        assert_eq!(pipeline, compiled.pipeline);
    }
}
