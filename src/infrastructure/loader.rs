//! Pipeline file loading
//!
//! Reads pipeline YAML from disk and resolves `extends` chains before
//! anything is validated. Named imports are located through an
//! [`ImportFileResolver`]; plain files are found next to the including file.

use crate::pipeline::{PipelineDefinition, scoped_env};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Longest `extends` chain followed before giving up
pub const MAX_EXTENDS_DEPTH: usize = 16;

/// Error loading a pipeline file
#[derive(Error, Debug)]
pub enum LoadError {
    /// A file could not be read
    #[error("Failed to load file {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// A file is not a valid pipeline document
    #[error("Failed to parse file {path}: {source}")]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// Underlying error
        source: serde_yaml::Error,
    },

    /// The resolved base pipeline does not exist
    #[error("base pipeline file does not exist {0}")]
    MissingBase(PathBuf),

    /// A named import could not be resolved
    #[error("Failed to resolve import {import} for file {file}: {message}")]
    Resolve {
        /// Import name
        import: String,
        /// File within the import
        file: String,
        /// Resolver's explanation
        message: String,
    },

    /// The `extends` chain is longer than [`MAX_EXTENDS_DEPTH`], usually a cycle
    #[error("extends chain starting at {0} is too deep")]
    TooDeep(PathBuf),
}

/// Locates a file inside a named import
pub trait ImportFileResolver {
    /// Returns the local path of `file` within `import`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Resolve`] if the import is unknown.
    fn resolve(&self, import: &str, file: &str) -> Result<PathBuf, LoadError>;
}

impl<F> ImportFileResolver for F
where
    F: Fn(&str, &str) -> Result<PathBuf, LoadError>,
{
    fn resolve(&self, import: &str, file: &str) -> Result<PathBuf, LoadError> {
        self(import, file)
    }
}

/// Resolver that rejects every named import
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl ImportFileResolver for NoImports {
    fn resolve(&self, import: &str, file: &str) -> Result<PathBuf, LoadError> {
        Err(LoadError::Resolve {
            import: import.to_string(),
            file: file.to_string(),
            message: "no import resolver configured".to_string(),
        })
    }
}

/// Resolver mapping each import to a directory `<root>/<import>`
#[derive(Debug, Clone)]
pub struct DirectoryImports {
    root: PathBuf,
}

impl DirectoryImports {
    /// Creates a resolver rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImportFileResolver for DirectoryImports {
    fn resolve(&self, import: &str, file: &str) -> Result<PathBuf, LoadError> {
        Ok(self.root.join(import).join(file))
    }
}

/// Loads pipeline files, following `extends`
pub struct PipelineLoader<'a> {
    resolver: &'a dyn ImportFileResolver,
}

impl Default for PipelineLoader<'_> {
    fn default() -> Self {
        Self { resolver: &NoImports }
    }
}

impl<'a> PipelineLoader<'a> {
    /// Creates a loader resolving named imports with `resolver`
    pub fn new(resolver: &'a dyn ImportFileResolver) -> Self {
        Self { resolver }
    }

    /// Loads `path` with its base pipelines merged in.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if any file in the chain cannot be read,
    /// parsed or found.
    pub fn load(&self, path: &Path) -> Result<PipelineDefinition, LoadError> {
        self.load_chain(path, 0)
    }

    fn load_chain(&self, path: &Path, depth: usize) -> Result<PipelineDefinition, LoadError> {
        if depth > MAX_EXTENDS_DEPTH {
            return Err(LoadError::TooDeep(path.to_path_buf()));
        }

        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let def: PipelineDefinition =
            serde_yaml::from_str(&text).map_err(|source| LoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let Some(extends) = def.extends.as_ref().filter(|e| !e.file.is_empty()) else {
            return Ok(def);
        };

        let base_path = if extends.import.is_empty() {
            let file = Path::new(&extends.file);
            match path.parent() {
                Some(dir) if !file.is_absolute() => dir.join(file),
                _ => file.to_path_buf(),
            }
        } else {
            self.resolver.resolve(&extends.import, &extends.file)?
        };
        if !base_path.is_file() {
            return Err(LoadError::MissingBase(base_path));
        }

        info!(
            file = %path.display(),
            base = %base_path.display(),
            "Extending pipeline"
        );
        let base = self.load_chain(&base_path, depth + 1)?;
        Ok(extend_definition(base, def))
    }
}

/// Merges `child` over `base`.
///
/// Agent, options, directory and post blocks of the child win when set.
/// Environment is scoped with the child's variables taking precedence.
/// Stages of the child replace the base stages unless the child has none.
pub fn extend_definition(base: PipelineDefinition, child: PipelineDefinition) -> PipelineDefinition {
    debug!(
        base_stages = base.stages.len(),
        child_stages = child.stages.len(),
        "Merging base pipeline"
    );
    let env = scoped_env(child.env(), base.env());
    PipelineDefinition {
        extends: None,
        agent: child.agent.or(base.agent),
        env,
        environment: Vec::new(),
        options: child.options.or(base.options),
        stages: if child.stages.is_empty() {
            base.stages
        } else {
            child.stages
        },
        post: if child.post.is_empty() {
            base.post
        } else {
            child.post
        },
        dir: child.dir.or(base.dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Agent;
    use tempfile::TempDir;

    const BASE: &str = r"
agent:
  image: maven
env:
  - name: SHARED
    value: base
  - name: BASE_ONLY
    value: '1'
stages:
  - name: Build
    steps:
      - command: mvn install
";

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_plain_file() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "pipeline.yaml", BASE);

        let def = PipelineLoader::default().load(&path).unwrap();
        assert_eq!(def.agent, Some(Agent::image("maven")));
        assert_eq!(def.stages[0].name, "Build");
    }

    #[test]
    fn test_extends_relative_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "base.yaml", BASE);
        let child = write(
            dir.path(),
            "pipeline.yaml",
            r"
extends:
  file: base.yaml
env:
  - name: SHARED
    value: child
",
        );

        let def = PipelineLoader::default().load(&child).unwrap();
        assert!(def.extends.is_none());
        assert_eq!(def.agent, Some(Agent::image("maven")));
        assert_eq!(def.stages.len(), 1);
        let shared = def.env.iter().find(|e| e.name == "SHARED").unwrap();
        assert_eq!(shared.value, "child");
        assert!(def.env.iter().any(|e| e.name == "BASE_ONLY"));
    }

    #[test]
    fn test_child_stages_replace_base() {
        let base = PipelineDefinition::from_yaml(BASE).unwrap();
        let child = PipelineDefinition::from_yaml(
            r"
agent:
  image: gradle
stages:
  - name: Test
    steps:
      - command: gradle test
",
        )
        .unwrap();

        let merged = extend_definition(base, child);
        assert_eq!(merged.agent, Some(Agent::image("gradle")));
        assert_eq!(merged.stages.len(), 1);
        assert_eq!(merged.stages[0].name, "Test");
    }

    #[test]
    fn test_named_import() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "imports/buildpacks/maven/pipeline.yaml", BASE);
        let child = write(
            dir.path(),
            "project/pipeline.yaml",
            r"
extends:
  import: buildpacks
  file: maven/pipeline.yaml
",
        );

        let resolver = DirectoryImports::new(dir.path().join("imports"));
        let def = PipelineLoader::new(&resolver).load(&child).unwrap();
        assert_eq!(def.stages[0].name, "Build");

        let err = PipelineLoader::default().load(&child).unwrap_err();
        assert!(matches!(err, LoadError::Resolve { .. }));
    }

    #[test]
    fn test_closure_resolver() {
        let dir = TempDir::new().unwrap();
        let base = write(dir.path(), "shared/base.yaml", BASE);
        let child = write(
            dir.path(),
            "pipeline.yaml",
            "extends:\n  import: anything\n  file: base.yaml\n",
        );

        let resolver = move |_: &str, _: &str| -> Result<PathBuf, LoadError> { Ok(base.clone()) };
        let def = PipelineLoader::new(&resolver).load(&child).unwrap();
        assert_eq!(def.stages.len(), 1);
    }

    #[test]
    fn test_missing_base() {
        let dir = TempDir::new().unwrap();
        let child = write(dir.path(), "pipeline.yaml", "extends:\n  file: nope.yaml\n");

        let err = PipelineLoader::default().load(&child).unwrap_err();
        assert!(matches!(err, LoadError::MissingBase(_)));
    }

    #[test]
    fn test_extends_cycle() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "pipeline.yaml", "extends:\n  file: pipeline.yaml\n");

        let err = PipelineLoader::default().load(&path).unwrap_err();
        assert!(matches!(err, LoadError::TooDeep(_)));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "pipeline.yaml", "stagez: []\n");

        let err = PipelineLoader::default().load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }
}
