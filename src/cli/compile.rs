//! `tekline compile` - Compile a pipeline into Tekton resources
//!
//! ## Usage
//!
//! ```bash
//! tekline compile jenkins-x.yml --pipeline-id myapp --build-id 3
//! tekline compile jenkins-x.yml --output target/manifests
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tekline::compiler::{CompiledPipeline, NoPodTemplates, PodTemplate, compile};
use tekline::infrastructure::{Config, DirectorySink, ResourceSink};
use tekline::pipeline::{PipelineOverride, extend_pipeline};

/// Output format for stdout
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-document YAML
    Yaml,
    /// A single JSON object
    Json,
}

/// Inputs to `tekline compile`
#[derive(Debug, Clone)]
pub struct CompileArgs {
    /// Pipeline file
    pub file: PathBuf,
    /// Pipeline identifier
    pub pipeline_id: String,
    /// Build identifier
    pub build_id: String,
    /// Namespace overriding the configured one
    pub namespace: Option<String>,
    /// Output format
    pub format: OutputFormat,
    /// Configuration file
    pub config: Option<PathBuf>,
    /// Pod templates file
    pub pod_templates: Option<PathBuf>,
    /// Named imports directory
    pub imports: Option<PathBuf>,
    /// Build pack overrides file
    pub overrides: Option<PathBuf>,
    /// Extra labels
    pub labels: Vec<(String, String)>,
}

/// Load, validate and compile the pipeline described by `args`
pub fn compile_pipeline(args: &CompileArgs) -> Result<CompiledPipeline> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_env();

    let mut options = config.to_compile_options(&args.pipeline_id, &args.build_id);
    if let Some(namespace) = &args.namespace {
        options = options.with_namespace(namespace);
    }
    for (key, value) in &args.labels {
        options = options.with_label(key, value);
    }

    let mut def = super::load_definition(&args.file, args.imports.as_deref())?;
    if let Some(path) = &args.overrides {
        for override_ in load_overrides(path)? {
            if override_.matches_pipeline(&args.pipeline_id) {
                def = extend_pipeline(def, &override_);
            }
        }
    }
    tracing::debug!(file = %args.file.display(), "Compiling pipeline");

    let compiled = match &args.pod_templates {
        Some(path) => {
            let templates = load_pod_templates(path)?;
            compile(&def, &options, &templates)
        }
        None => compile(&def, &options, &NoPodTemplates),
    };
    compiled.with_context(|| format!("Failed to compile pipeline: {}", args.file.display()))
}

/// Reads a YAML map of image name to pod template
pub fn load_pod_templates(path: &Path) -> Result<BTreeMap<String, PodTemplate>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pod templates: {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("Invalid pod templates: {}", path.display()))
}

/// Reads a YAML list of pipeline overrides
pub fn load_overrides(path: &Path) -> Result<Vec<PipelineOverride>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read overrides: {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("Invalid overrides: {}", path.display()))
}

/// Renders every resource for stdout
pub fn render(compiled: &CompiledPipeline, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(compiled)
                .context("Failed to serialize compiled pipeline")?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Yaml => {
            let mut documents = Vec::with_capacity(compiled.tasks.len() + 2);
            for task in &compiled.tasks {
                documents.push(serde_yaml::to_string(task)?);
            }
            documents.push(serde_yaml::to_string(&compiled.pipeline)?);
            documents.push(serde_yaml::to_string(&compiled.structure)?);
            Ok(documents.join("---\n"))
        }
    }
}

/// Writes one manifest per resource into `dir`, returning how many were written
pub fn write_manifests(compiled: &CompiledPipeline, dir: &Path) -> Result<usize> {
    let mut sink = DirectorySink::new(dir)?;
    sink.apply_all(compiled)?;
    Ok(sink.written().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PIPELINE: &str = r"
agent:
  image: maven
stages:
  - name: Build
    steps:
      - command: mvn
        args: [clean, install]
  - name: Release
    steps:
      - command: mvn deploy
";

    fn args(dir: &Path) -> CompileArgs {
        let file = dir.join("jenkins-x.yml");
        fs::write(&file, PIPELINE).unwrap();
        CompileArgs {
            file,
            pipeline_id: "myapp".to_string(),
            build_id: "2".to_string(),
            namespace: None,
            format: OutputFormat::Yaml,
            config: None,
            pod_templates: None,
            imports: None,
            overrides: None,
            labels: vec![("branch".to_string(), "main".to_string())],
        }
    }

    #[test]
    fn test_compile_pipeline() {
        let dir = TempDir::new().unwrap();
        let compiled = compile_pipeline(&args(dir.path())).unwrap();

        assert_eq!(compiled.pipeline.name(), "myapp-2");
        assert_eq!(compiled.tasks.len(), 2);
        assert_eq!(compiled.tasks[0].metadata.labels["branch"], "main");
    }

    #[test]
    fn test_namespace_and_config() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("tekline.yaml");
        fs::write(&config, "namespace: from-config\nsourceDir: src\n").unwrap();

        let mut args = args(dir.path());
        args.config = Some(config);
        let compiled = compile_pipeline(&args).unwrap();
        assert_eq!(compiled.tasks[0].metadata.namespace, "from-config");
        assert_eq!(
            compiled.tasks[0].spec.steps[1].working_dir,
            "/workspace/src"
        );

        args.namespace = Some("override".to_string());
        let compiled = compile_pipeline(&args).unwrap();
        assert_eq!(compiled.pipeline.metadata.namespace, "override");
    }

    #[test]
    fn test_pod_templates() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates.yaml");
        fs::write(
            &templates,
            r"
maven:
  containers:
    - name: maven
      image: maven:3.6-jdk-8
      command: [/bin/sh, -c]
",
        )
        .unwrap();

        let mut args = args(dir.path());
        args.pod_templates = Some(templates);
        let compiled = compile_pipeline(&args).unwrap();
        assert_eq!(compiled.tasks[0].spec.steps[1].image, "maven:3.6-jdk-8");
    }

    #[test]
    fn test_overrides() {
        let dir = TempDir::new().unwrap();
        let overrides = dir.path().join("overrides.yaml");
        fs::write(
            &overrides,
            r"
- pipeline: myapp
  stage: Build
  type: before
  step:
    command: make lint
- pipeline: other
  stage: Release
  steps: []
",
        )
        .unwrap();

        let mut args = args(dir.path());
        args.overrides = Some(overrides);
        let compiled = compile_pipeline(&args).unwrap();

        assert_eq!(compiled.tasks.len(), 2);
        assert_eq!(compiled.tasks[0].spec.steps[1].args, vec!["make lint"]);
        assert_eq!(compiled.tasks[0].spec.steps[2].args, vec!["mvn clean install"]);
    }

    #[test]
    fn test_invalid_pipeline_fails() {
        let dir = TempDir::new().unwrap();
        let args = args(dir.path());
        fs::write(&args.file, "stages: []\n").unwrap();

        let err = compile_pipeline(&args).unwrap_err();
        assert!(format!("{err:#}").contains("missing field(s): stages"));
    }

    #[test]
    fn test_render_formats() {
        let dir = TempDir::new().unwrap();
        let compiled = compile_pipeline(&args(dir.path())).unwrap();

        let yaml = render(&compiled, OutputFormat::Yaml).unwrap();
        assert_eq!(yaml.matches("---\n").count(), 3);
        assert!(yaml.contains("kind: Pipeline"));

        let json = render(&compiled, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["pipeline"]["metadata"]["name"], "myapp-2");
    }

    #[test]
    fn test_write_manifests() {
        let dir = TempDir::new().unwrap();
        let compiled = compile_pipeline(&args(dir.path())).unwrap();

        let written = write_manifests(&compiled, &dir.path().join("out")).unwrap();
        assert_eq!(written, 4);
        assert!(dir.path().join("out/pipeline-myapp-2.yaml").exists());
    }
}
