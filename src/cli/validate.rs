//! `tekline validate` - Check a pipeline file without compiling it
//!
//! ## Usage
//!
//! ```bash
//! tekline validate jenkins-x.yml
//! # Exit code 0: pipeline is valid
//! # Exit code 1: the first problem found is reported with its field path
//! ```

use anyhow::{Context, Result};
use std::path::Path;
use tekline::pipeline::{PipelineDefinition, Validate};

/// Loads `file`, resolving `extends`, and validates the result
pub fn validate_pipeline(file: &Path, imports: Option<&Path>) -> Result<PipelineDefinition> {
    tracing::debug!("Validating pipeline: {}", file.display());

    let def = super::load_definition(file, imports)?;
    def.validate()
        .with_context(|| format!("Pipeline validation failed for: {}", file.display()))?;

    tracing::info!("Pipeline validation successful: {}", file.display());
    Ok(def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_valid_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("jenkins-x.yml");
        fs::write(
            &file_path,
            "agent:\n  label: jenkins-go\nstages:\n  - name: Build\n    steps:\n      - command: make\n",
        )
        .unwrap();

        let def = validate_pipeline(&file_path, None).unwrap();
        assert_eq!(def.stage_count(), 1);
    }

    #[test]
    fn test_validate_reports_field_path() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("jenkins-x.yml");
        fs::write(
            &file_path,
            "stages:\n  - name: Build\n    steps:\n      - command: make\n",
        )
        .unwrap();

        let err = validate_pipeline(&file_path, None).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("No agent specified for stage or for its parent(s)"));
        assert!(message.contains("stages[0].agent"));
    }

    #[test]
    fn test_validate_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = validate_pipeline(&temp_dir.path().join("absent.yml"), None);
        assert!(result.is_err());
    }
}
