//! tekline - compile declarative YAML pipelines into Tekton resources
//!
//! ## Commands
//!
//! - `tekline validate` - Load and validate a pipeline file
//! - `tekline compile` - Emit Task, Pipeline and structure manifests
//! - `tekline completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate a pipeline
//! tekline validate jenkins-x.yml
//!
//! # Print the compiled resources
//! tekline compile jenkins-x.yml --pipeline-id myapp --build-id 7
//!
//! # Write one manifest per resource
//! tekline compile jenkins-x.yml --output target/manifests
//!
//! # Generate shell completions
//! tekline completions bash > /etc/bash_completion.d/tekline
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    // Initialize tracing for debugging
    if std::env::var("TEKLINE_DEBUG").is_ok() {
        tekline::infrastructure::init_logging("debug");
    }

    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if std::env::var("TEKLINE_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
