//! CLI tools for tekline
//!
//! - `validate`: Load and validate a pipeline file
//! - `compile`: Compile a pipeline into Task, Pipeline and structure manifests
//! - `completions`: Generate shell completions

pub mod compile;
pub mod completions;
pub mod validate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tekline::infrastructure::{
    Config, DirectoryImports, NoImports, PipelineLoader, init_logging,
};
use tekline::pipeline::PipelineDefinition;

/// CLI arguments for tekline
#[derive(Parser, Debug)]
#[command(name = "tekline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a pipeline file
    Validate {
        /// Pipeline file to validate
        file: PathBuf,
        /// Directory holding named imports
        #[arg(long)]
        imports: Option<PathBuf>,
    },

    /// Compile a pipeline file
    Compile {
        /// Pipeline file to compile
        file: PathBuf,
        /// Pipeline identifier (defaults to the file name)
        #[arg(long)]
        pipeline_id: Option<String>,
        /// Build identifier
        #[arg(long, default_value = "1")]
        build_id: String,
        /// Namespace for generated resources
        #[arg(short, long)]
        namespace: Option<String>,
        /// Output format when printing to stdout
        #[arg(short, long, value_enum, default_value_t = FormatArg::Yaml)]
        format: FormatArg,
        /// Directory to write manifests to (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// YAML map of image to pod template
        #[arg(long)]
        pod_templates: Option<PathBuf>,
        /// Directory holding named imports
        #[arg(long)]
        imports: Option<PathBuf>,
        /// YAML list of build pack overrides
        #[arg(long)]
        overrides: Option<PathBuf>,
        /// Label added to every resource
        #[arg(short, long = "label", value_name = "KEY=VALUE", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Yaml,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

fn parse_label(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{value}'")),
    }
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    use clap::CommandFactory;
    Args::command()
}

/// Loads a pipeline file, resolving named imports under `imports`
pub fn load_definition(file: &Path, imports: Option<&Path>) -> Result<PipelineDefinition> {
    let def = match imports {
        Some(root) => {
            let resolver = DirectoryImports::new(root);
            PipelineLoader::new(&resolver).load(file)
        }
        None => PipelineLoader::new(&NoImports).load(file),
    };
    def.with_context(|| format!("Failed to load pipeline: {}", file.display()))
}

/// Parse and execute CLI arguments
pub fn run() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        let level = Config::from_env().log_level;
        init_logging(&level);
    }

    match args.command {
        Command::Validate { file, imports } => {
            let def = validate::validate_pipeline(&file, imports.as_deref())?;
            println!("{}: valid ({} stages)", file.display(), def.stage_count());
        }
        Command::Compile {
            file,
            pipeline_id,
            build_id,
            namespace,
            format,
            output,
            config,
            pod_templates,
            imports,
            overrides,
            labels,
        } => {
            let compile_args = compile::CompileArgs {
                pipeline_id: pipeline_id.unwrap_or_else(|| {
                    file.file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("pipeline")
                        .to_string()
                }),
                file,
                build_id,
                namespace,
                format: match format {
                    FormatArg::Yaml => compile::OutputFormat::Yaml,
                    FormatArg::Json => compile::OutputFormat::Json,
                },
                config,
                pod_templates,
                imports,
                overrides,
                labels,
            };

            let compiled = compile::compile_pipeline(&compile_args)?;

            if let Some(output_dir) = output {
                let written = compile::write_manifests(&compiled, &output_dir)?;
                println!("Wrote {} manifests to {}", written, output_dir.display());
            } else {
                print!("{}", compile::render(&compiled, compile_args.format)?);
            }
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{completions}");
            }
        }
    }

    Ok(())
}
