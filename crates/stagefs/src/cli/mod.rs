//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};

use crate::config::StageConfig;
use crate::layer::LayerChoice;
use crate::mount::{MountSpec, RecordingMounter, System};

/// stagefs - container mount staging
#[derive(Parser)]
#[command(name = "stagefs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "STAGEFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Helper commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print the ordered mount plan for a JSON mount list
    Plan {
        /// JSON file holding a list of mounts
        mounts: PathBuf,

        /// Stage a session in this existing directory
        #[arg(long)]
        session: Option<PathBuf>,

        /// Override the configured layer
        #[arg(long, value_parser = parse_layer)]
        layer: Option<LayerChoice>,

        /// SELinux context for eligible mounts
        #[arg(long)]
        context: Option<String>,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate and print a configuration
    Config {
        /// Configuration file (default: /etc/stagefs/stagefs.toml)
        file: Option<PathBuf>,
    },
}

fn parse_layer(value: &str) -> Result<LayerChoice, String> {
    match value {
        "overlay" => Ok(LayerChoice::Overlay),
        "underlay" => Ok(LayerChoice::Underlay),
        "none" => Ok(LayerChoice::None),
        "auto" => Ok(LayerChoice::Auto),
        other => Err(format!("unknown layer {other}, expected overlay, underlay, none or auto")),
    }
}

impl Cli {
    /// Execute the CLI command.
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Plan {
                mounts,
                session,
                layer,
                context,
                json,
            } => {
                let mut config = load_config(self.config.as_ref())?;
                if let Some(layer) = layer {
                    config = config.with_layer(layer);
                }
                if let Some(context) = context {
                    config = config.with_selinux_context(context);
                }

                let content = std::fs::read_to_string(&mounts)
                    .wrap_err_with(|| format!("Failed to read {}", mounts.display()))?;
                let specs: Vec<MountSpec> = serde_json::from_str(&content)?;

                let mut points = config.points()?;
                points.import_from_spec(&specs)?;

                let recorder = RecordingMounter::new();
                let mut system = System::new(points, recorder.clone());
                if let Some(dir) = session {
                    config = config.with_session_dir(dir);
                    let session = config.session(&mut system)?;
                    tracing::info!(
                        final_path = %session.borrow().final_path().display(),
                        "Session staged"
                    );
                }
                system.mount_all()?;

                let calls = recorder.calls();
                if json {
                    let plan: Vec<MountSpec> = calls.iter().map(MountSpec::from).collect();
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                } else {
                    for point in &calls {
                        println!("{:<10} {point}", point.tag().as_str());
                    }
                }
                Ok(())
            }

            Commands::Config { file } => {
                let config = load_config(file.as_ref().or(self.config.as_ref()))?;
                print!("{}", config.to_toml()?);
                Ok(())
            }
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<StageConfig> {
    let path = path.unwrap_or(&*stagefs_common::paths::CONFIG_FILE);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No configuration file, using defaults");
        return Ok(StageConfig::default());
    }
    StageConfig::from_file(path)
        .wrap_err_with(|| format!("Invalid configuration {}", path.display()))
}
