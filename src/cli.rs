use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Manage the GPU workload container on Podman or Docker.
#[derive(Parser, Debug)]
#[command(name = "gpuctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Engine binary to use instead of probing podman, then docker
    #[arg(long, global = true, env = "GPUCTL_ENGINE")]
    pub engine: Option<String>,

    /// Work directory holding `.gpuctl.yaml` and the build context
    #[arg(short = 'C', long = "dir", global = true)]
    pub dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the workload image
    Build,
    /// Replace any existing container and open an interactive session
    Run,
    /// Start the container in the background (no-op if already running)
    Start,
    /// Run a command inside the running container
    Exec {
        /// Command and arguments; defaults to the configured shell
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Stop and remove the container
    Stop,
    /// Regenerate the CDI specification for the NVIDIA GPU
    SetupCdi,
    /// Show the probed environment and container state
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check repository artifacts and host prerequisites
    Validate {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}
