use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stemforge")]
#[command(author, version, about = "HTTP front-end for stem separation and noise reduction")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server options when no subcommand is given (same as `serve`)
    #[command(flatten)]
    pub serve: ServeOptions,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve(ServeOptions),

    /// Check external tools and the separation model
    Doctor,

    /// Show the effective configuration
    Config,

    /// Create the Python environment and install Spleeter
    SetupModels,

    /// Delete old uploads and outputs once
    Clean {
        /// Delete files older than this many hours (default: retention.max_age_hours)
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct ServeOptions {
    /// Listen port (overrides PORT and the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listen address
    #[arg(long)]
    pub host: Option<String>,

    /// Start without loading the separation model
    #[arg(long)]
    pub no_separation: bool,
}
