mod args;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let filter = match cli.verbose {
        0 => "stemforge=info,stemforge_core=info,stemforge_models=info,tower_http=info",
        1 => "stemforge=debug,stemforge_core=debug,stemforge_models=debug,tower_http=debug",
        2 => "stemforge=trace,stemforge_core=trace,stemforge_models=trace,tower_http=debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Some(Commands::Serve(options)) => commands::serve::run(&options, config).await,
        Some(Commands::Doctor) => commands::doctor::run(config).await,
        Some(Commands::Config) => commands::config::run(config).await,
        Some(Commands::SetupModels) => commands::setup_models::run(config).await,
        Some(Commands::Clean { max_age_hours }) => commands::clean::run(max_age_hours, config).await,
        None => commands::serve::run(&cli.serve, config).await,
    }
}
