use anyhow::{Context, Result};
use std::path::Path;
use stemforge_core::Config;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("stemforge configuration\n");

    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("{}", rendered);

    if config.paths.ffmpeg.is_none() {
        println!("# paths.ffmpeg: (auto-detect)");
    }
    if config.paths.python.is_none() {
        println!("# paths.python: (auto-detect, venv first)");
    }

    // Show config file locations
    println!("\nConfig sources (later entries win):");
    if let Some(p) = Config::default_config_file() {
        println!("  1. {}", p.display());
    }
    if let Some(p) = config_path {
        println!("  2. {} (specified)", p.display());
    }
    println!("  3. Environment variables (STEMFORGE_*, nested keys with __)");
    println!("  4. PORT");

    Ok(())
}
