use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use stemforge_core::Config;
use stemforge_models::SpleeterModel;
use tokio::process::Command;
use which::which;

/// Packages for the separation worker
const PACKAGES: &[&str] = &["spleeter>=2.3.0"];

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("Setting up Python environment and separation model...\n");

    // Get data directory for venv
    let data_dir = dirs::data_dir()
        .context("Could not determine data directory")?
        .join("stemforge");

    let venv_dir = data_dir.join("venv");
    let venv_python = venv_dir.join("bin/python");
    let venv_pip = venv_dir.join("bin/pip");

    // Find system Python
    let python = which("python3").context(
        "Python 3 not found. Install Python 3.8-3.10 (required by Spleeter)",
    )?;

    // Create venv if it doesn't exist
    if !venv_dir.exists() {
        println!("Creating virtual environment at {}...", venv_dir.display());
        std::fs::create_dir_all(&data_dir)?;

        let status = Command::new(&python)
            .args(["-m", "venv"])
            .arg(&venv_dir)
            .status()
            .await
            .context("Failed to create virtual environment")?;

        if !status.success() {
            anyhow::bail!("Failed to create virtual environment");
        }
        println!("Virtual environment created.\n");
    } else {
        println!("Virtual environment exists at {}\n", venv_dir.display());
    }

    run_step("Upgrading pip", Command::new(&venv_pip).args(["install", "--upgrade", "pip"])).await?;

    for package in PACKAGES {
        let name = package.split(">=").next().unwrap_or(package);
        run_step(
            &format!("Installing {}", name),
            Command::new(&venv_pip).args(["install", package]),
        )
        .await?;
    }

    // Spleeter fetches pretrained weights on first use; do it now
    let model = SpleeterModel::from_str(&config.separation.model).unwrap_or(SpleeterModel::TwoStems);
    let warm_script = format!(
        "import numpy as np\nfrom spleeter.separator import Separator\nSeparator('{}').separate(np.zeros((44100, 2), dtype='float32'))\n",
        model.id()
    );
    if let Err(e) = run_step(
        &format!("Downloading {} weights", model),
        Command::new(&venv_python).args(["-c", &warm_script]),
    )
    .await
    {
        println!("Warning: {:#}. The weights will be downloaded when the server starts.", e);
    }

    println!("\n=== Setup Complete ===");
    println!("Run 'stemforge doctor' to verify installation.");

    Ok(())
}

/// Run one quiet setup command behind a spinner
async fn run_step(label: &str, command: &mut Command) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")?);
    pb.set_message(format!("{}...", label));
    pb.enable_steady_tick(Duration::from_millis(120));

    let output = command
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("{} failed to start", label))?;

    if output.status.success() {
        pb.finish_with_message(format!("{}... OK", label));
        Ok(())
    } else {
        pb.finish_with_message(format!("{}... FAILED", label));
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        anyhow::bail!(
            "{} failed: {}",
            label,
            tail.into_iter().rev().collect::<Vec<_>>().join("\n")
        )
    }
}
