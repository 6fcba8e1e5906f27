use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use stemforge_core::{janitor, Config};

pub async fn run(max_age_hours: Option<u64>, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    let max_age = match max_age_hours {
        Some(hours) => Duration::from_secs(hours.saturating_mul(3600)),
        None => config.retention_max_age(),
    };
    let roots = vec![
        config.storage.upload_dir.clone(),
        config.storage.processed_dir.clone(),
    ];

    println!(
        "Removing files older than {}h from {} and {}",
        max_age.as_secs() / 3600,
        config.storage.upload_dir.display(),
        config.storage.processed_dir.display()
    );

    let report = janitor::sweep_async(roots, max_age).await;

    println!(
        "Removed {} file(s) and {} empty dir(s), freed {:.1} MiB",
        report.removed_files,
        report.removed_dirs,
        report.freed_bytes as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}
