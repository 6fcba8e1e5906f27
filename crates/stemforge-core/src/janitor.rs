//! Retention sweeps over the upload and processed directories

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What one sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    pub freed_bytes: u64,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.removed_files += other.removed_files;
        self.removed_dirs += other.removed_dirs;
        self.freed_bytes += other.freed_bytes;
    }
}

/// Delete files last modified more than `max_age` ago under each root, then
/// prune directories that are empty and either expired or emptied by this
/// sweep. The roots themselves are kept.
pub fn sweep(roots: &[PathBuf], max_age: Duration) -> SweepReport {
    let cutoff: DateTime<Utc> = match chrono::Duration::from_std(max_age) {
        Ok(age) => Utc::now() - age,
        Err(_) => return SweepReport::default(),
    };

    let mut report = SweepReport::default();
    for root in roots {
        if root.is_dir() {
            report.merge(sweep_root(root, cutoff));
        }
    }

    if report.removed_files > 0 || report.removed_dirs > 0 {
        info!(
            "Retention sweep removed {} file(s), {} dir(s), {} bytes",
            report.removed_files, report.removed_dirs, report.freed_bytes
        );
    }
    report
}

/// [`sweep`] on the blocking pool
pub async fn sweep_async(roots: Vec<PathBuf>, max_age: Duration) -> SweepReport {
    match tokio::task::spawn_blocking(move || sweep(&roots, max_age)).await {
        Ok(report) => report,
        Err(e) => {
            warn!("Retention sweep task failed: {}", e);
            SweepReport::default()
        }
    }
}

fn sweep_root(root: &Path, cutoff: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();
    let mut emptied: HashSet<PathBuf> = HashSet::new();

    // contents_first yields children before their directory, so emptiness
    // checks see the result of this sweep
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .contents_first(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();

        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let expired = modified_at(&meta) < cutoff;

        if entry.file_type().is_dir() {
            let empty = std::fs::read_dir(path)
                .map(|mut it| it.next().is_none())
                .unwrap_or(false);
            // A fresh empty dir may be a job that has not written yet
            if empty && (expired || emptied.contains(path)) && std::fs::remove_dir(path).is_ok() {
                debug!("Removed empty directory {}", path.display());
                report.removed_dirs += 1;
                if let Some(parent) = path.parent() {
                    emptied.insert(parent.to_path_buf());
                }
            }
            continue;
        }

        if !expired {
            continue;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed expired {}", path.display());
                report.removed_files += 1;
                report.freed_bytes += meta.len();
                if let Some(parent) = path.parent() {
                    emptied.insert(parent.to_path_buf());
                }
            }
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }

    report
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().unwrap_or_else(|_| SystemTime::now()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn backdate(path: &Path, age: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_sweep_removes_expired_and_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        let processed = dir.path().join("processed");
        fs::create_dir_all(processed.join("old_song")).unwrap();
        fs::create_dir_all(processed.join("new_song")).unwrap();
        fs::create_dir_all(&uploads).unwrap();

        let old_upload = uploads.join("old_song.mp3");
        let old_stem = processed.join("old_song/vocals.wav");
        let new_stem = processed.join("new_song/vocals.wav");
        fs::write(&old_upload, b"0123456789").unwrap();
        fs::write(&old_stem, b"01234").unwrap();
        fs::write(&new_stem, b"fresh").unwrap();
        backdate(&old_upload, Duration::from_secs(48 * 3600));
        backdate(&old_stem, Duration::from_secs(48 * 3600));

        let report = sweep(&[uploads.clone(), processed.clone()], Duration::from_secs(24 * 3600));

        assert_eq!(
            report,
            SweepReport {
                removed_files: 2,
                removed_dirs: 1,
                freed_bytes: 15,
            }
        );
        assert!(!old_upload.exists());
        assert!(!processed.join("old_song").exists());
        assert!(new_stem.exists());
        assert!(uploads.exists());
        assert!(processed.exists());
    }

    #[test]
    fn test_sweep_keeps_fresh_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".job-1234");
        fs::create_dir_all(&scratch).unwrap();

        let report = sweep(&[dir.path().to_path_buf()], Duration::from_secs(3600));
        assert_eq!(report.removed_dirs, 0);
        assert!(scratch.exists());
    }

    #[test]
    fn test_sweep_ignores_missing_roots() {
        let dir = tempfile::tempdir().unwrap();
        let report = sweep(&[dir.path().join("nope")], Duration::from_secs(1));
        assert_eq!(report, SweepReport::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_sweep_stays_under_roots() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("processed");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        let keep = outside.join("keep.wav");
        fs::write(&keep, b"data").unwrap();
        backdate(&keep, Duration::from_secs(48 * 3600));
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        sweep(&[root], Duration::from_secs(3600));
        assert!(keep.exists());
    }

    #[tokio::test]
    async fn test_sweep_async() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("old.wav");
        fs::write(&file, b"x").unwrap();
        backdate(&file, Duration::from_secs(7200));

        let report = sweep_async(vec![dir.path().to_path_buf()], Duration::from_secs(3600)).await;
        assert_eq!(report.removed_files, 1);
    }
}
