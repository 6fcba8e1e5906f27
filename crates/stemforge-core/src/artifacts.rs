//! Declared job outputs and safe lookup under the processed root

use crate::error::{Result, StemforgeError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error};

/// URL prefix the processed root is served under
pub const PROCESSED_ROUTE: &str = "/processed";

/// One file a job promises to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Logical name: "vocals", "accompaniment", "enhanced", ...
    pub name: String,
    /// Location on disk
    pub path: PathBuf,
    /// Servable URL, `/processed/<relative path>`
    pub url: String,
}

impl OutputArtifact {
    /// Declare `relative` (slash separated) under `processed_dir`
    pub fn new(name: impl Into<String>, processed_dir: &Path, relative: &str) -> Self {
        let path = relative
            .split('/')
            .fold(processed_dir.to_path_buf(), |acc, part| acc.join(part));
        Self {
            name: name.into(),
            path,
            url: format!("{}/{}", PROCESSED_ROUTE, relative),
        }
    }
}

/// The outputs of one finished job, keyed by logical name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    artifacts: Vec<OutputArtifact>,
}

impl JobOutput {
    pub fn new(artifacts: Vec<OutputArtifact>) -> Self {
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &[OutputArtifact] {
        &self.artifacts
    }

    pub fn get(&self, name: &str) -> Option<&OutputArtifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Logical name → URL, the shape returned to clients
    pub fn urls(&self) -> BTreeMap<String, String> {
        self.artifacts
            .iter()
            .map(|a| (a.name.clone(), a.url.clone()))
            .collect()
    }
}

/// Response body of a successful job
#[derive(Debug, Clone, Serialize)]
pub struct FilesResponse {
    pub files: BTreeMap<String, String>,
}

impl From<&JobOutput> for FilesResponse {
    fn from(output: &JobOutput) -> Self {
        Self {
            files: output.urls(),
        }
    }
}

/// Every declared artifact must exist as a non-empty regular file
pub async fn verify_outputs(artifacts: &[OutputArtifact]) -> Result<()> {
    for artifact in artifacts {
        let present = match tokio::fs::metadata(&artifact.path).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        };

        if !present {
            error!(
                stage = "verify",
                artifact = %artifact.name,
                path = %artifact.path.display(),
                "Declared output missing or empty"
            );
            return Err(StemforgeError::MissingOutput {
                name: artifact.name.clone(),
                path: artifact.path.clone(),
            });
        }
    }
    debug!("Verified {} output(s)", artifacts.len());
    Ok(())
}

/// Map a request path to a file under `root`.
///
/// Only plain name components are accepted. The canonical result must stay
/// under the canonical root, which also rules out symlinks pointing outside.
pub fn resolve_processed(root: &Path, relative: &str) -> Result<PathBuf> {
    let not_found = || StemforgeError::NotFound(relative.to_string());

    let relative = relative.trim_start_matches('/');
    if relative.is_empty() || relative.contains('\\') || relative.contains('\0') {
        return Err(not_found());
    }

    let mut candidate = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => candidate.push(part),
            _ => return Err(not_found()),
        }
    }

    let canonical_root = root.canonicalize().map_err(|_| not_found())?;
    let canonical = candidate.canonicalize().map_err(|_| not_found())?;

    if !canonical.starts_with(&canonical_root) || !canonical.is_file() {
        return Err(not_found());
    }
    Ok(canonical)
}
