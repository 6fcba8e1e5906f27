//! Spleeter source separation via a persistent Python worker

use crate::{SeparationError, StemSeparator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Worker loop: builds the model once, then serves one JSON request per line.
const WORKER_SCRIPT: &str = r#"
import json
import os
import sys

os.environ.setdefault("TF_CPP_MIN_LOG_LEVEL", "3")

# Protocol messages use the real stdout, library chatter goes to stderr
channel = sys.stdout
sys.stdout = sys.stderr

def reply(message):
    channel.write(json.dumps(message) + "\n")
    channel.flush()

try:
    from spleeter.separator import Separator
except ImportError as e:
    reply({"ready": False, "code": "missing_dependency", "error": str(e)})
    sys.exit(1)

try:
    separator = Separator(sys.argv[1])
    if sys.argv[2] == "1":
        import numpy as np
        separator.separate(np.zeros((4096, 2), dtype=np.float32))
except Exception as e:
    reply({"ready": False, "code": "model_init", "error": str(e)})
    sys.exit(2)

reply({"ready": True})

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        request = json.loads(line)
        separator.separate_to_file(
            request["input"],
            request["output_dir"],
            codec=request.get("codec", "wav"),
        )
        reply({"ok": True})
    except Exception as e:
        reply({"ok": False, "error": str(e)})
"#;

/// Pre-trained Spleeter model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpleeterModel {
    TwoStems,
    FourStems,
    FiveStems,
}

impl SpleeterModel {
    pub fn id(&self) -> &'static str {
        match self {
            SpleeterModel::TwoStems => "spleeter:2stems",
            SpleeterModel::FourStems => "spleeter:4stems",
            SpleeterModel::FiveStems => "spleeter:5stems",
        }
    }

    pub fn stems(&self) -> &'static [&'static str] {
        match self {
            SpleeterModel::TwoStems => &["vocals", "accompaniment"],
            SpleeterModel::FourStems => &["vocals", "drums", "bass", "other"],
            SpleeterModel::FiveStems => &["vocals", "drums", "bass", "piano", "other"],
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let name = s.trim().to_lowercase();
        match name.strip_prefix("spleeter:").unwrap_or(&name) {
            "2stems" => Some(SpleeterModel::TwoStems),
            "4stems" => Some(SpleeterModel::FourStems),
            "5stems" => Some(SpleeterModel::FiveStems),
            _ => None,
        }
    }
}

impl std::fmt::Display for SpleeterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[derive(Debug, Serialize)]
struct SeparateRequest<'a> {
    input: &'a Path,
    output_dir: &'a Path,
    codec: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerMessage {
    #[serde(default)]
    ready: Option<bool>,
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct WorkerIo {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl WorkerIo {
    /// One request line out, one reply line in
    async fn exchange(&mut self, request: &str) -> Result<String, SeparationError> {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("Spleeter worker already exited: {}", status);
            return Err(SeparationError::WorkerExited);
        }

        self.stdin
            .write_all(request.as_bytes())
            .await
            .map_err(pipe_error)?;
        self.stdin.flush().await.map_err(pipe_error)?;

        self.stdout
            .next_line()
            .await?
            .ok_or(SeparationError::WorkerExited)
    }
}

/// Spleeter separator backed by one long-lived Python process.
///
/// Requests are serialized through the worker pipe; the model is never
/// invoked concurrently. Each exchange runs on its own task so a caller that
/// goes away cannot leave an unread reply in the pipe.
pub struct SpleeterWorker {
    model: SpleeterModel,
    codec: String,
    io: Arc<Mutex<WorkerIo>>,
}

impl std::fmt::Debug for SpleeterWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpleeterWorker")
            .field("model", &self.model)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl SpleeterWorker {
    /// Start the worker and wait until the model is loaded
    pub async fn spawn(
        python_path: &Path,
        model: SpleeterModel,
        codec: &str,
        warm_up: bool,
        startup_timeout: Duration,
    ) -> Result<Self, SeparationError> {
        info!("Starting Spleeter worker ({}, codec={})", model, codec);

        let warm_up = if warm_up { "1" } else { "0" };
        Self::spawn_script(
            python_path,
            WORKER_SCRIPT,
            &[model.id(), warm_up],
            model,
            codec,
            startup_timeout,
        )
        .await
    }

    async fn spawn_script(
        python_path: &Path,
        script: &str,
        args: &[&str],
        model: SpleeterModel,
        codec: &str,
        startup_timeout: Duration,
    ) -> Result<Self, SeparationError> {
        let mut child = Command::new(python_path)
            .arg("-u")
            .args(["-c", script])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SeparationError::PythonNotFound,
                _ => SeparationError::Io(e),
            })?;

        let stdin = child.stdin.take().ok_or(SeparationError::WorkerExited)?;
        let stdout = child.stdout.take().ok_or(SeparationError::WorkerExited)?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let mut stdout = BufReader::new(stdout).lines();

        let first_line = tokio::time::timeout(startup_timeout, stdout.next_line())
            .await
            .map_err(|_| SeparationError::StartupTimeout(startup_timeout.as_secs()))??
            .ok_or(SeparationError::WorkerExited)?;

        let message = parse_message(&first_line)?;
        if message.ready != Some(true) {
            return Err(startup_failure(message));
        }

        info!("Spleeter worker ready (pid {:?})", child.id());

        Ok(Self {
            model,
            codec: codec.to_string(),
            io: Arc::new(Mutex::new(WorkerIo {
                child,
                stdin,
                stdout,
            })),
        })
    }

    pub fn model(&self) -> SpleeterModel {
        self.model
    }
}

#[async_trait]
impl StemSeparator for SpleeterWorker {
    fn name(&self) -> &str {
        self.model.id()
    }

    fn stems(&self) -> &[&'static str] {
        self.model.stems()
    }

    fn codec(&self) -> &str {
        &self.codec
    }

    async fn separate(&self, input: &Path, output_dir: &Path) -> Result<(), SeparationError> {
        info!("Running {} on {}", self.model, input.display());

        let mut request = serde_json::to_string(&SeparateRequest {
            input,
            output_dir,
            codec: &self.codec,
        })
        .map_err(|e| SeparationError::Protocol(e.to_string()))?;
        request.push('\n');

        let io = Arc::clone(&self.io);
        let line = tokio::spawn(async move {
            let mut io = io.lock_owned().await;
            io.exchange(&request).await
        })
        .await
        .map_err(|e| SeparationError::Aborted(e.to_string()))??;

        let message = parse_message(&line)?;
        match message.ok {
            Some(true) => {
                info!("Separation complete: {}", input.display());
                Ok(())
            }
            _ => Err(SeparationError::Inference(
                message.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            debug!("spleeter: {}", line);
        }
    }
}

fn parse_message(line: &str) -> Result<WorkerMessage, SeparationError> {
    serde_json::from_str(line.trim()).map_err(|e| {
        SeparationError::Protocol(format!("{} (line: {:?})", e, truncate(line, 200)))
    })
}

fn startup_failure(message: WorkerMessage) -> SeparationError {
    let detail = message.error.unwrap_or_default();
    match message.code.as_deref() {
        Some("missing_dependency") => SeparationError::SpleeterNotInstalled,
        _ => SeparationError::ModelInit(detail),
    }
}

fn pipe_error(e: std::io::Error) -> SeparationError {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe => SeparationError::WorkerExited,
        _ => SeparationError::Io(e),
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_from_str() {
        assert_eq!(SpleeterModel::from_str("spleeter:2stems"), Some(SpleeterModel::TwoStems));
        assert_eq!(SpleeterModel::from_str("4stems"), Some(SpleeterModel::FourStems));
        assert_eq!(SpleeterModel::from_str(" Spleeter:5STEMS "), Some(SpleeterModel::FiveStems));
        assert_eq!(SpleeterModel::from_str("spleeter:3stems"), None);
    }

    #[test]
    fn test_two_stems_names() {
        assert_eq!(SpleeterModel::TwoStems.stems(), &["vocals", "accompaniment"]);
        assert_eq!(SpleeterModel::FiveStems.stems().len(), 5);
    }

    #[test]
    fn test_startup_failure_mapping() {
        let missing = parse_message(
            r#"{"ready": false, "code": "missing_dependency", "error": "No module named 'spleeter'"}"#,
        )
        .unwrap();
        assert!(matches!(startup_failure(missing), SeparationError::SpleeterNotInstalled));

        let init = parse_message(r#"{"ready": false, "code": "model_init", "error": "bad weights"}"#)
            .unwrap();
        match startup_failure(init) {
            SeparationError::ModelInit(detail) => assert_eq!(detail, "bad weights"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_message_rejects_noise() {
        assert!(matches!(
            parse_message("INFO:spleeter:Downloading model"),
            Err(SeparationError::Protocol(_))
        ));
    }

    fn python3_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    const FAKE_WORKER: &str = r#"
import json, os, sys
print(json.dumps({"ready": True}), flush=True)
for line in sys.stdin:
    req = json.loads(line)
    base = os.path.splitext(os.path.basename(req["input"]))[0]
    target = os.path.join(req["output_dir"], base)
    os.makedirs(target, exist_ok=True)
    for stem in ("vocals", "accompaniment"):
        with open(os.path.join(target, stem + "." + req["codec"]), "wb") as f:
            f.write(b"RIFF")
    print(json.dumps({"ok": True}), flush=True)
"#;

    #[tokio::test]
    async fn test_worker_protocol_roundtrip() {
        if !python3_available() {
            eprintln!("skipping: python3 not found");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("song.wav");
        std::fs::write(&input, b"RIFF").unwrap();

        let worker = SpleeterWorker::spawn_script(
            Path::new("python3"),
            FAKE_WORKER,
            &[],
            SpleeterModel::TwoStems,
            "wav",
            Duration::from_secs(10),
        )
        .await
        .unwrap();

        worker.separate(&input, dir.path()).await.unwrap();
        assert!(dir.path().join("song/vocals.wav").exists());
        assert!(dir.path().join("song/accompaniment.wav").exists());
    }

    const SLOW_WORKER: &str = r#"
import json, os, sys, time
print(json.dumps({"ready": True}), flush=True)
for line in sys.stdin:
    req = json.loads(line)
    time.sleep(0.5)
    base = os.path.splitext(os.path.basename(req["input"]))[0]
    target = os.path.join(req["output_dir"], base)
    os.makedirs(target, exist_ok=True)
    with open(os.path.join(target, "vocals." + req["codec"]), "wb") as f:
        f.write(b"RIFF")
    print(json.dumps({"ok": True}), flush=True)
"#;

    #[tokio::test]
    async fn test_cancelled_call_does_not_shift_replies() {
        if !python3_available() {
            eprintln!("skipping: python3 not found");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.wav");
        let second = dir.path().join("second.wav");
        std::fs::write(&first, b"RIFF").unwrap();
        std::fs::write(&second, b"RIFF").unwrap();

        let worker = SpleeterWorker::spawn_script(
            Path::new("python3"),
            SLOW_WORKER,
            &[],
            SpleeterModel::TwoStems,
            "wav",
            Duration::from_secs(10),
        )
        .await
        .unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), worker.separate(&first, dir.path())).await;
        assert!(abandoned.is_err());

        worker.separate(&second, dir.path()).await.unwrap();
        assert!(dir.path().join("second/vocals.wav").exists());
        assert!(dir.path().join("first/vocals.wav").exists());
    }

    #[tokio::test]
    async fn test_worker_reports_missing_dependency() {
        if !python3_available() {
            eprintln!("skipping: python3 not found");
            return;
        }
        let script = r#"
import json, sys
print(json.dumps({"ready": False, "code": "missing_dependency", "error": "nope"}), flush=True)
sys.exit(1)
"#;
        let result = SpleeterWorker::spawn_script(
            Path::new("python3"),
            script,
            &[],
            SpleeterModel::TwoStems,
            "wav",
            Duration::from_secs(10),
        )
        .await;
        assert!(matches!(result, Err(SeparationError::SpleeterNotInstalled)));
    }
}
