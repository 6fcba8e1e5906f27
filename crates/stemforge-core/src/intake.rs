//! Upload validation and storage

use crate::error::{Result, StemforgeError, ValidationError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Multipart field carrying the audio
pub const UPLOAD_FIELD: &str = "audio_file";

/// Accepted upload types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioExtension {
    Wav,
    Mp3,
    Flac,
    M4a,
}

impl AudioExtension {
    pub const ALL: [AudioExtension; 4] = [
        AudioExtension::Wav,
        AudioExtension::Mp3,
        AudioExtension::Flac,
        AudioExtension::M4a,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            AudioExtension::Wav => "wav",
            AudioExtension::Mp3 => "mp3",
            AudioExtension::Flac => "flac",
            AudioExtension::M4a => "m4a",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wav" => Some(AudioExtension::Wav),
            "mp3" => Some(AudioExtension::Mp3),
            "flac" => Some(AudioExtension::Flac),
            "m4a" => Some(AudioExtension::M4a),
            _ => None,
        }
    }

    /// Extension after the last dot of a file name
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_str(ext)
    }
}

impl std::fmt::Display for AudioExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioExtension::Wav => write!(f, "WAV"),
            AudioExtension::Mp3 => write!(f, "MP3"),
            AudioExtension::Flac => write!(f, "FLAC"),
            AudioExtension::M4a => write!(f, "M4A"),
        }
    }
}

/// An upload that passed validation but has not been written yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub original_name: String,
    pub sanitized_name: String,
    pub extension: AudioExtension,
}

impl PendingUpload {
    /// Sanitized name without extension; output names derive from it
    pub fn base_name(&self) -> &str {
        base_name(&self.sanitized_name)
    }
}

/// A stored upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub sanitized_name: String,
    pub extension: AudioExtension,
    pub path: PathBuf,
    pub size: u64,
}

impl UploadedFile {
    pub fn base_name(&self) -> &str {
        base_name(&self.sanitized_name)
    }
}

fn base_name(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

/// Validates uploads and writes them to the upload directory
#[derive(Debug, Clone)]
pub struct FileIntake {
    upload_dir: PathBuf,
}

impl FileIntake {
    pub fn new(upload_dir: PathBuf) -> Self {
        Self { upload_dir }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Check the client-supplied file name; nothing touches the disk here
    pub fn validate(&self, filename: Option<&str>) -> std::result::Result<PendingUpload, ValidationError> {
        let original = filename.ok_or_else(|| ValidationError::MissingField(UPLOAD_FIELD.to_string()))?;
        if original.trim().is_empty() {
            return Err(ValidationError::EmptyFilename);
        }

        let extension = AudioExtension::from_filename(original)
            .ok_or_else(|| ValidationError::DisallowedExtension(original.to_string()))?;

        let sanitized = sanitize_filename(original);
        let sanitized_name = match sanitized.rsplit_once('.') {
            Some((stem, ext))
                if !stem.is_empty() && AudioExtension::from_str(ext) == Some(extension) =>
            {
                format!("{}.{}", stem, extension.extension())
            }
            _ => fallback_name(extension),
        };

        debug!("Accepted upload {:?} as {}", original, sanitized_name);

        Ok(PendingUpload {
            original_name: original.to_string(),
            sanitized_name,
            extension,
        })
    }

    /// Open a writer for a validated upload
    pub async fn begin(&self, pending: PendingUpload) -> Result<UploadWriter> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let temp = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&self.upload_dir)?;
        let (file, temp_path) = temp.into_parts();

        Ok(UploadWriter {
            target: self.upload_dir.join(&pending.sanitized_name),
            pending,
            file: File::from_std(file),
            temp_path,
            written: 0,
        })
    }
}

/// Streams an upload into a temp file, renamed into place on commit.
///
/// Dropping the writer without committing deletes the partial file.
#[derive(Debug)]
pub struct UploadWriter {
    pending: PendingUpload,
    target: PathBuf,
    file: File,
    temp_path: TempPath,
    written: u64,
}

impl UploadWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub async fn commit(mut self) -> Result<UploadedFile> {
        if self.written == 0 {
            return Err(ValidationError::EmptyFile.into());
        }

        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);

        self.temp_path
            .persist(&self.target)
            .map_err(|e| StemforgeError::Io(e.error))?;

        info!(
            "File saved to {} ({} bytes)",
            self.target.display(),
            self.written
        );

        Ok(UploadedFile {
            original_name: self.pending.original_name,
            sanitized_name: self.pending.sanitized_name,
            extension: self.pending.extension,
            path: self.target,
            size: self.written,
        })
    }
}

fn fallback_name(extension: AudioExtension) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("upload_{}.{}", &id[..8], extension.extension())
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("static regex"))
}

fn repeated_dots() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.{2,}").expect("static regex"))
}

/// Reduce a client file name to a safe single path component.
///
/// The result contains only `[A-Za-z0-9_.-]`, never `..`, and never starts or
/// ends with `.` or `_`. It may be empty.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let ascii: String = last
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c.is_ascii_whitespace() { '_' } else { c })
        .collect();

    let cleaned = unsafe_chars().replace_all(&ascii, "");
    let collapsed = repeated_dots().replace_all(&cleaned, ".");

    collapsed.trim_matches(|c| c == '.' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intake() -> (tempfile::TempDir, FileIntake) {
        let dir = tempfile::tempdir().unwrap();
        let intake = FileIntake::new(dir.path().join("uploads"));
        (dir, intake)
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("song.wav"), "song.wav");
        assert_eq!(sanitize_filename("My Song.mp3"), "My_Song.mp3");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_filename("a..b.flac"), "a.b.flac");
        assert_eq!(sanitize_filename("__init__.wav"), "init__.wav");
        assert_eq!(sanitize_filename(".."), "");
    }

    #[test]
    fn test_sanitize_never_escapes() {
        let nasty = [
            "../../../x.wav",
            "..%2f..%2fx.wav",
            "/abs/path/x.wav",
            "C:\\Windows\\x.wav",
            "....//....//x.wav",
            "x/../../y.wav",
            " . . /x.wav",
            "\u{0}..x.wav",
        ];
        for name in nasty {
            let s = sanitize_filename(name);
            assert!(!s.contains('/'), "{name:?} -> {s:?}");
            assert!(!s.contains('\\'), "{name:?} -> {s:?}");
            assert!(!s.contains(".."), "{name:?} -> {s:?}");
            assert!(!s.starts_with('.'), "{name:?} -> {s:?}");
        }
    }

    #[test]
    fn test_extension_parsing() {
        assert_eq!(AudioExtension::from_filename("a.WAV"), Some(AudioExtension::Wav));
        assert_eq!(AudioExtension::from_filename("a.b.m4a"), Some(AudioExtension::M4a));
        assert_eq!(AudioExtension::from_filename("wav"), None);
        assert_eq!(AudioExtension::from_filename("a.ogg"), None);
        assert_eq!(AudioExtension::from_filename("a.wav.exe"), None);
    }

    #[test]
    fn test_validate_rejections() {
        let (_dir, intake) = intake();
        assert_eq!(
            intake.validate(None),
            Err(ValidationError::MissingField(UPLOAD_FIELD.to_string()))
        );
        assert_eq!(intake.validate(Some("")), Err(ValidationError::EmptyFilename));
        assert!(matches!(
            intake.validate(Some("notes.txt")),
            Err(ValidationError::DisallowedExtension(_))
        ));
        assert!(!intake.upload_dir().exists());
    }

    #[test]
    fn test_validate_falls_back_when_name_is_lost() {
        let (_dir, intake) = intake();
        let pending = intake.validate(Some("أغنية.mp3")).unwrap();
        assert!(pending.sanitized_name.starts_with("upload_"));
        assert!(pending.sanitized_name.ends_with(".mp3"));
        assert_eq!(pending.extension, AudioExtension::Mp3);

        let pending = intake.validate(Some("Song.FLAC")).unwrap();
        assert_eq!(pending.sanitized_name, "Song.flac");
        assert_eq!(pending.base_name(), "Song");
    }

    #[tokio::test]
    async fn test_commit_writes_file() {
        let (_dir, intake) = intake();
        let pending = intake.validate(Some("../song.wav")).unwrap();
        let mut writer = intake.begin(pending).await.unwrap();
        writer.write_chunk(b"RIFF").await.unwrap();
        writer.write_chunk(b"data").await.unwrap();
        let upload = writer.commit().await.unwrap();

        assert_eq!(upload.path, intake.upload_dir().join("song.wav"));
        assert_eq!(upload.base_name(), "song");
        assert_eq!(upload.size, 8);
        assert_eq!(std::fs::read(&upload.path).unwrap(), b"RIFFdata");
    }

    #[tokio::test]
    async fn test_dropped_writer_leaves_nothing() {
        let (_dir, intake) = intake();
        let pending = intake.validate(Some("song.wav")).unwrap();
        let mut writer = intake.begin(pending).await.unwrap();
        writer.write_chunk(b"partial").await.unwrap();
        drop(writer);

        let entries: Vec<_> = std::fs::read_dir(intake.upload_dir()).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let (_dir, intake) = intake();
        let pending = intake.validate(Some("song.wav")).unwrap();
        let writer = intake.begin(pending).await.unwrap();
        let err = writer.commit().await.unwrap_err();
        assert!(matches!(err, StemforgeError::Validation(ValidationError::EmptyFile)));
        assert!(!intake.upload_dir().join("song.wav").exists());
    }
}
