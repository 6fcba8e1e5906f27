//! Multipart upload intake

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::http::StatusCode;
use stemforge_core::error::{Result, ValidationError};
use stemforge_core::intake::UPLOAD_FIELD;
use stemforge_core::{FileIntake, UploadedFile};
use tracing::debug;

/// Stream the `audio_file` field of a multipart body into the upload directory.
///
/// The file name is validated before the first byte is written; other fields
/// are skipped.
pub async fn receive_upload(
    intake: &FileIntake,
    multipart: std::result::Result<Multipart, MultipartRejection>,
    limit_mb: usize,
) -> Result<UploadedFile> {
    let mut multipart = multipart.map_err(|e| ValidationError::Malformed(e.body_text()))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit_mb))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let pending = intake.validate(field.file_name())?;
        let mut writer = intake.begin(pending).await?;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, limit_mb))?
        {
            writer.write_chunk(&chunk).await?;
        }

        return writer.commit().await;
    }

    Err(ValidationError::MissingField(UPLOAD_FIELD.to_string()).into())
}

fn multipart_error(error: MultipartError, limit_mb: usize) -> ValidationError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationError::TooLarge { limit_mb }
    } else {
        ValidationError::Malformed(error.body_text())
    }
}
