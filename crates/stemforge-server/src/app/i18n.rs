//! Client-facing messages in Arabic and English

use super::AppState;
use axum::{async_trait, extract::FromRequestParts, http::header::ACCEPT_LANGUAGE, http::request::Parts};
use std::convert::Infallible;
use stemforge_core::error::ValidationError;
use stemforge_core::{ErrorKind, StemforgeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    Ar,
    En,
}

impl Locale {
    pub fn from_str(s: &str) -> Option<Self> {
        let primary = s.trim().split(['-', '_']).next().unwrap_or("");
        match primary.to_ascii_lowercase().as_str() {
            "ar" => Some(Locale::Ar),
            "en" => Some(Locale::En),
            _ => None,
        }
    }

    /// Best supported language of an `Accept-Language` header
    pub fn negotiate(header: &str) -> Option<Self> {
        let mut ranked: Vec<(f32, Locale)> = header
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.split(';');
                let locale = Locale::from_str(parts.next()?)?;
                let quality = parts
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0);
                (quality > 0.0).then_some((quality, locale))
            })
            .collect();

        // Stable sort keeps header order among equal weights
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked.first().map(|(_, locale)| *locale)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Locale::Ar => "ar",
            Locale::En => "en",
        }
    }

    /// Summary shown to the client; internal detail never leaks here
    pub fn message(&self, error: &StemforgeError) -> &'static str {
        match error {
            StemforgeError::Validation(v) => self.validation_message(v),
            _ => self.kind_message(error.kind()),
        }
    }

    fn validation_message(&self, error: &ValidationError) -> &'static str {
        match (self, error) {
            (Locale::Ar, ValidationError::MissingField(_)) => "لم يتم إرسال أي ملف",
            (Locale::En, ValidationError::MissingField(_)) => "No file was sent",
            (Locale::Ar, ValidationError::EmptyFilename) => "لم يتم اختيار أي ملف",
            (Locale::En, ValidationError::EmptyFilename) => "No file was selected",
            (Locale::Ar, ValidationError::DisallowedExtension(_)) => "نوع الملف غير مسموح به",
            (Locale::En, ValidationError::DisallowedExtension(_)) => "File type not allowed",
            (Locale::Ar, ValidationError::EmptyFile) => "الملف المرسل فارغ",
            (Locale::En, ValidationError::EmptyFile) => "The uploaded file is empty",
            (Locale::Ar, ValidationError::TooLarge { .. }) => "حجم الملف يتجاوز الحد المسموح به",
            (Locale::En, ValidationError::TooLarge { .. }) => "The file exceeds the upload size limit",
            (Locale::Ar, ValidationError::Malformed(_)) => "طلب الرفع غير صالح",
            (Locale::En, ValidationError::Malformed(_)) => "Malformed upload request",
        }
    }

    fn kind_message(&self, kind: ErrorKind) -> &'static str {
        match (self, kind) {
            (Locale::Ar, ErrorKind::ServiceUnavailable) => "نموذج فصل الصوت غير متاح حاليًا.",
            (Locale::En, ErrorKind::ServiceUnavailable) => {
                "The separation model is currently unavailable."
            }
            (Locale::Ar, ErrorKind::Processing) => "حدث خطأ أثناء المعالجة",
            (Locale::En, ErrorKind::Processing) => "An error occurred during processing",
            (Locale::Ar, ErrorKind::NotFound) => "الملف غير موجود",
            (Locale::En, ErrorKind::NotFound) => "File not found",
            (Locale::Ar, ErrorKind::Validation) => "طلب غير صالح",
            (Locale::En, ErrorKind::Validation) => "Invalid request",
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Locale {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .and_then(Locale::negotiate)
            .unwrap_or(state.default_locale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate() {
        assert_eq!(Locale::negotiate("en-US,en;q=0.9"), Some(Locale::En));
        assert_eq!(Locale::negotiate("ar-SA"), Some(Locale::Ar));
        assert_eq!(Locale::negotiate("fr-FR, en;q=0.5, ar;q=0.8"), Some(Locale::Ar));
        assert_eq!(Locale::negotiate("en;q=0, ar;q=0.1"), Some(Locale::Ar));
        assert_eq!(Locale::negotiate("de, fr"), None);
        assert_eq!(Locale::negotiate(""), None);
    }

    #[test]
    fn test_processing_message_is_generic() {
        let err = StemforgeError::MissingOutput {
            name: "vocals".to_string(),
            path: "/srv/processed/song/vocals.wav".into(),
        };
        let message = Locale::En.message(&err);
        assert_eq!(message, "An error occurred during processing");
        assert!(!message.contains("/srv"));
    }

    #[test]
    fn test_validation_messages_are_specific() {
        let err: StemforgeError = ValidationError::DisallowedExtension("notes.txt".into()).into();
        assert_eq!(Locale::Ar.message(&err), "نوع الملف غير مسموح به");
        assert_eq!(Locale::En.message(&err), "File type not allowed");
    }
}
