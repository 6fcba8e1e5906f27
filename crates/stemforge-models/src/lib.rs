//! Source separation bridge for stemforge
//!
//! This crate wraps a pre-trained separation model behind the
//! [`StemSeparator`] trait:
//! - Spleeter: persistent Python worker that loads the model once
//!
//! The model is created at startup and pinned in a [`SeparatorHandle`].
//! A handle that failed to initialize stays unavailable for the whole
//! process lifetime.

mod error;
mod spleeter;

pub use error::SeparationError;
pub use spleeter::{SpleeterModel, SpleeterWorker};

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// A model that splits one input file into named stem files.
///
/// Implementations write `<output_dir>/<input stem>/<stem>.<codec>` for every
/// name returned by [`StemSeparator::stems`].
#[async_trait]
pub trait StemSeparator: Send + Sync + fmt::Debug {
    /// Human readable model name, used in logs
    fn name(&self) -> &str;

    /// Stem names the model produces, in output order
    fn stems(&self) -> &[&'static str];

    /// File extension of the written stems
    fn codec(&self) -> &str;

    async fn separate(&self, input: &Path, output_dir: &Path) -> Result<(), SeparationError>;
}

/// Process-wide separator, fixed at startup.
#[derive(Clone)]
pub enum SeparatorHandle {
    Ready(Arc<dyn StemSeparator>),
    Unavailable { reason: String },
}

impl SeparatorHandle {
    pub fn ready(separator: impl StemSeparator + 'static) -> Self {
        SeparatorHandle::Ready(Arc::new(separator))
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        SeparatorHandle::Unavailable {
            reason: reason.into(),
        }
    }

    /// Wrap a startup attempt, pinning failures as unavailable
    pub fn from_startup<S>(result: Result<S, SeparationError>) -> Self
    where
        S: StemSeparator + 'static,
    {
        match result {
            Ok(separator) => Self::ready(separator),
            Err(e) => {
                warn!("Separation model unavailable: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SeparatorHandle::Ready(_))
    }

    /// The separator, or the reason it failed to start
    pub fn get(&self) -> Result<Arc<dyn StemSeparator>, &str> {
        match self {
            SeparatorHandle::Ready(separator) => Ok(Arc::clone(separator)),
            SeparatorHandle::Unavailable { reason } => Err(reason),
        }
    }
}

impl fmt::Debug for SeparatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeparatorHandle::Ready(separator) => {
                f.debug_tuple("Ready").field(&separator.name()).finish()
            }
            SeparatorHandle::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}
