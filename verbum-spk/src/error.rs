//! Error types for verbum-spk

use verbum_core::Error as CoreError;
use thiserror::Error;

/// Speech orchestration errors
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Language not available (tried {})", tried.join(", "))]
    LanguageNotAvailable { tried: Vec<String> },

    #[error("Bookmark error: {0}")]
    Bookmark(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Nothing to speak: {0}")]
    NoContent(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<SpeechError> for CoreError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::Core(inner) => inner,
            SpeechError::Bookmark(msg) => CoreError::Bookmark(msg),
            SpeechError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Speech(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;
