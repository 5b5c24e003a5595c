use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Unknown position: {0}")]
    UnknownPosition(String),

    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    #[error("Invalid versification: {0}")]
    Versification(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Bookmark error: {0}")]
    Bookmark(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Speech error: {0}")]
    Speech(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::Deserialization(err.to_string())
        } else {
            Error::Serialization(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
