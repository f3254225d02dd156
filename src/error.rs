//! Error taxonomy for the extraction pipeline.
//!
//! Only [`DocumentError`] aborts a request; the others are logged and degrade
//! a single field.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The uploaded document cannot be turned into text.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("PDF is encrypted and cannot be processed.")]
    Encrypted,
    #[error("Failed to read PDF. The file may be corrupted or in an unsupported format: {0}")]
    Corrupt(String),
    #[error("No readable text found in the document.")]
    NoText,
}

/// A pattern file or a single pattern could not be used.
#[derive(Debug, Error)]
pub enum PatternConfigError {
    #[error("failed to read pattern file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse pattern file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid regex for '{field}' ({pattern}): {source}")]
    Regex {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// The language-model collaborator did not produce a completion.
#[derive(Debug, Error)]
pub enum ModelCallError {
    #[error("model credentials not configured")]
    MissingCredentials,
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("model transport failure: {0}")]
    Transport(String),
    #[error("model API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("model returned no completion")]
    EmptyResponse,
}

impl From<reqwest::Error> for ModelCallError {
    fn from(err: reqwest::Error) -> Self {
        ModelCallError::Transport(err.to_string())
    }
}
