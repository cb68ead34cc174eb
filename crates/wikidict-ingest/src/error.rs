//! Error types for dictionary generation
//!
//! Every failure is either fatal to the whole generation run or recoverable
//! where it happened. [`IngestError::severity`] makes that split explicit so
//! callers never have to guess from the variant.

use thiserror::Error;
use wikidict_common::CommonError;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// How far an error is allowed to travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the run and surfaces as the process exit status
    Fatal,
    /// Logged by the component that hit it; the run continues
    Recoverable,
}

#[derive(Error, Debug)]
pub enum IngestError {
    /// Network or TLS failure while talking to the dump server
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP status {status} while fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// Decompression failure, malformed tar header, or XML structure violation
    #[error("Corrupt stream in {stage}: {message}")]
    CorruptStream { stage: &'static str, message: String },

    /// Input ended while a stage still had open state
    #[error("Incomplete stream: {stage} reached end of input with open state")]
    IncompleteStream { stage: &'static str },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// A single entry was rejected by the dictionary store
    #[error("Rejected entry '{word}': {reason}")]
    Record { word: String, reason: String },

    /// The dump cache could not be read or written
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Dictionary store error: {0}")]
    Dictionary(String),

    #[error("Pipeline stage '{stage}' failed: {message}")]
    Pipeline { stage: String, message: String },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl IngestError {
    pub fn corrupt(stage: &'static str, message: impl Into<String>) -> Self {
        Self::CorruptStream {
            stage,
            message: message.into(),
        }
    }

    pub fn incomplete(stage: &'static str) -> Self {
        Self::IncompleteStream { stage }
    }

    pub fn record(word: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Record {
            word: word.into(),
            reason: reason.into(),
        }
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn severity(&self) -> Severity {
        match self {
            IngestError::Record { .. } | IngestError::Cache(_) => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => IngestError::HttpStatus {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            },
            None => IngestError::Transport(err.to_string()),
        }
    }
}
