//! Error taxonomy shared across the pipeline and the session layer.
//!
//! Archive-level and configuration errors abort the request that raised them.
//! Per-file failures are never raised: they travel as [`FailureKind`] values
//! inside a [`DecodeOutcome`](crate::decode::DecodeOutcome) and end up in the
//! [`CorpusReport`](crate::corpus::CorpusReport).

use serde::Serialize;
use std::path::PathBuf;

/// Fatal failure of one ingestion request.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Input is not a readable zip structure.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// Compressed input or total uncompressed size exceeds the configured ceiling.
    #[error("archive exceeds size limit: {actual} bytes > {limit} bytes")]
    OversizeArchive { actual: u64, limit: u64 },

    #[error("archive I/O error ({context}): {source}")]
    ExtractionIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Remote archive could not be fetched.
    #[error("failed to fetch archive from {url}: {message}")]
    Fetch { url: String, message: String },
}

impl ArchiveError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ArchiveError::ExtractionIo {
            context: context.into(),
            source,
        }
    }
}

/// Why a single candidate file did not make it into the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Every candidate encoding rejected the byte stream.
    #[error("no candidate encoding could decode the file")]
    EncodingExhausted,

    /// The file could not be read at all.
    #[error("file I/O error: {message}")]
    FileIo { message: String },
}

/// Normalization collaborator failed for one file. Logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("cleanse failed for {path}: {message}")]
    Cleanse { path: PathBuf, message: String },

    #[error("cleansed output not found: {0}")]
    MissingOutput(PathBuf),
}

/// The remote completion call failed. Turn-scoped, never fatal to a session.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion provider is disabled")]
    Disabled,

    #[error("completion request failed: {0}")]
    Transport(String),

    #[error("completion API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

/// Configuration or secrets problem detected before a session can start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration missing: {0}")]
    Missing(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
