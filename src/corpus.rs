//! Corpus aggregation.
//!
//! Folds an ordered sequence of [`DecodeOutcome`]s into one [`CorpusReport`].
//! Each decoded text is followed by exactly one `\n`, in input order, so file
//! boundaries stay locatable in the flat string. Failures are kept with their
//! kind. Pure and deterministic.

use serde::Serialize;
use std::path::PathBuf;

use crate::decode::DecodeOutcome;
use crate::error::FailureKind;

/// A file that made it into the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedFile {
    pub path: PathBuf,
    pub encoding: String,
    /// Byte offset of this file's text within [`CorpusReport::text`].
    pub offset: usize,
}

/// A file that did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub attempted: Vec<String>,
    #[serde(flatten)]
    pub kind: FailureKind,
}

/// Aggregate result of one ingestion run. Rebuilt wholesale, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusReport {
    pub text: String,
    pub success_count: usize,
    pub decoded: Vec<DecodedFile>,
    pub failed: Vec<FailedFile>,
}

impl CorpusReport {
    pub fn total(&self) -> usize {
        self.success_count + self.failed.len()
    }

    pub fn failed_paths(&self) -> Vec<&PathBuf> {
        self.failed.iter().map(|f| &f.path).collect()
    }

    /// Corpus length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn aggregate<I>(outcomes: I) -> CorpusReport
where
    I: IntoIterator<Item = DecodeOutcome>,
{
    let mut text = String::new();
    let mut decoded = Vec::new();
    let mut failed = Vec::new();

    for outcome in outcomes {
        match outcome {
            DecodeOutcome::Decoded {
                path,
                encoding,
                text: body,
            } => {
                decoded.push(DecodedFile {
                    path,
                    encoding: encoding.name().to_string(),
                    offset: text.len(),
                });
                text.push_str(&body);
                text.push('\n');
            }
            DecodeOutcome::Failed {
                path,
                attempted,
                kind,
            } => failed.push(FailedFile {
                path,
                attempted: attempted.into_iter().map(str::to_string).collect(),
                kind,
            }),
        }
    }

    for f in &failed {
        tracing::warn!(path = %f.path.display(), kind = %f.kind, "file not loaded");
    }
    tracing::info!(
        loaded = decoded.len(),
        failed = failed.len(),
        chars = text.chars().count(),
        "corpus aggregated"
    );

    CorpusReport {
        success_count: decoded.len(),
        text,
        decoded,
        failed,
    }
}
