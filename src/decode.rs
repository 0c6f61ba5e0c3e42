//! Encoding-fallback decoding of single files.
//!
//! A file is tried against each candidate encoding in order, and the first one
//! that decodes the whole byte stream without a malformed sequence wins.
//! Decoding is strict: no replacement characters are ever produced, so a
//! success is always a faithful decode under the reported encoding.
//!
//! Detection is per file, not per archive, because sibling files in legacy
//! corpora routinely use different encodings.
//!
//! [`Decoder::decode`] never returns an error. Read failures and exhausted
//! candidate lists come back as [`DecodeOutcome::Failed`].

use anyhow::Result;
use encoding_rs::Encoding;
use std::path::{Path, PathBuf};

use crate::config::CorpusConfig;
use crate::error::FailureKind;

/// Result of decoding one file.
#[derive(Debug, Clone)]
pub enum DecodeOutcome {
    Decoded {
        path: PathBuf,
        encoding: &'static Encoding,
        text: String,
    },
    Failed {
        path: PathBuf,
        /// Encodings tried before giving up (empty when the read itself failed).
        attempted: Vec<&'static str>,
        kind: FailureKind,
    },
}

impl DecodeOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DecodeOutcome::Decoded { path, .. } | DecodeOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, DecodeOutcome::Decoded { .. })
    }
}

/// Ordered candidate list of encodings.
#[derive(Debug, Clone)]
pub struct Decoder {
    candidates: Vec<&'static Encoding>,
}

impl Decoder {
    /// Resolve WHATWG labels (`"utf-8"`, `"shift_jis"`, ...) in order.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let mut candidates = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            let encoding = Encoding::for_label(label.as_bytes())
                .ok_or_else(|| anyhow::anyhow!("Unknown encoding label: '{}'", label))?;
            candidates.push(encoding);
        }
        if candidates.is_empty() {
            anyhow::bail!("At least one candidate encoding is required");
        }
        Ok(Self { candidates })
    }

    pub fn from_config(config: &CorpusConfig) -> Result<Self> {
        Self::from_labels(&config.encodings)
    }

    pub fn candidates(&self) -> &[&'static Encoding] {
        &self.candidates
    }

    /// First candidate that decodes `bytes` completely, with the decoded text.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Option<(&'static Encoding, String)> {
        self.candidates.iter().find_map(|&encoding| {
            encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| (encoding, text.into_owned()))
        })
    }

    pub fn decode(&self, path: &Path) -> DecodeOutcome {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read file");
                return DecodeOutcome::Failed {
                    path: path.to_path_buf(),
                    attempted: Vec::new(),
                    kind: FailureKind::FileIo {
                        message: e.to_string(),
                    },
                };
            }
        };

        let mut attempted = Vec::with_capacity(self.candidates.len());
        for &encoding in &self.candidates {
            attempted.push(encoding.name());
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(&bytes)
            {
                tracing::info!(
                    path = %path.display(),
                    encoding = encoding.name(),
                    "decoded file"
                );
                return DecodeOutcome::Decoded {
                    path: path.to_path_buf(),
                    encoding,
                    text: text.into_owned(),
                };
            }
            tracing::debug!(
                path = %path.display(),
                encoding = encoding.name(),
                "decode failed, trying next encoding"
            );
        }

        tracing::warn!(path = %path.display(), ?attempted, "all candidate encodings failed");
        DecodeOutcome::Failed {
            path: path.to_path_buf(),
            attempted,
            kind: FailureKind::EncodingExhausted,
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            candidates: vec![
                encoding_rs::UTF_8,
                encoding_rs::SHIFT_JIS,
                encoding_rs::ISO_2022_JP,
            ],
        }
    }
}
