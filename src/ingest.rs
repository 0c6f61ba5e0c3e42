//! Ingestion pipeline orchestration.
//!
//! Coordinates one ingestion request: load bytes → consult the cache →
//! extract → discover → decode per file → aggregate → (optionally) cleanse.
//! The scratch directory is closed on every path out of the request.
//!
//! Paths in the resulting report are relative to the archive root, so two
//! extractions of the same archive produce identical reports.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{self, ArchiveHandle, ArchiveSource};
use crate::cache::{archive_key, CorpusCache, NoCache};
use crate::config::{ArchiveConfig, Config, CorpusConfig};
use crate::corpus::{aggregate, CorpusReport};
use crate::decode::{DecodeOutcome, Decoder};
use crate::error::ArchiveError;
use crate::normalize::{cleanse_all, load_processed, Normalizer};
use crate::walker::{discover, WalkRules};

/// Result of one ingestion request.
#[derive(Debug, Clone)]
pub struct Ingestion {
    /// Content-addressed key of the archive under the active rules.
    pub key: String,
    pub report: Arc<CorpusReport>,
    /// True when the report was served from the cache.
    pub cached: bool,
    /// Present only when a normalizer was supplied.
    pub cleansed: Option<CleansedTexts>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleansedTexts {
    /// `(file name, text)` of every cleansed sibling, in walk order.
    pub texts: Vec<(String, String)>,
    pub failures: Vec<String>,
}

pub struct Ingestor {
    archive: ArchiveConfig,
    corpus: CorpusConfig,
    decoder: Decoder,
    rules: WalkRules,
    cache: Arc<dyn CorpusCache>,
}

impl Ingestor {
    pub fn new(config: &Config, cache: Arc<dyn CorpusCache>) -> anyhow::Result<Self> {
        Ok(Self {
            archive: config.archive.clone(),
            corpus: config.corpus.clone(),
            decoder: Decoder::from_config(&config.corpus)?,
            rules: WalkRules::from_config(&config.corpus),
            cache,
        })
    }

    pub fn uncached(config: &Config) -> anyhow::Result<Self> {
        Self::new(config, Arc::new(NoCache))
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub async fn ingest(
        &self,
        source: ArchiveSource,
        normalizer: Option<&dyn Normalizer>,
    ) -> Result<Ingestion, ArchiveError> {
        let bytes = source.load(&self.archive).await?;
        self.ingest_bytes(&bytes, normalizer)
    }

    pub fn ingest_bytes(
        &self,
        bytes: &[u8],
        normalizer: Option<&dyn Normalizer>,
    ) -> Result<Ingestion, ArchiveError> {
        let key = archive_key(bytes, &self.corpus);
        let cached = self.cache.get(&key);

        if let (Some(report), None) = (&cached, normalizer) {
            tracing::info!(key = %key, "corpus served from cache");
            return Ok(Ingestion {
                key,
                report: report.clone(),
                cached: true,
                cleansed: None,
            });
        }

        let handle = archive::extract(bytes, &self.archive)?;
        tracing::debug!(
            key = %key,
            root = %handle.root().display(),
            extracted_at = %handle.extracted_at(),
            "archive extracted"
        );
        let was_cached = cached.is_some();
        let report = match cached {
            Some(report) => report,
            None => {
                let report = Arc::new(self.build_report(&handle));
                self.cache.put(key.clone(), report.clone());
                report
            }
        };

        let cleansed = normalizer.map(|n| {
            let summary = cleanse_all(n, discover(handle.root(), &self.rules));
            CleansedTexts {
                texts: load_processed(&summary.produced),
                failures: summary.failures.iter().map(|e| e.to_string()).collect(),
            }
        });

        handle.close()?;

        Ok(Ingestion {
            key,
            report,
            cached: was_cached,
            cleansed,
        })
    }

    /// Relative paths of every file in the archive, unfiltered.
    pub async fn list_entries(&self, source: ArchiveSource) -> Result<Vec<PathBuf>, ArchiveError> {
        let bytes = source.load(&self.archive).await?;
        let handle = archive::extract(&bytes, &self.archive)?;
        let root = handle.root().to_path_buf();
        let entries = handle
            .entries()
            .into_iter()
            .map(|p| relative(&root, &p))
            .collect();
        handle.close()?;
        Ok(entries)
    }

    fn build_report(&self, handle: &ArchiveHandle) -> CorpusReport {
        let root = handle.root();
        let outcomes = discover(root, &self.rules).map(|record| {
            let outcome = self.decoder.decode(&record.path);
            relativize(outcome, root)
        });
        aggregate(outcomes)
    }
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn relativize(outcome: DecodeOutcome, root: &Path) -> DecodeOutcome {
    match outcome {
        DecodeOutcome::Decoded {
            path,
            encoding,
            text,
        } => DecodeOutcome::Decoded {
            path: relative(root, &path),
            encoding,
            text,
        },
        DecodeOutcome::Failed {
            path,
            attempted,
            kind,
        } => DecodeOutcome::Failed {
            path: relative(root, &path),
            attempted,
            kind,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::normalize::Utf8Cleanser;
    use std::io::{Cursor, Write};

    fn zip_with(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, data) in files {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    fn scratch_config(scratch: &Path) -> Config {
        let mut config = Config::default();
        config.archive.scratch_dir = Some(scratch.to_path_buf());
        config
    }

    #[test]
    fn report_paths_are_relative() {
        let scratch = tempfile::TempDir::new().unwrap();
        let bytes = zip_with(&[("dir/a.txt", b"a".to_vec()), ("bad.txt", vec![0xff])]);
        let ingestor = Ingestor::uncached(&scratch_config(scratch.path())).unwrap();
        let out = ingestor.ingest_bytes(&bytes, None).unwrap();

        assert_eq!(out.report.decoded[0].path, PathBuf::from("dir/a.txt"));
        assert_eq!(out.report.failed_paths(), vec![&PathBuf::from("bad.txt")]);
        assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
    }

    #[test]
    fn second_ingest_hits_cache() {
        let scratch = tempfile::TempDir::new().unwrap();
        let bytes = zip_with(&[("a.txt", b"Hello".to_vec())]);
        let cache = Arc::new(MemoryCache::new(4));
        let ingestor = Ingestor::new(&scratch_config(scratch.path()), cache.clone()).unwrap();

        let first = ingestor.ingest_bytes(&bytes, None).unwrap();
        let second = ingestor.ingest_bytes(&bytes, None).unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.key, second.key);
        assert_eq!(first.report, second.report);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cleanse_runs_even_when_report_cached() {
        let scratch = tempfile::TempDir::new().unwrap();
        let bytes = zip_with(&[("a.txt", b"one\r\ntwo".to_vec())]);
        let ingestor = Ingestor::new(
            &scratch_config(scratch.path()),
            Arc::new(MemoryCache::new(4)),
        )
        .unwrap();
        ingestor.ingest_bytes(&bytes, None).unwrap();

        let cleanser = Utf8Cleanser::new(ingestor.decoder().clone());
        let out = ingestor.ingest_bytes(&bytes, Some(&cleanser)).unwrap();
        assert!(out.cached);
        let cleansed = out.cleansed.unwrap();
        assert_eq!(
            cleansed.texts,
            vec![("a_clns_utf-8.txt".to_string(), "one\ntwo".to_string())]
        );
        assert!(cleansed.failures.is_empty());
        // cleansed siblings never leak into the corpus
        assert_eq!(out.report.text, "one\r\ntwo\n");
    }

    #[test]
    fn corrupt_archive_aborts() {
        let scratch = tempfile::TempDir::new().unwrap();
        let ingestor = Ingestor::uncached(&scratch_config(scratch.path())).unwrap();
        let garbage = vec![b'?'; 512];
        let err = ingestor.ingest_bytes(&garbage, None).unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptArchive(_)));
    }

    #[tokio::test]
    async fn list_entries_includes_noise() {
        let scratch = tempfile::TempDir::new().unwrap();
        let bytes = zip_with(&[
            ("a.txt", b"a".to_vec()),
            ("__MACOSX/._a.txt", b"meta".to_vec()),
        ]);
        let ingestor = Ingestor::uncached(&scratch_config(scratch.path())).unwrap();
        let entries = ingestor
            .list_entries(ArchiveSource::Bytes(bytes))
            .await
            .unwrap();
        assert_eq!(
            entries,
            vec![PathBuf::from("__MACOSX/._a.txt"), PathBuf::from("a.txt")]
        );
    }
}
