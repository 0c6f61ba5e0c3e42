//! Candidate file discovery.
//!
//! Pure path enumeration: no file is opened here. Filters, in order:
//! 1. prune any directory whose name is a reserved metadata directory,
//! 2. drop files whose name starts with the hidden-artifact prefix,
//! 3. keep only files whose name ends with the text suffix.
//!
//! Entries within one directory are visited in file-name order so repeated
//! walks of the same tree yield the same sequence.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::CorpusConfig;

/// One discovered candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub len: u64,
    /// Zero-based position in the walk.
    pub order: usize,
}

/// Filter rules applied during discovery.
#[derive(Debug, Clone)]
pub struct WalkRules {
    pub metadata_dirs: Vec<String>,
    pub hidden_prefix: String,
    pub suffix: String,
}

impl WalkRules {
    pub fn from_config(config: &CorpusConfig) -> Self {
        Self {
            metadata_dirs: config.metadata_dirs.clone(),
            hidden_prefix: config.hidden_prefix.clone(),
            suffix: config.suffix.clone(),
        }
    }

    fn is_metadata_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|name| self.metadata_dirs.iter().any(|m| m == name))
                .unwrap_or(false)
    }

    fn accepts_file(&self, name: &str) -> bool {
        if !self.hidden_prefix.is_empty() && name.starts_with(&self.hidden_prefix) {
            return false;
        }
        name.ends_with(&self.suffix)
    }
}

impl Default for WalkRules {
    fn default() -> Self {
        Self::from_config(&CorpusConfig::default())
    }
}

/// Lazily walk `root`. Each call re-walks the filesystem.
pub fn discover<'a>(root: &Path, rules: &'a WalkRules) -> impl Iterator<Item = FileRecord> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| e.depth() == 0 || !rules.is_metadata_dir(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry during discovery");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(move |e| {
            e.file_name()
                .to_str()
                .map(|name| rules.accepts_file(name))
                .unwrap_or(false)
        })
        .enumerate()
        .map(|(order, e)| FileRecord {
            len: e.metadata().map(|m| m.len()).unwrap_or(0),
            path: e.into_path(),
            order,
        })
}
