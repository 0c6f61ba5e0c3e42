//! Content-addressed cache of corpus reports.
//!
//! Keys are SHA-256 digests over the archive bytes plus the corpus rules that
//! shape the result (candidate encodings and walk filters), so a changed rule
//! set never serves a stale report. The cache is an optimization only:
//! [`crate::ingest::Ingestor`] produces identical reports with or without it.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::config::CorpusConfig;
use crate::corpus::CorpusReport;

pub trait CorpusCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<CorpusReport>>;
    fn put(&self, key: String, report: Arc<CorpusReport>);
}

/// Hex digest identifying one archive under one rule set.
pub fn archive_key(bytes: &[u8], rules: &CorpusConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    for label in &rules.encodings {
        hasher.update(b"\0enc:");
        hasher.update(label.as_bytes());
    }
    for dir in &rules.metadata_dirs {
        hasher.update(b"\0meta:");
        hasher.update(dir.as_bytes());
    }
    hasher.update(b"\0hidden:");
    hasher.update(rules.hidden_prefix.as_bytes());
    hasher.update(b"\0suffix:");
    hasher.update(rules.suffix.as_bytes());
    hex::encode(hasher.finalize())
}

/// Never stores anything.
pub struct NoCache;

impl CorpusCache for NoCache {
    fn get(&self, _key: &str) -> Option<Arc<CorpusReport>> {
        None
    }
    fn put(&self, _key: String, _report: Arc<CorpusReport>) {}
}

/// In-process cache bounded by entry count; evicts the oldest insertion.
pub struct MemoryCache {
    capacity: usize,
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, Arc<CorpusReport>>,
    order: VecDeque<String>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CorpusCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Arc<CorpusReport>> {
        let inner = self.inner.lock().ok()?;
        inner.entries.get(key).cloned()
    }

    fn put(&self, key: String, report: Arc<CorpusReport>) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.entries.insert(key.clone(), report).is_none() {
            inner.order.push_back(key);
        }
        while inner.entries.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}
