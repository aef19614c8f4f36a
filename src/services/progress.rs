//! Reading progress handed to the persistence collaborator.
//!
//! The reader only decides *when* to report; storage lives behind
//! [`ProgressStore`].

use crate::error::Result;
use chrono::{DateTime, Local};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

static CHAPTER_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:chapitre|chapter|ch)[_\s.-]*").expect("Failed to compile chapter prefix regex")
});

/// Identifies a chapter within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgressKey {
    pub collection: String,
    pub chapter: String,
}

impl ProgressKey {
    pub fn new(collection: impl Into<String>, chapter: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            chapter: chapter.into(),
        }
    }

    /// Derives the key from `<collection>/<chapter-file>`.
    ///
    /// `One Piece/Chapter_1044.cbz` becomes `("One Piece", "1044")`. An
    /// already extracted chapter directory keeps its full name.
    pub fn from_archive_path(path: &Path) -> Option<Self> {
        let collection = path.parent()?.file_name()?.to_string_lossy().into_owned();
        let name = if path.is_dir() {
            path.file_name()?
        } else {
            path.file_stem()?
        };
        let stem = name.to_string_lossy().into_owned();
        let chapter = match CHAPTER_PREFIX.replace(&stem, "") {
            stripped if stripped.is_empty() => stem.clone(),
            stripped => stripped.into_owned(),
        };
        Some(Self::new(collection, chapter))
    }
}

/// One progress snapshot.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub key: ProgressKey,
    /// 1-indexed
    pub current_page: usize,
    pub total_pages: usize,
    pub completed: bool,
    pub saved_at: DateTime<Local>,
}

impl ProgressRecord {
    pub fn new(key: ProgressKey, current_page: usize, total_pages: usize) -> Self {
        Self {
            key,
            current_page,
            total_pages,
            completed: total_pages > 0 && current_page >= total_pages,
            saved_at: Local::now(),
        }
    }
}

/// Storage for reading progress.
pub trait ProgressStore: Send {
    /// Stores `record` if the store's policy accepts it; `force` overrides
    /// the policy. Returns whether the record was written.
    fn save(&mut self, record: &ProgressRecord, force: bool) -> Result<bool>;

    fn load(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>>;
}

/// In-memory store that keeps the furthest page reached.
///
/// A write lands when forced, when it moves past the stored page, or when it
/// completes the chapter.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: HashMap<ProgressKey, ProgressRecord>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn save(&mut self, record: &ProgressRecord, force: bool) -> Result<bool> {
        let existing = self
            .records
            .get(&record.key)
            .map(|r| r.current_page)
            .unwrap_or(0);
        if !(force || record.current_page > existing || record.completed) {
            return Ok(false);
        }

        debug!(
            "Progress saved for {} chapter {}: page={}, total={}, read={}",
            record.key.collection,
            record.key.chapter,
            record.current_page,
            record.total_pages,
            record.completed
        );
        self.records.insert(record.key.clone(), record.clone());
        Ok(true)
    }

    fn load(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>> {
        Ok(self.records.get(key).cloned())
    }
}

/// Throttles progress reports for one chapter.
///
/// Reports are dropped when the page has not changed since the last write or
/// when the previous write is younger than the interval. [`flush`] forces the
/// latest position out, e.g. when the session ends.
///
/// [`flush`]: ProgressReporter::flush
pub struct ProgressReporter {
    key: ProgressKey,
    store: Box<dyn ProgressStore>,
    interval: Duration,
    last_write: Option<Instant>,
    last_written_page: Option<usize>,
    latest: Option<(usize, usize)>,
}

impl ProgressReporter {
    pub fn new(key: ProgressKey, store: Box<dyn ProgressStore>, interval: Duration) -> Self {
        Self {
            key,
            store,
            interval,
            last_write: None,
            last_written_page: None,
            latest: None,
        }
    }

    pub fn key(&self) -> &ProgressKey {
        &self.key
    }

    pub fn store(&self) -> &dyn ProgressStore {
        self.store.as_ref()
    }

    /// 1-indexed page to reopen the chapter at: the stored page, or 1.
    pub fn resume_page(&self) -> usize {
        match self.store.load(&self.key) {
            Ok(Some(record)) => record.current_page.max(1),
            Ok(None) => 1,
            Err(e) => {
                warn!("Cannot load progress: {}", e);
                1
            }
        }
    }

    pub fn report(&mut self, current_page: usize, total_pages: usize) {
        self.report_at(Instant::now(), current_page, total_pages);
    }

    /// Reports the position as observed at `now`.
    pub fn report_at(&mut self, now: Instant, current_page: usize, total_pages: usize) {
        self.latest = Some((current_page, total_pages));
        if self.last_written_page == Some(current_page) {
            return;
        }
        if self
            .last_write
            .is_some_and(|last| now.duration_since(last) < self.interval)
        {
            return;
        }
        self.write(now, current_page, total_pages, false);
    }

    /// Writes the latest reported position regardless of throttling.
    pub fn flush(&mut self) {
        if let Some((current_page, total_pages)) = self.latest {
            self.write(Instant::now(), current_page, total_pages, true);
        }
    }

    fn write(&mut self, now: Instant, current_page: usize, total_pages: usize, force: bool) {
        let record = ProgressRecord::new(self.key.clone(), current_page, total_pages);
        match self.store.save(&record, force) {
            Ok(_) => {
                self.last_write = Some(now);
                self.last_written_page = Some(current_page);
            }
            Err(e) => warn!("{}", e),
        }
    }
}
