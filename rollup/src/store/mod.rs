//! The aggregation store: per-fingerprint rollup of records into summaries.
//!
//! Storage itself is behind [`SummaryRepository`]; the store owns the locking discipline. Every
//! operation that reads and then writes a summary holds that fingerprint's lock for the whole
//! cycle, so concurrent ingests never lose a hit and a record can't be linked to a summary that
//! is being deleted.

mod locks;
mod memory;

pub use memory::MemoryRepository;

use crate::error::{Error, Result};
use crate::fingerprint::{self, Fingerprint};
use crate::model::{LogRecord, LogSummary, RecordId};
use locks::StripedLocks;
use std::sync::Arc;

const DEFAULT_LOCK_STRIPES: usize = 64;

/// Persistence operations the store needs. Implementations only have to be individually
/// atomic; the store serializes multi-step sequences per fingerprint.
pub trait SummaryRepository: Send + Sync + 'static {
  fn find_summary(&self, fingerprint: &Fingerprint) -> Result<Option<LogSummary>>;

  fn create_summary(&self, summary: &LogSummary) -> Result<()>;

  fn update_summary(&self, summary: &LogSummary) -> Result<()>;

  /// Deletes the summary and every record linked to it. Returns the number of records removed.
  fn delete_summary_cascade(&self, fingerprint: &Fingerprint) -> Result<usize>;

  fn create_record(&self, record: &LogRecord) -> Result<RecordId>;

  /// All summaries, most recently seen first.
  fn summaries(&self) -> Result<Vec<LogSummary>>;

  fn records_for(&self, fingerprint: &Fingerprint) -> Result<Vec<LogRecord>>;

  fn record_count(&self) -> Result<usize>;
}

/// What happened to one ingested record.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
  /// False when the summary is suppression-only and the record was discarded.
  pub persisted: bool,
  /// True when this record opened a new summary.
  pub created: bool,
  pub record_id: Option<RecordId>,
  /// The summary state right after this record was folded in.
  pub summary: LogSummary,
}

pub struct AggregationStore {
  repository: Arc<dyn SummaryRepository>,
  locks: StripedLocks,
  headline_width: usize,
}

impl AggregationStore {
  pub fn new(repository: Arc<dyn SummaryRepository>, headline_width: usize) -> Self {
    Self {
      repository,
      locks: StripedLocks::new(DEFAULT_LOCK_STRIPES),
      headline_width: headline_width.max(1),
    }
  }

  /// A store over a fresh [`MemoryRepository`].
  pub fn in_memory(headline_width: usize) -> Self {
    Self::new(Arc::new(MemoryRepository::new()), headline_width)
  }

  pub fn headline_width(&self) -> usize {
    self.headline_width
  }

  pub fn fingerprint_of(&self, record: &LogRecord) -> Fingerprint {
    fingerprint::fingerprint(
      record.level,
      &record.source,
      record.host.as_deref(),
      &record.message,
      self.headline_width,
    )
  }

  /// Folds `record` into its summary and persists it unless the summary is suppression-only.
  ///
  /// On return `record.summary` points at the summary, and `record.id` is set if it was stored.
  pub fn ingest(&self, record: &mut LogRecord) -> Result<AggregationResult> {
    let fp = self.fingerprint_of(record);
    let _guard = self.locks.lock(&fp);

    let (summary, created) = match self.repository.find_summary(&fp)? {
      Some(mut summary) => {
        summary.observe(record);
        self.repository.update_summary(&summary)?;
        (summary, false)
      }
      None => {
        let headline = fingerprint::headline(&record.message, self.headline_width).to_string();
        let summary = LogSummary::first_occurrence(fp, headline, record);
        self.repository.create_summary(&summary)?;
        (summary, true)
      }
    };

    record.summary = Some(fp);

    if summary.suppressed {
      return Ok(AggregationResult {
        persisted: false,
        created,
        record_id: None,
        summary,
      });
    }

    let id = self.repository.create_record(record)?;
    record.id = Some(id);
    Ok(AggregationResult {
      persisted: true,
      created,
      record_id: Some(id),
      summary,
    })
  }

  /// Deletes a summary together with all of its records.
  pub fn delete_summary(&self, fingerprint: &Fingerprint) -> Result<usize> {
    let _guard = self.locks.lock(fingerprint);
    self.repository.delete_summary_cascade(fingerprint)
  }

  /// Switches suppression-only mode for a summary. Returns the previous setting.
  pub fn set_suppressed(&self, fingerprint: &Fingerprint, suppressed: bool) -> Result<bool> {
    let _guard = self.locks.lock(fingerprint);
    let mut summary = self
      .repository
      .find_summary(fingerprint)?
      .ok_or(Error::SummaryNotFound(*fingerprint))?;
    let previous = summary.suppressed;
    if previous != suppressed {
      summary.suppressed = suppressed;
      self.repository.update_summary(&summary)?;
    }
    Ok(previous)
  }

  pub fn summary(&self, fingerprint: &Fingerprint) -> Result<Option<LogSummary>> {
    self.repository.find_summary(fingerprint)
  }

  pub fn summaries(&self) -> Result<Vec<LogSummary>> {
    self.repository.summaries()
  }

  pub fn records_for(&self, fingerprint: &Fingerprint) -> Result<Vec<LogRecord>> {
    self.repository.records_for(fingerprint)
  }

  pub fn record_count(&self) -> Result<usize> {
    self.repository.record_count()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Level;
  use chrono::{Duration, Utc};

  fn record(message: &str) -> LogRecord {
    LogRecord::new(Level::Error, message, "app.db").with_host("h1")
  }

  #[test]
  fn first_record_creates_summary() {
    let store = AggregationStore::in_memory(60);
    let mut rec = record("timeout\nretrying");
    let result = store.ingest(&mut rec).unwrap();

    assert!(result.created);
    assert!(result.persisted);
    assert_eq!(result.summary.hits, 1);
    assert_eq!(result.summary.headline, "timeout");
    assert_eq!(result.summary.earliest, result.summary.latest);
    assert_eq!(rec.summary, Some(result.summary.fingerprint));
    assert_eq!(rec.id, result.record_id);
  }

  #[test]
  fn matching_records_share_one_summary() {
    let store = AggregationStore::in_memory(60);
    let messages = ["timeout\nretrying", "timeout\nretry #2", "timeout\nretry #3"];
    let mut last = None;
    for message in messages {
      last = Some(store.ingest(&mut record(message)).unwrap());
    }
    let last = last.unwrap();

    assert_eq!(store.summaries().unwrap().len(), 1);
    assert_eq!(last.summary.hits, 3);
    assert_eq!(last.summary.latest_message, "timeout\nretry #3");
    assert_eq!(store.records_for(&last.summary.fingerprint).unwrap().len(), 3);
  }

  #[test]
  fn time_bounds_track_min_and_max() {
    let store = AggregationStore::in_memory(60);
    let now = Utc::now();
    store
      .ingest(&mut record("x").with_timestamp(now))
      .unwrap();
    store
      .ingest(&mut record("x").with_timestamp(now - Duration::seconds(30)))
      .unwrap();
    let result = store
      .ingest(&mut record("x").with_timestamp(now + Duration::seconds(30)))
      .unwrap();

    assert_eq!(result.summary.earliest, now - Duration::seconds(30));
    assert_eq!(result.summary.latest, now + Duration::seconds(30));
  }

  #[test]
  fn suppressed_summary_counts_without_storing() {
    let store = AggregationStore::in_memory(60);
    let fp = store.ingest(&mut record("noisy")).unwrap().summary.fingerprint;
    assert!(!store.set_suppressed(&fp, true).unwrap());

    for _ in 0..5 {
      let result = store.ingest(&mut record("noisy")).unwrap();
      assert!(!result.persisted);
      assert_eq!(result.record_id, None);
    }

    let summary = store.summary(&fp).unwrap().unwrap();
    assert_eq!(summary.hits, 6);
    assert_eq!(store.records_for(&fp).unwrap().len(), 1);
  }

  #[test]
  fn delete_cascades_to_records() {
    let store = AggregationStore::in_memory(60);
    let fp = store.ingest(&mut record("a")).unwrap().summary.fingerprint;
    store.ingest(&mut record("a")).unwrap();
    store.ingest(&mut record("b")).unwrap();

    assert_eq!(store.delete_summary(&fp).unwrap(), 2);
    assert!(store.summary(&fp).unwrap().is_none());
    assert_eq!(store.record_count().unwrap(), 1);
    assert!(matches!(
      store.delete_summary(&fp),
      Err(Error::SummaryNotFound(_))
    ));
  }

  #[test]
  fn recreated_after_delete_starts_over() {
    let store = AggregationStore::in_memory(60);
    let fp = store.ingest(&mut record("a")).unwrap().summary.fingerprint;
    store.ingest(&mut record("a")).unwrap();
    store.delete_summary(&fp).unwrap();

    let result = store.ingest(&mut record("a")).unwrap();
    assert!(result.created);
    assert_eq!(result.summary.hits, 1);
  }

  #[test]
  fn set_suppressed_on_unknown_summary_fails() {
    let store = AggregationStore::in_memory(60);
    let fp = store.fingerprint_of(&record("never seen"));
    assert!(matches!(
      store.set_suppressed(&fp, true),
      Err(Error::SummaryNotFound(_))
    ));
  }
}
