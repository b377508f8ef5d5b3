use super::SummaryRepository;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::model::{LogRecord, LogSummary, RecordId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Tables {
  summaries: HashMap<Fingerprint, LogSummary>,
  records: BTreeMap<RecordId, LogRecord>,
}

/// An in-process repository. Summaries and records live in maps behind a single `RwLock`, so a
/// cascade delete is one write-locked step.
#[derive(Default)]
pub struct MemoryRepository {
  tables: RwLock<Tables>,
  next_id: AtomicU64,
}

impl MemoryRepository {
  pub fn new() -> Self {
    Self::default()
  }
}

impl SummaryRepository for MemoryRepository {
  fn find_summary(&self, fingerprint: &Fingerprint) -> Result<Option<LogSummary>> {
    Ok(self.tables.read().summaries.get(fingerprint).cloned())
  }

  fn create_summary(&self, summary: &LogSummary) -> Result<()> {
    let mut tables = self.tables.write();
    if tables.summaries.contains_key(&summary.fingerprint) {
      return Err(Error::Storage(format!(
        "summary {} already exists",
        summary.fingerprint
      )));
    }
    tables.summaries.insert(summary.fingerprint, summary.clone());
    Ok(())
  }

  fn update_summary(&self, summary: &LogSummary) -> Result<()> {
    match self.tables.write().summaries.get_mut(&summary.fingerprint) {
      Some(stored) => {
        *stored = summary.clone();
        Ok(())
      }
      None => Err(Error::SummaryNotFound(summary.fingerprint)),
    }
  }

  fn delete_summary_cascade(&self, fingerprint: &Fingerprint) -> Result<usize> {
    let mut tables = self.tables.write();
    if tables.summaries.remove(fingerprint).is_none() {
      return Err(Error::SummaryNotFound(*fingerprint));
    }
    let before = tables.records.len();
    tables
      .records
      .retain(|_, record| record.summary.as_ref() != Some(fingerprint));
    Ok(before - tables.records.len())
  }

  fn create_record(&self, record: &LogRecord) -> Result<RecordId> {
    let mut tables = self.tables.write();
    if let Some(fp) = &record.summary {
      if !tables.summaries.contains_key(fp) {
        return Err(Error::SummaryNotFound(*fp));
      }
    }
    let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
    let mut stored = record.clone();
    stored.id = Some(id);
    tables.records.insert(id, stored);
    Ok(id)
  }

  fn summaries(&self) -> Result<Vec<LogSummary>> {
    let mut summaries: Vec<LogSummary> = self.tables.read().summaries.values().cloned().collect();
    summaries.sort_by(|a, b| b.latest.cmp(&a.latest));
    Ok(summaries)
  }

  fn records_for(&self, fingerprint: &Fingerprint) -> Result<Vec<LogRecord>> {
    Ok(
      self
        .tables
        .read()
        .records
        .values()
        .filter(|record| record.summary.as_ref() == Some(fingerprint))
        .cloned()
        .collect(),
    )
  }

  fn record_count(&self) -> Result<usize> {
    Ok(self.tables.read().records.len())
  }
}
