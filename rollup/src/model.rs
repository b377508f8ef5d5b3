use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Record severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
  Debug,
  Info,
  Warning,
  Error,
  Critical,
}

impl Level {
  pub const ALL: [Level; 5] = [
    Level::Debug,
    Level::Info,
    Level::Warning,
    Level::Error,
    Level::Critical,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Level::Debug => "DEBUG",
      Level::Info => "INFO",
      Level::Warning => "WARNING",
      Level::Error => "ERROR",
      Level::Critical => "CRITICAL",
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // `pad` so that width specifiers like `{:<8}` apply.
    f.pad(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError(pub String);

impl fmt::Display for ParseLevelError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Invalid log level string '{}'. Expected DEBUG, INFO, WARNING, ERROR, or CRITICAL.",
      self.0
    )
  }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
  type Err = ParseLevelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "DEBUG" => Ok(Level::Debug),
      "INFO" => Ok(Level::Info),
      "WARNING" | "WARN" => Ok(Level::Warning),
      "ERROR" => Ok(Level::Error),
      "CRITICAL" | "FATAL" => Ok(Level::Critical),
      _ => Err(ParseLevelError(s.to_string())),
    }
  }
}

/// A severity threshold.
///
/// Unlike [`Level`] it has a value below `DEBUG`, [`LevelFilter::ALL`], which lets every record
/// through. A source configured with handlers but no level resolves to `ALL`, leaving each
/// handler to decide for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LevelFilter(Option<Level>);

impl LevelFilter {
  pub const ALL: LevelFilter = LevelFilter(None);
  pub const DEBUG: LevelFilter = LevelFilter(Some(Level::Debug));
  pub const INFO: LevelFilter = LevelFilter(Some(Level::Info));
  pub const WARNING: LevelFilter = LevelFilter(Some(Level::Warning));
  pub const ERROR: LevelFilter = LevelFilter(Some(Level::Error));
  pub const CRITICAL: LevelFilter = LevelFilter(Some(Level::Critical));

  /// The minimum level this filter requires, or `None` for [`LevelFilter::ALL`].
  pub fn min_level(&self) -> Option<Level> {
    self.0
  }

  pub fn allows(&self, level: Level) -> bool {
    match self.0 {
      Some(min) => level >= min,
      None => true,
    }
  }
}

impl From<Level> for LevelFilter {
  fn from(level: Level) -> Self {
    LevelFilter(Some(level))
  }
}

impl fmt::Display for LevelFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.0 {
      Some(level) => fmt::Display::fmt(&level, f),
      None => f.pad("ALL"),
    }
  }
}

/// Represents a loggable value, part of a `LogRecord`'s attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
  String(String),
  Int(i64),
  Float(f64),
  Bool(bool),
  Debug(String),
}

impl fmt::Display for LogValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LogValue::String(s) => write!(f, "{}", s),
      LogValue::Int(i) => write!(f, "{}", i),
      LogValue::Float(v) => write!(f, "{}", v),
      LogValue::Bool(b) => write!(f, "{}", b),
      LogValue::Debug(d) => write!(f, "{}", d),
    }
  }
}

impl From<&str> for LogValue {
  fn from(value: &str) -> Self {
    LogValue::String(value.to_string())
  }
}

impl From<String> for LogValue {
  fn from(value: String) -> Self {
    LogValue::String(value)
  }
}

impl From<i64> for LogValue {
  fn from(value: i64) -> Self {
    LogValue::Int(value)
  }
}

impl From<f64> for LogValue {
  fn from(value: f64) -> Self {
    LogValue::Float(value)
  }
}

impl From<bool> for LogValue {
  fn from(value: bool) -> Self {
    LogValue::Bool(value)
  }
}

/// Structured key/value data carried by a record to its handlers.
pub type Attributes = HashMap<String, LogValue>;

/// Identifier assigned by the repository when a record is persisted.
pub type RecordId = u64;

/// Default abbreviation width used by admin-style listings.
pub const DEFAULT_ABBREV_LEN: usize = 500;

fn abbreviate(msg: &str, maxlen: usize) -> String {
  match msg.char_indices().nth(maxlen) {
    Some((cut, _)) => format!("{} ...", &msg[..cut]),
    None => msg.to_string(),
  }
}

/// One observed log event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
  /// Set by the repository once the record is persisted.
  pub id: Option<RecordId>,
  pub timestamp: DateTime<Utc>,
  pub level: Level,
  pub message: String,
  /// Dotted hierarchical origin, e.g. `app.db.pool`.
  pub source: String,
  pub host: Option<String>,
  pub attributes: Attributes,
  /// The summary this record was aggregated into.
  pub summary: Option<Fingerprint>,
}

impl LogRecord {
  pub fn new<M, S>(level: Level, message: M, source: S) -> Self
  where
    M: Into<String>,
    S: Into<String>,
  {
    LogRecord {
      id: None,
      timestamp: Utc::now(),
      level,
      message: message.into(),
      source: source.into(),
      host: None,
      attributes: HashMap::new(),
      summary: None,
    }
  }

  pub fn with_host(mut self, host: impl Into<String>) -> Self {
    self.host = Some(host.into());
    self
  }

  pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
    self.timestamp = timestamp;
    self
  }

  pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<LogValue>) -> Self {
    self.attributes.insert(key.into(), value.into());
    self
  }

  pub fn abbrev_message(&self, maxlen: usize) -> String {
    abbreviate(&self.message, maxlen)
  }
}

impl fmt::Display for LogRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "<{}: {} {} {}>",
      self.level,
      self.host.as_deref().unwrap_or(""),
      self.source,
      self.abbrev_message(20)
    )
  }
}

/// The rollup of every record sharing one fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSummary {
  pub fingerprint: Fingerprint,
  pub level: Level,
  pub source: String,
  pub host: Option<String>,
  pub earliest: DateTime<Utc>,
  pub latest: DateTime<Utc>,
  /// Every observed record, persisted or not.
  pub hits: u64,
  pub headline: String,
  pub latest_message: String,
  /// When set, matching records are counted but never stored.
  pub suppressed: bool,
}

impl LogSummary {
  /// Starts a summary from the first record of its fingerprint.
  pub(crate) fn first_occurrence(
    fingerprint: Fingerprint,
    headline: String,
    record: &LogRecord,
  ) -> Self {
    LogSummary {
      fingerprint,
      level: record.level,
      source: record.source.clone(),
      host: record.host.clone(),
      earliest: record.timestamp,
      latest: record.timestamp,
      hits: 1,
      headline,
      latest_message: record.message.clone(),
      suppressed: false,
    }
  }

  /// Folds a later occurrence into this summary.
  pub(crate) fn observe(&mut self, record: &LogRecord) {
    self.hits += 1;
    if record.timestamp > self.latest {
      self.latest = record.timestamp;
    }
    if record.timestamp < self.earliest {
      self.earliest = record.timestamp;
    }
    self.latest_message = record.message.clone();
  }

  pub fn abbrev_message(&self, maxlen: usize) -> String {
    abbreviate(&self.latest_message, maxlen)
  }
}

impl fmt::Display for LogSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "<SUMMARY {}: {} {} {}>",
      self.level,
      self.host.as_deref().unwrap_or(""),
      self.source,
      self.abbrev_message(20)
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn levels_are_ordered_by_severity() {
    assert!(Level::Debug < Level::Info);
    assert!(Level::Info < Level::Warning);
    assert!(Level::Warning < Level::Error);
    assert!(Level::Error < Level::Critical);
  }

  #[test]
  fn parse_level_accepts_aliases_case_insensitively() {
    assert_eq!("debug".parse::<Level>().unwrap(), Level::Debug);
    assert_eq!("InFo".parse::<Level>().unwrap(), Level::Info);
    assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
    assert_eq!("WARNING".parse::<Level>().unwrap(), Level::Warning);
    assert_eq!("fatal".parse::<Level>().unwrap(), Level::Critical);
    assert!("verbose".parse::<Level>().is_err());
  }

  #[test]
  fn level_filter_all_lets_everything_through() {
    for level in Level::ALL {
      assert!(LevelFilter::ALL.allows(level));
    }
    assert!(LevelFilter::ALL < LevelFilter::DEBUG);
  }

  #[test]
  fn level_filter_compares_against_minimum() {
    let filter = LevelFilter::WARNING;
    assert!(!filter.allows(Level::Info));
    assert!(filter.allows(Level::Warning));
    assert!(filter.allows(Level::Critical));
  }

  #[test]
  fn abbreviation_appends_ellipsis_only_when_cut() {
    let record = LogRecord::new(Level::Info, "0123456789", "app");
    assert_eq!(record.abbrev_message(20), "0123456789");
    assert_eq!(record.abbrev_message(4), "0123 ...");
  }

  #[test]
  fn display_pads_level() {
    assert_eq!(format!("[{:<8}]", Level::Info), "[INFO    ]");
    assert_eq!(format!("{}", LevelFilter::ALL), "ALL");
  }
}
