use crate::{
  error::{Error, Result},
  ingest::Rollup,
  model::{Level, LogRecord, LogValue},
  subscriber::source_from_target,
};
use log::{LevelFilter as LogLevelFilter, Metadata as LogMetadata, Record};
use std::sync::Arc;

/// A `log::Log` implementation that forwards records to a [`Rollup`].
pub struct RollupLogger {
  rollup: Arc<Rollup>,
}

impl RollupLogger {
  pub fn new(rollup: Arc<Rollup>) -> Self {
    Self { rollup }
  }

  fn build_record(&self, record: &Record<'_>) -> LogRecord {
    let mut rollup_record = LogRecord::new(
      level_from_log(record.level()),
      format!("{}", record.args()),
      source_from_target(record.target()),
    );

    if let Some(path) = record.module_path() {
      rollup_record
        .attributes
        .insert("module_path".to_string(), LogValue::String(path.to_string()));
    }
    if let Some(file) = record.file() {
      rollup_record
        .attributes
        .insert("file".to_string(), LogValue::String(file.to_string()));
    }
    if let Some(line) = record.line() {
      rollup_record
        .attributes
        .insert("line".to_string(), LogValue::Int(i64::from(line)));
    }

    rollup_record
  }
}

fn level_from_log(level: log::Level) -> Level {
  match level {
    log::Level::Error => Level::Error,
    log::Level::Warn => Level::Warning,
    log::Level::Info => Level::Info,
    log::Level::Debug | log::Level::Trace => Level::Debug,
  }
}

impl log::Log for RollupLogger {
  fn enabled(&self, metadata: &LogMetadata) -> bool {
    metadata.level() <= log::max_level()
  }

  fn log(&self, record: &Record) {
    if !self.enabled(record.metadata()) {
      return;
    }
    self.rollup.log_record(self.build_record(record));
  }

  fn flush(&self) {
    // Handler writers flush through their worker guards.
  }
}

/// Installs a [`RollupLogger`] as the global `log` logger.
///
/// `max_level` is the `log` crate's global cap; per-source thresholds still apply after it.
pub fn init_log_bridge(rollup: Arc<Rollup>, max_level: LogLevelFilter) -> Result<()> {
  log::set_boxed_logger(Box::new(RollupLogger::new(rollup)))
    .map_err(|e| Error::LogBridgeInit(e.to_string()))?;
  log::set_max_level(max_level);
  println!("[fibre_rollup] log bridge initialized.");
  Ok(())
}
