//! The ingestion API: [`Rollup`] ties resolution, aggregation and dispatch together.

use crate::{
  config::{
    processed::ConfigInternal,
    resolver::{ConfigResolver, EffectiveConfig, Resolution},
  },
  error::Result,
  error_handling::{ErrorReporter, InternalErrorReport, InternalErrorSource},
  exception::{self, RequestContext},
  fingerprint::Fingerprint,
  guards::WorkerGuardCollection,
  init,
  model::{Attributes, Level, LogRecord},
  store::{AggregationStore, MemoryRepository, SummaryRepository},
  subscriber::{Dispatcher, ExternalHandler, RecordStream},
};
use fibre::mpsc::{self, BoundedReceiver};
use parking_lot::Mutex;
use std::{collections::HashMap, error::Error as StdError, sync::Arc};

/// Source used when a caller gives none.
pub const ROOT_SOURCE: &str = "root";

/// What became of one `log` or `exception` call.
#[derive(Debug, Clone, PartialEq)]
pub enum LogOutcome {
  /// Below the source's threshold. Nothing was stored or emitted.
  Filtered,
  /// A not-found exception dropped because `ignore_not_found` is set.
  Ignored,
  /// The source resolves to no configuration. Reported on the internal error channel.
  Unroutable,
  Logged {
    /// False when the summary is suppression-only or storage failed.
    persisted: bool,
    /// The summary the record was rolled into, `None` if storage failed.
    summary: Option<Fingerprint>,
    /// Handlers that accepted the record.
    delivered: usize,
  },
}

impl LogOutcome {
  pub fn is_logged(&self) -> bool {
    matches!(self, LogOutcome::Logged { .. })
  }

  pub fn summary(&self) -> Option<Fingerprint> {
    match self {
      LogOutcome::Logged { summary, .. } => *summary,
      _ => None,
    }
  }
}

/// Configures and builds a [`Rollup`].
///
/// `build` resolves every source entry up front, so a logger without a resolvable level fails
/// here rather than on its first record.
pub struct RollupBuilder {
  config: ConfigInternal,
  repository: Option<Arc<dyn SummaryRepository>>,
  externals: HashMap<String, ExternalHandler>,
}

impl RollupBuilder {
  pub fn new(config: ConfigInternal) -> Self {
    Self {
      config,
      repository: None,
      externals: HashMap::new(),
    }
  }

  /// Storage for summaries and records. Defaults to a fresh [`MemoryRepository`].
  pub fn repository(mut self, repository: Arc<dyn SummaryRepository>) -> Self {
    self.repository = Some(repository);
    self
  }

  /// Binds an emitter to the `kind: external` handler called `name`.
  pub fn external(mut self, name: impl Into<String>, handler: ExternalHandler) -> Self {
    self.externals.insert(name.into(), handler);
    self
  }

  pub fn build(self) -> Result<Rollup> {
    let config = Arc::new(self.config);
    let resolver = ConfigResolver::new(config.clone())?;

    let (error_tx, error_rx) = match config.error_reporting_buffer {
      Some(capacity) => {
        println!("[fibre_rollup] Internal error reporting is ENABLED.");
        let (tx, rx) = mpsc::bounded::<InternalErrorReport>(capacity);
        (Some(tx), Some(rx))
      }
      None => (None, None),
    };
    let reporter = ErrorReporter::new(error_tx);

    let setup = init::build_handlers(&config, self.externals)?;
    let repository = self
      .repository
      .unwrap_or_else(|| Arc::new(MemoryRepository::new()));

    Ok(Rollup {
      store: AggregationStore::new(repository, config.headline_width),
      dispatcher: Dispatcher::new(setup.actors, reporter.clone()),
      reporter,
      resolver,
      config,
      error_rx: Mutex::new(error_rx),
      streams: Mutex::new(setup.streams),
      guards: setup.guards,
    })
  }
}

/// The ingestion entry point.
///
/// Safe to share between threads. Dropping it flushes the non-blocking handler writers.
pub struct Rollup {
  config: Arc<ConfigInternal>,
  resolver: ConfigResolver,
  store: AggregationStore,
  dispatcher: Dispatcher,
  reporter: ErrorReporter,
  error_rx: Mutex<Option<BoundedReceiver<InternalErrorReport>>>,
  streams: Mutex<HashMap<String, RecordStream>>,
  guards: WorkerGuardCollection,
}

impl Rollup {
  pub fn builder(config: ConfigInternal) -> RollupBuilder {
    RollupBuilder::new(config)
  }

  /// Logs `message` at `level`.
  ///
  /// `source` defaults to [`ROOT_SOURCE`] (the `rollup_*!` macros pass the calling module
  /// instead) and `host` to the configured `host`.
  pub fn log(
    &self,
    level: Level,
    message: impl Into<String>,
    source: Option<&str>,
    host: Option<&str>,
    attributes: Option<Attributes>,
  ) -> LogOutcome {
    let mut record = LogRecord::new(level, message, source.unwrap_or(ROOT_SOURCE));
    record.host = host.map(str::to_string);
    if let Some(attributes) = attributes {
      record.attributes = attributes;
    }
    self.log_record(record)
  }

  /// Runs an already built record through threshold check, aggregation and dispatch.
  pub fn log_record(&self, mut record: LogRecord) -> LogOutcome {
    let effective = match self.resolver.effective(&record.source) {
      Ok(effective) => effective,
      Err(e) => {
        self.reporter.report(
          InternalErrorSource::SourceResolution {
            source: record.source.clone(),
          },
          &e,
          None,
        );
        return LogOutcome::Unroutable;
      }
    };

    if !effective.threshold.allows(record.level) {
      return LogOutcome::Filtered;
    }

    if record.host.is_none() {
      record.host = self.config.host.clone();
    }

    let (persisted, summary) = match self.store.ingest(&mut record) {
      Ok(result) => (result.persisted, Some(result.summary.fingerprint)),
      Err(e) => {
        self.reporter.report(
          InternalErrorSource::Persistence {
            fingerprint: Some(self.store.fingerprint_of(&record)),
          },
          &e,
          Some(format!("Record: {}", record)),
        );
        (false, None)
      }
    };

    let delivered = self.dispatcher.dispatch(&record, &effective.routes);
    LogOutcome::Logged {
      persisted,
      summary,
      delivered,
    }
  }

  /// Logs an error, optionally with the request it happened under, at ERROR.
  ///
  /// With `ignore_not_found` set, errors that are (or wrap) a not-found error are dropped.
  pub fn exception(
    &self,
    message: &str,
    error: Option<&(dyn StdError + 'static)>,
    request: Option<&RequestContext>,
  ) -> LogOutcome {
    if self.config.ignore_not_found && error.is_some_and(exception::is_not_found) {
      return LogOutcome::Ignored;
    }
    let (body, source) = exception::exception_message(message, error, request);
    self.log_record(LogRecord::new(Level::Error, body, source))
  }

  pub fn debug(&self, message: impl Into<String>, source: &str) -> LogOutcome {
    self.log(Level::Debug, message, Some(source), None, None)
  }

  pub fn info(&self, message: impl Into<String>, source: &str) -> LogOutcome {
    self.log(Level::Info, message, Some(source), None, None)
  }

  pub fn warning(&self, message: impl Into<String>, source: &str) -> LogOutcome {
    self.log(Level::Warning, message, Some(source), None, None)
  }

  pub fn error(&self, message: impl Into<String>, source: &str) -> LogOutcome {
    self.log(Level::Error, message, Some(source), None, None)
  }

  pub fn critical(&self, message: impl Into<String>, source: &str) -> LogOutcome {
    self.log(Level::Critical, message, Some(source), None, None)
  }

  /// The resolved threshold and handlers for `source`, from the cache when possible.
  pub fn effective(&self, source: &str) -> Result<Arc<EffectiveConfig>> {
    self.resolver.effective(source)
  }

  pub fn resolve(&self, source: &str) -> Result<Resolution> {
    self.resolver.resolve_uncached(source)
  }

  pub fn config(&self) -> &ConfigInternal {
    &self.config
  }

  pub fn store(&self) -> &AggregationStore {
    &self.store
  }

  pub fn dispatcher(&self) -> &Dispatcher {
    &self.dispatcher
  }

  pub fn guards(&self) -> &WorkerGuardCollection {
    &self.guards
  }

  /// The internal error channel, if reporting is enabled. Can be taken once.
  pub fn take_error_receiver(&self) -> Option<BoundedReceiver<InternalErrorReport>> {
    self.error_rx.lock().take()
  }

  /// The stream of a `kind: custom` handler. Can be taken once per handler.
  pub fn take_stream(&self, handler_name: &str) -> Option<RecordStream> {
    self.streams.lock().remove(handler_name)
  }
}

/// Turns `module_path!()` into a dotted source. Used by the logging macros.
#[doc(hidden)]
pub fn module_source(module_path: &str) -> String {
  crate::subscriber::source_from_target(module_path)
}

/// Logs through a [`Rollup`] with the calling module as source.
///
/// ```ignore
/// rollup_log!(rollup, Level::Error, "timeout after {}ms", 300);
/// ```
#[macro_export]
macro_rules! rollup_log {
  ($rollup:expr, $level:expr, $($arg:tt)+) => {
    $rollup.log_record($crate::LogRecord::new(
      $level,
      ::std::format!($($arg)+),
      $crate::ingest::module_source(::std::module_path!()),
    ))
  };
}

#[macro_export]
macro_rules! rollup_debug {
  ($rollup:expr, $($arg:tt)+) => { $crate::rollup_log!($rollup, $crate::Level::Debug, $($arg)+) };
}

#[macro_export]
macro_rules! rollup_info {
  ($rollup:expr, $($arg:tt)+) => { $crate::rollup_log!($rollup, $crate::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! rollup_warning {
  ($rollup:expr, $($arg:tt)+) => { $crate::rollup_log!($rollup, $crate::Level::Warning, $($arg)+) };
}

#[macro_export]
macro_rules! rollup_error {
  ($rollup:expr, $($arg:tt)+) => { $crate::rollup_log!($rollup, $crate::Level::Error, $($arg)+) };
}

#[macro_export]
macro_rules! rollup_critical {
  ($rollup:expr, $($arg:tt)+) => { $crate::rollup_log!($rollup, $crate::Level::Critical, $($arg)+) };
}
