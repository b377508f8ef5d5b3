use crate::fingerprint::Fingerprint;
use fibre::{error::TrySendError, mpsc::BoundedSender};
use std::fmt;

#[derive(Debug, Clone)]
pub enum InternalErrorSource {
  HandlerEmit { handler_name: String },
  EventFormatting { handler_name: String },
  Persistence { fingerprint: Option<Fingerprint> },
  SourceResolution { source: String },
}

impl fmt::Display for InternalErrorSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InternalErrorSource::HandlerEmit { handler_name } => {
        write!(f, "HandlerEmit {{ handler_name: \"{}\" }}", handler_name)
      }
      InternalErrorSource::EventFormatting { handler_name } => {
        write!(f, "EventFormatting {{ handler_name: \"{}\" }}", handler_name)
      }
      InternalErrorSource::Persistence { fingerprint } => match fingerprint {
        Some(fp) => write!(f, "Persistence {{ fingerprint: \"{}\" }}", fp),
        None => write!(f, "Persistence"),
      },
      InternalErrorSource::SourceResolution { source } => {
        write!(f, "SourceResolution {{ source: \"{}\" }}", source)
      }
    }
  }
}

#[derive(Debug)]
pub struct InternalErrorReport {
  pub source: InternalErrorSource,
  pub error_message: String,
  pub context: Option<String>,
  pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InternalErrorReport {
  pub(crate) fn new<E: std::error::Error + ?Sized>(
    source: InternalErrorSource,
    error: &E,
    context: Option<String>,
  ) -> Self {
    Self {
      source,
      error_message: error.to_string(),
      context,
      timestamp: chrono::Utc::now(),
    }
  }
}

/// Where runtime failures go. Shared by the dispatcher and the ingestion API.
///
/// With reporting enabled, reports are pushed into a bounded channel the application drains.
/// Otherwise, or when that channel is full, they are printed to stderr.
#[derive(Clone, Default)]
pub(crate) struct ErrorReporter {
  tx: Option<BoundedSender<InternalErrorReport>>,
}

impl ErrorReporter {
  pub(crate) fn new(tx: Option<BoundedSender<InternalErrorReport>>) -> Self {
    Self { tx }
  }

  /// Delivers a report and says where it went. Reports never vanish: anything the channel
  /// refuses (full, or its receiver dropped) is printed to stderr instead.
  pub(crate) fn report<E: std::error::Error + ?Sized>(
    &self,
    source: InternalErrorSource,
    error: &E,
    context: Option<String>,
  ) -> ReportRoute {
    let Some(tx) = &self.tx else {
      eprintln!("[fibre_rollup:ERROR] {}: {}", source, error);
      return ReportRoute::Stderr;
    };

    let summary = format!("{}: {}", source, error);
    let report = InternalErrorReport::new(source, error, context);
    match tx.try_send(report) {
      Ok(()) => ReportRoute::Channel,
      Err(TrySendError::Full(_)) => {
        eprintln!(
          "[fibre_rollup:ERROR] Internal error channel full. Dropping error report: {}",
          summary
        );
        ReportRoute::Stderr
      }
      Err(_) => {
        eprintln!("[fibre_rollup:ERROR] Internal error channel closed. {}", summary);
        ReportRoute::Stderr
      }
    }
  }
}

/// Where [`ErrorReporter::report`] put a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReportRoute {
  Channel,
  Stderr,
}
