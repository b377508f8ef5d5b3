// The tracing Layer that turns `tracing` events into Rollup records.

use crate::{
  ingest::Rollup,
  model::{Level, LogRecord},
  subscriber::{source_from_target, visitor::AttributeVisitor},
};
use std::sync::Arc;
use tracing::{Event, Subscriber};
use tracing_subscriber::{
  layer::{Context, Layer},
  registry::LookupSpan,
};

/// Feeds every `tracing` event into [`Rollup::log_record`].
///
/// The event target becomes the source (`my_app::db` is `my_app.db`), the `message` field the
/// body, and all other fields attributes. Thresholds, aggregation and handler routing are the
/// Rollup's, so install this layer unfiltered.
pub struct RollupLayer {
  rollup: Arc<Rollup>,
}

impl RollupLayer {
  pub fn new(rollup: Arc<Rollup>) -> Self {
    Self { rollup }
  }

  fn build_record(&self, event: &Event<'_>) -> LogRecord {
    let metadata = event.metadata();
    let mut visitor = AttributeVisitor::default();
    event.record(&mut visitor);

    let mut record = LogRecord::new(
      level_from_tracing(*metadata.level()),
      visitor.message.unwrap_or_default(),
      source_from_target(metadata.target()),
    );
    record.attributes = visitor.attributes;

    if let Some(name) = std::thread::current().name() {
      record
        .attributes
        .entry("thread".to_string())
        .or_insert_with(|| name.into());
    }
    record
  }
}

/// `TRACE` has no counterpart and is folded into `DEBUG`.
pub(crate) fn level_from_tracing(level: tracing_core::Level) -> Level {
  match level {
    tracing_core::Level::ERROR => Level::Error,
    tracing_core::Level::WARN => Level::Warning,
    tracing_core::Level::INFO => Level::Info,
    _ => Level::Debug,
  }
}

impl<S> Layer<S> for RollupLayer
where
  S: Subscriber + for<'span> LookupSpan<'span>,
{
  fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
    let record = self.build_record(event);
    self.rollup.log_record(record);
  }
}
