// Handler-side building blocks: what a configured handler is and how it emits.

use crate::config::processed::{EncoderInternal, PatternEncoderInternal};
use crate::encoders::EventFormatter;
use crate::model::{Level, LogRecord};
use fibre::mpsc::BoundedSender;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// A destination that lives outside the crate, such as a pager hook or a test capture.
///
/// It receives each record already formatted by the handler's encoder, along with the record
/// itself for emitters that want structured access. Failures should come back as `Err`; a panic
/// is caught and reported the same way, and the remaining handlers still run.
pub trait Emitter: Send + Sync + 'static {
  fn emit(&self, record: &LogRecord, formatted: &[u8]) -> io::Result<()>;
}

/// An [`Emitter`] plus the level and format it runs with, bound to a `kind: external` handler
/// through `RollupBuilder::external`.
///
/// Settings made here take precedence over the handler's own `level` and `encoder` keys.
#[derive(Clone)]
pub struct ExternalHandler {
  pub(crate) emitter: Arc<dyn Emitter>,
  pub(crate) level: Option<Level>,
  pub(crate) encoder: Option<EncoderInternal>,
}

impl ExternalHandler {
  pub fn new<E: Emitter>(emitter: E) -> Self {
    Self::from_arc(Arc::new(emitter))
  }

  pub fn from_arc(emitter: Arc<dyn Emitter>) -> Self {
    Self {
      emitter,
      level: None,
      encoder: None,
    }
  }

  pub fn with_level(mut self, level: Level) -> Self {
    self.level = Some(level);
    self
  }

  pub fn with_pattern(self, pattern: impl Into<String>) -> Self {
    self.with_encoder(EncoderInternal::Pattern(PatternEncoderInternal {
      pattern_string: pattern.into(),
    }))
  }

  pub fn with_encoder(mut self, encoder: EncoderInternal) -> Self {
    self.encoder = Some(encoder);
    self
  }
}

pub(crate) type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// How a handler gets a record out once it has decided to take it.
pub(crate) enum HandlerAction {
  /// Console, file and rolling-file handlers: formatted bytes into a (non-blocking) writer.
  Write(SharedWriter),
  /// Custom handlers: the raw record into a bounded channel the application drains.
  SendRecord(BoundedSender<LogRecord>),
  /// External handlers.
  Emit(Arc<dyn Emitter>),
}

/// One configured handler, ready to receive records.
pub(crate) struct HandlerActor {
  pub(crate) name: String,
  pub(crate) level: Option<Level>,
  pub(crate) formatter: Arc<dyn EventFormatter>,
  pub(crate) action: HandlerAction,
}

impl HandlerActor {
  pub(crate) fn new(
    name: impl Into<String>,
    level: Option<Level>,
    formatter: Arc<dyn EventFormatter>,
    action: HandlerAction,
  ) -> Self {
    Self {
      name: name.into(),
      level,
      formatter,
      action,
    }
  }

  pub(crate) fn kind_name(&self) -> &'static str {
    match self.action {
      HandlerAction::Write(_) => "writer",
      HandlerAction::SendRecord(_) => "stream",
      HandlerAction::Emit(_) => "external",
    }
  }
}
