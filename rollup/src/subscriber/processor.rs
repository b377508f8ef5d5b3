use crate::config::resolver::HandlerRoute;
use crate::error::Error;
use crate::error_handling::{ErrorReporter, InternalErrorSource};
use crate::model::LogRecord;
use crate::subscriber::actor::{HandlerAction, HandlerActor};
use fibre::error::TrySendError;
use std::any::Any;
use std::collections::HashMap;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};

/// Routes accepted records to their resolved handlers.
///
/// Each route applies its own minimum level (the route's, else the handler's) and format (the
/// route's, else the handler's encoder). A handler that fails is reported and skipped; it never
/// stops the others and never reaches the caller.
pub struct Dispatcher {
  actors: HashMap<String, HandlerActor>,
  reporter: ErrorReporter,
}

impl Dispatcher {
  pub(crate) fn new(actors: Vec<HandlerActor>, reporter: ErrorReporter) -> Self {
    Self {
      actors: actors
        .into_iter()
        .map(|actor| (actor.name.clone(), actor))
        .collect(),
      reporter,
    }
  }

  pub fn handler_names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.actors.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }

  /// Sends `record` through every route. Returns how many handlers accepted it.
  pub fn dispatch(&self, record: &LogRecord, routes: &[HandlerRoute]) -> usize {
    let mut delivered = 0;

    for route in routes {
      let Some(actor) = self.actors.get(&route.name) else {
        self.reporter.report(
          InternalErrorSource::HandlerEmit {
            handler_name: route.name.clone(),
          },
          &Error::Internal("handler is not registered".to_string()),
          Some(format!("Record source: {}", record.source)),
        );
        continue;
      };

      if let Some(min_level) = route.level.or(actor.level) {
        if record.level < min_level {
          continue;
        }
      }

      if self.deliver(actor, route, record) {
        delivered += 1;
      }
    }

    delivered
  }

  fn deliver(&self, actor: &HandlerActor, route: &HandlerRoute, record: &LogRecord) -> bool {
    match &actor.action {
      // Streams take the record as-is.
      HandlerAction::SendRecord(sender) => match sender.try_send(record.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
          eprintln!(
            "[fibre_rollup:WARN] Custom handler stream for '{}' is full. Dropping record.",
            actor.name
          );
          false
        }
        Err(_) => {
          self.report_emit(
            actor,
            record,
            &io::Error::new(io::ErrorKind::BrokenPipe, "stream receiver was dropped"),
          );
          false
        }
      },
      HandlerAction::Write(writer) => {
        self.emit_formatted(actor, route, record, |bytes| writer.lock().write_all(bytes))
      }
      HandlerAction::Emit(emitter) => {
        self.emit_formatted(actor, route, record, |bytes| {
          // A panicking emitter counts as a failed emit.
          panic::catch_unwind(AssertUnwindSafe(|| emitter.emit(record, bytes)))
            .unwrap_or_else(|payload| Err(io::Error::other(panic_message(payload.as_ref()))))
        })
      }
    }
  }

  fn emit_formatted<F>(
    &self,
    actor: &HandlerActor,
    route: &HandlerRoute,
    record: &LogRecord,
    emit: F,
  ) -> bool
  where
    F: FnOnce(&[u8]) -> io::Result<()>,
  {
    let formatter = route.formatter.as_ref().unwrap_or(&actor.formatter);
    let formatted = match formatter.format_event(record) {
      Ok(bytes) => bytes,
      Err(e) => {
        self.reporter.report(
          InternalErrorSource::EventFormatting {
            handler_name: actor.name.clone(),
          },
          &e,
          Some(format!("Record source: {}", record.source)),
        );
        return false;
      }
    };

    match emit(&formatted) {
      Ok(()) => true,
      Err(e) => {
        self.report_emit(actor, record, &e);
        false
      }
    }
  }

  fn report_emit(&self, actor: &HandlerActor, record: &LogRecord, error: &io::Error) {
    self.reporter.report(
      InternalErrorSource::HandlerEmit {
        handler_name: actor.name.clone(),
      },
      error,
      Some(format!("Record source: {}", record.source)),
    );
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  let detail = payload
    .downcast_ref::<&str>()
    .copied()
    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
    .unwrap_or("non-string payload");
  format!("emitter panicked: {}", detail)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encoders::pattern::PatternFormatter;
  use crate::encoders::EventFormatter;
  use crate::model::Level;
  use crate::subscriber::actor::Emitter;
  use parking_lot::Mutex;
  use std::sync::Arc;

  #[derive(Default)]
  struct Capture {
    lines: Mutex<Vec<String>>,
  }

  impl Emitter for Capture {
    fn emit(&self, _record: &LogRecord, formatted: &[u8]) -> io::Result<()> {
      self
        .lines
        .lock()
        .push(String::from_utf8_lossy(formatted).into_owned());
      Ok(())
    }
  }

  struct Broken;

  impl Emitter for Broken {
    fn emit(&self, _record: &LogRecord, _formatted: &[u8]) -> io::Result<()> {
      Err(io::Error::new(io::ErrorKind::Other, "pager offline"))
    }
  }

  struct Panicking;

  impl Emitter for Panicking {
    fn emit(&self, _record: &LogRecord, _formatted: &[u8]) -> io::Result<()> {
      panic!("pager exploded");
    }
  }

  fn formatter(pattern: &str) -> Arc<dyn EventFormatter> {
    Arc::new(PatternFormatter::new(pattern))
  }

  fn emit_actor(name: &str, level: Option<Level>, emitter: Arc<dyn Emitter>) -> HandlerActor {
    HandlerActor::new(name, level, formatter("%p %m"), HandlerAction::Emit(emitter))
  }

  fn route(name: &str) -> HandlerRoute {
    HandlerRoute {
      name: name.to_string(),
      level: None,
      formatter: None,
    }
  }

  #[test]
  fn failing_handler_does_not_block_others() {
    let capture = Arc::new(Capture::default());
    let dispatcher = Dispatcher::new(
      vec![
        emit_actor("broken", None, Arc::new(Broken)),
        emit_actor("capture", None, capture.clone()),
      ],
      ErrorReporter::default(),
    );

    let record = LogRecord::new(Level::Error, "boom", "app");
    let delivered = dispatcher.dispatch(&record, &[route("broken"), route("capture")]);

    assert_eq!(delivered, 1);
    assert_eq!(capture.lines.lock().as_slice(), ["ERROR boom\n"]);
  }

  #[test]
  fn route_level_overrides_handler_level() {
    let capture = Arc::new(Capture::default());
    let dispatcher = Dispatcher::new(
      vec![emit_actor("capture", Some(Level::Critical), capture.clone())],
      ErrorReporter::default(),
    );
    let record = LogRecord::new(Level::Warning, "slow", "app");

    assert_eq!(dispatcher.dispatch(&record, &[route("capture")]), 0);

    let lenient = HandlerRoute {
      level: Some(Level::Info),
      ..route("capture")
    };
    assert_eq!(dispatcher.dispatch(&record, &[lenient]), 1);
    assert_eq!(capture.lines.lock().len(), 1);
  }

  #[test]
  fn route_format_overrides_handler_encoder() {
    let capture = Arc::new(Capture::default());
    let dispatcher = Dispatcher::new(
      vec![emit_actor("capture", None, capture.clone())],
      ErrorReporter::default(),
    );
    let record = LogRecord::new(Level::Info, "hello", "app.web");
    let custom = HandlerRoute {
      formatter: Some(formatter("%t|%m")),
      ..route("capture")
    };

    dispatcher.dispatch(&record, &[custom, route("capture")]);
    assert_eq!(
      capture.lines.lock().as_slice(),
      ["app.web|hello\n", "INFO hello\n"]
    );
  }

  #[test]
  fn writer_and_stream_actions() {
    let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);
    impl Write for SharedBuf {
      fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
      }
      fn flush(&mut self) -> io::Result<()> {
        Ok(())
      }
    }

    let (tx, rx) = fibre::mpsc::bounded(1);
    let dispatcher = Dispatcher::new(
      vec![
        HandlerActor::new(
          "file",
          None,
          formatter("%m"),
          HandlerAction::Write(Arc::new(Mutex::new(Box::new(SharedBuf(buffer.clone()))))),
        ),
        HandlerActor::new("stream", None, formatter("%m"), HandlerAction::SendRecord(tx)),
      ],
      ErrorReporter::default(),
    );

    let record = LogRecord::new(Level::Info, "one", "app");
    assert_eq!(dispatcher.dispatch(&record, &[route("file"), route("stream")]), 2);
    // Stream capacity is 1, so the second record is dropped there.
    assert_eq!(dispatcher.dispatch(&record, &[route("file"), route("stream")]), 1);

    assert_eq!(buffer.lock().as_slice(), &b"one\none\n"[..]);
    assert_eq!(rx.recv().unwrap().message, "one");
    assert_eq!(dispatcher.handler_names(), vec!["file", "stream"]);
  }

  #[test]
  fn unknown_route_is_skipped() {
    let dispatcher = Dispatcher::new(Vec::new(), ErrorReporter::default());
    let record = LogRecord::new(Level::Error, "x", "app");
    assert_eq!(dispatcher.dispatch(&record, &[route("ghost")]), 0);
  }

  #[test]
  fn panicking_emitter_is_reported_and_skipped() {
    let capture = Arc::new(Capture::default());
    let (tx, rx) = fibre::mpsc::bounded(4);
    let dispatcher = Dispatcher::new(
      vec![
        emit_actor("exploding", None, Arc::new(Panicking)),
        emit_actor("capture", None, capture.clone()),
      ],
      ErrorReporter::new(Some(tx)),
    );

    let record = LogRecord::new(Level::Critical, "meltdown", "app");
    let delivered = dispatcher.dispatch(&record, &[route("exploding"), route("capture")]);

    assert_eq!(delivered, 1);
    assert_eq!(capture.lines.lock().as_slice(), ["CRITICAL meltdown\n"]);

    let report = rx.try_recv().unwrap();
    assert!(matches!(
      report.source,
      InternalErrorSource::HandlerEmit { ref handler_name } if handler_name == "exploding"
    ));
    assert_eq!(report.error_message, "emitter panicked: pager exploded");
  }
}
