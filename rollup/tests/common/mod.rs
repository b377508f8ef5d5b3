#![allow(dead_code)]

use fibre_rollup::{settings_from_str, Emitter, ExternalHandler, LogRecord, Rollup, RollupBuilder};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// An emitter that keeps every formatted line it is handed.
#[derive(Default)]
pub struct CaptureEmitter {
  lines: Mutex<Vec<String>>,
}

impl CaptureEmitter {
  pub fn lines(&self) -> Vec<String> {
    self.lines.lock().clone()
  }

  pub fn count(&self) -> usize {
    self.lines.lock().len()
  }
}

impl Emitter for CaptureEmitter {
  fn emit(&self, _record: &LogRecord, formatted: &[u8]) -> io::Result<()> {
    self
      .lines
      .lock()
      .push(String::from_utf8_lossy(formatted).into_owned());
    Ok(())
  }
}

/// An emitter that always fails.
pub struct FailingEmitter;

impl Emitter for FailingEmitter {
  fn emit(&self, _record: &LogRecord, _formatted: &[u8]) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Other, "emitter is down"))
  }
}

pub fn build(yaml: &str) -> Rollup {
  RollupBuilder::new(settings_from_str(yaml).expect("settings should parse"))
    .build()
    .expect("rollup should build")
}

/// Builds a Rollup whose `kind: external` handler `capture` records into the returned emitter.
pub fn build_with_capture(yaml: &str) -> (Rollup, Arc<CaptureEmitter>) {
  let capture = Arc::new(CaptureEmitter::default());
  let rollup = RollupBuilder::new(settings_from_str(yaml).expect("settings should parse"))
    .external("capture", ExternalHandler::from_arc(capture.clone()))
    .build()
    .expect("rollup should build");
  (rollup, capture)
}
