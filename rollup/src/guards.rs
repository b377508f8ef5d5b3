// Keeps tracing-appender's background writers alive for as long as the Rollup is.

use tracing_appender::non_blocking::WorkerGuard;

/// The `WorkerGuard`s of every non-blocking handler writer.
///
/// Dropping the collection flushes whatever the writers still have buffered.
#[derive(Default)]
pub struct WorkerGuardCollection {
  guards: Vec<WorkerGuard>,
}

impl WorkerGuardCollection {
  pub(crate) fn add(&mut self, guard: WorkerGuard) {
    self.guards.push(guard);
  }

  pub fn len(&self) -> usize {
    self.guards.len()
  }

  pub fn is_empty(&self) -> bool {
    self.guards.is_empty()
  }
}
