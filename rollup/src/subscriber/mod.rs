// Handler dispatch, plus the bridges that feed `tracing` and `log` events into a Rollup.

pub(crate) mod actor;
mod dispatch;
mod log_handler;
mod processor;
mod visitor;

pub use actor::{Emitter, ExternalHandler};
pub use dispatch::RollupLayer;
pub use log_handler::{init_log_bridge, RollupLogger};
pub use processor::Dispatcher;

/// The receiving end of a `kind: custom` handler.
pub type RecordStream = fibre::mpsc::BoundedReceiver<crate::model::LogRecord>;

/// Converts a Rust module path or `tracing` target (`a::b`) into a dotted source (`a.b`).
pub fn source_from_target(target: &str) -> String {
  target.replace("::", ".")
}
