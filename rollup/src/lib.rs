//! `fibre_rollup` - log ingestion with hierarchical thresholds and deduplicating rollups.
//!
//! Records carry a level, a dotted source (`app.db.pool`), an optional host and a message. Each
//! one is checked against the most specific configured source entry, rolled into a summary
//! keyed by its fingerprint (level, source, host and the message's first line), and then handed
//! to the handlers that source routes to.
//!
//! ```ignore
//! let rollup = fibre_rollup::init_from_file(&fibre_rollup::find_config_file(None)?)?;
//! rollup.error("timeout\nretrying", "app.db");
//! for summary in rollup.store().summaries()? {
//!   println!("{} x{}", summary.headline, summary.hits);
//! }
//! ```

pub mod config;
pub mod encoders;
pub mod error;
pub mod error_handling;
pub mod exception;
pub mod fingerprint;
pub mod guards;
pub mod ingest;
pub mod init;
pub mod model;
pub mod store;
pub mod subscriber;

// Re-export key public types for easier use by library consumers.
pub use config::{ConfigInternal, ConfigResolver, EffectiveConfig, HandlerBinding, Resolution};
pub use error::{Error, Result};
pub use error_handling::{InternalErrorReport, InternalErrorSource};
pub use exception::{NotFound, RequestContext};
pub use fingerprint::Fingerprint;
pub use ingest::{LogOutcome, Rollup, RollupBuilder};
pub use init::{find_config_file, init_from_file, load_settings, settings_from_str};
pub use model::{Attributes, Level, LevelFilter, LogRecord, LogSummary, LogValue};
pub use store::{AggregationResult, AggregationStore, MemoryRepository, SummaryRepository};
pub use subscriber::{init_log_bridge, Emitter, ExternalHandler, RecordStream, RollupLayer, RollupLogger};
