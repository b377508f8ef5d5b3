use crate::fingerprint::Fingerprint;
use thiserror::Error;

/// The main error type for the `fibre_rollup` library.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Configuration file not found: {0}")]
  ConfigNotFound(String),

  #[error("Failed to read configuration file: {0}")]
  ConfigRead(#[from] std::io::Error),

  #[error("Failed to parse configuration: {0}")]
  ConfigParse(String),

  #[error("Invalid configuration value for '{field}': {message}")]
  InvalidConfigValue { field: String, message: String },

  /// A source entry has no level of its own, no `handlers` list to defer to, and there is no
  /// `global_level` to fall back on. Such a logger would never emit anything.
  #[error(
    "Source '{entry}' doesn't have its log level set. Either set a level on that source, declare handlers for it, or set global_level."
  )]
  LevelUnresolved { entry: String },

  /// No prefix of the source (nor `default`) is configured and no `global_handlers` exist.
  #[error("No configuration applies to source '{source_name}' and no global_handlers are set.")]
  Unconfigured { source_name: String },

  #[error("Handler setup failed for '{handler_name}': {reason}")]
  HandlerSetup {
    handler_name: String,
    reason: String,
  },

  #[error("No summary exists for fingerprint {0}")]
  SummaryNotFound(Fingerprint),

  #[error("Storage error: {0}")]
  Storage(String),

  #[error("Failed to install log bridge: {0}")]
  LogBridgeInit(String),

  #[error("Internal library error: {0}")]
  Internal(String),
}

impl Error {
  /// True for the configuration errors that must surface at startup rather than be reported
  /// through the internal error channel.
  pub fn is_configuration(&self) -> bool {
    matches!(
      self,
      Error::LevelUnresolved { .. }
        | Error::Unconfigured { .. }
        | Error::InvalidConfigValue { .. }
        | Error::ConfigParse(_)
    )
  }
}

/// A specialized `Result` type for `fibre_rollup` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
