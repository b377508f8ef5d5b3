// Loading settings from YAML and turning handler declarations into live handlers.

use crate::{
  config::{
    processed::{process_raw_config, ConfigInternal, HandlerKindInternal},
    raw::ConfigRaw,
  },
  encoders,
  error::{Error, Result},
  guards::WorkerGuardCollection,
  ingest::{Rollup, RollupBuilder},
  model::LogRecord,
  subscriber::{
    actor::{ExternalHandler, HandlerAction, HandlerActor, SharedWriter},
    RecordStream,
  },
};

use std::{
  collections::HashMap,
  env,
  fs::{self, OpenOptions},
  io,
  path::{Path, PathBuf},
  sync::Arc,
};

use fibre::mpsc;
use parking_lot::Mutex;
use tracing_appender::rolling;

const DEFAULT_CONFIG_BASE_NAME: &str = "fibre_rollup";
const DEFAULT_CONFIG_EXTENSION: &str = "yaml";

/// Finds the settings file in the working directory.
///
/// `fibre_rollup.<env>.yaml` is preferred over `fibre_rollup.yaml`; `env` falls back to the
/// `FIBRE_ENV` and then `APP_ENV` variables.
pub fn find_config_file(environment_suffix: Option<&str>) -> Result<PathBuf> {
  let env_from_var = environment_suffix
    .map(|s| s.to_string())
    .or_else(|| env::var("FIBRE_ENV").ok())
    .or_else(|| env::var("APP_ENV").ok());

  let mut files_to_check: Vec<String> = Vec::new();
  if let Some(env_str) = env_from_var.filter(|s| !s.is_empty()) {
    files_to_check.push(format!(
      "{}.{}.{}",
      DEFAULT_CONFIG_BASE_NAME, env_str, DEFAULT_CONFIG_EXTENSION
    ));
  }
  files_to_check.push(format!(
    "{}.{}",
    DEFAULT_CONFIG_BASE_NAME, DEFAULT_CONFIG_EXTENSION
  ));

  let search_dir = PathBuf::from(".");
  for file_name in &files_to_check {
    let path = search_dir.join(file_name);
    if path.is_file() {
      return Ok(path);
    }
  }

  Err(Error::ConfigNotFound(format!(
    "Searched for: {:?} in {:?}. Provide a config file or check FIBRE_ENV/APP_ENV.",
    files_to_check, search_dir
  )))
}

/// Parses and validates settings from YAML text.
pub fn settings_from_str(yaml: &str) -> Result<ConfigInternal> {
  let raw_config: ConfigRaw =
    serde_yaml::from_str(yaml).map_err(|e| Error::ConfigParse(e.to_string()))?;
  process_raw_config(raw_config)
}

/// Reads, parses and validates a settings file.
pub fn load_settings(config_path: &Path) -> Result<ConfigInternal> {
  let file = fs::File::open(config_path)?;
  let raw_config: ConfigRaw = serde_yaml::from_reader(io::BufReader::new(file))
    .map_err(|e| Error::ConfigParse(e.to_string()))?;
  process_raw_config(raw_config)
}

/// Builds a [`Rollup`] from a settings file, with an in-memory repository.
///
/// Settings that declare `kind: external` handlers need [`RollupBuilder::external`]; use
/// [`load_settings`] and the builder for those.
pub fn init_from_file(config_path: &Path) -> Result<Rollup> {
  println!(
    "[fibre_rollup] Initializing from config file: {:?}",
    config_path
  );
  let rollup = RollupBuilder::new(load_settings(config_path)?).build()?;
  println!("[fibre_rollup] Initialization complete.");
  Ok(rollup)
}

/// Everything handler setup produces besides the handlers themselves.
pub(crate) struct HandlerSetup {
  pub(crate) actors: Vec<HandlerActor>,
  pub(crate) guards: WorkerGuardCollection,
  pub(crate) streams: HashMap<String, RecordStream>,
}

/// Creates one actor per declared handler. External handlers are taken out of `externals`;
/// anything left in there afterwards names a handler the settings don't declare.
pub(crate) fn build_handlers(
  config: &ConfigInternal,
  mut externals: HashMap<String, ExternalHandler>,
) -> Result<HandlerSetup> {
  let mut guards = WorkerGuardCollection::default();
  let mut streams = HashMap::new();
  let mut actors = Vec::with_capacity(config.handlers.len());

  let mut names: Vec<&String> = config.handlers.keys().collect();
  names.sort();

  for handler_name in names {
    let handler_config = &config.handlers[handler_name];
    let mut level = handler_config.level;
    let mut encoder = handler_config.encoder.clone();

    let action = match &handler_config.kind {
      HandlerKindInternal::Console => {
        let (writer, guard) = tracing_appender::non_blocking(io::stdout());
        guards.add(guard);
        HandlerAction::Write(shared(writer))
      }
      HandlerKindInternal::File(file_config) => {
        if let Some(parent_dir) = file_config.path.parent() {
          if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            fs::create_dir_all(parent_dir).map_err(|e| Error::HandlerSetup {
              handler_name: handler_name.clone(),
              reason: format!("Failed to create directory {:?}: {}", parent_dir, e),
            })?;
          }
        }

        let file_writer = OpenOptions::new()
          .create(true)
          .append(true)
          .open(&file_config.path)
          .map_err(|e| Error::HandlerSetup {
            handler_name: handler_name.clone(),
            reason: format!("Failed to open file {:?}: {}", file_config.path, e),
          })?;

        let (writer, guard) = tracing_appender::non_blocking(file_writer);
        guards.add(guard);
        HandlerAction::Write(shared(writer))
      }
      HandlerKindInternal::RollingFile(rolling_config) => {
        if !rolling_config.directory.exists() {
          fs::create_dir_all(&rolling_config.directory).map_err(|e| Error::HandlerSetup {
            handler_name: handler_name.clone(),
            reason: format!(
              "Failed to create directory {:?}: {}",
              rolling_config.directory, e
            ),
          })?;
        }

        let file_appender = rolling::RollingFileAppender::new(
          rolling_config.rotation_policy.clone(),
          &rolling_config.directory,
          &rolling_config.file_name_prefix,
        );
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        guards.add(guard);
        HandlerAction::Write(shared(writer))
      }
      HandlerKindInternal::Custom(custom_config) => {
        let (tx, rx) = mpsc::bounded::<LogRecord>(custom_config.buffer_size);
        streams.insert(handler_name.clone(), rx);
        HandlerAction::SendRecord(tx)
      }
      HandlerKindInternal::External => {
        let external = externals
          .remove(handler_name.as_str())
          .ok_or_else(|| Error::HandlerSetup {
            handler_name: handler_name.clone(),
            reason: "declared as external but no emitter was bound with RollupBuilder::external"
              .to_string(),
          })?;
        level = external.level.or(level);
        if let Some(own_encoder) = external.encoder {
          encoder = own_encoder;
        }
        HandlerAction::Emit(external.emitter)
      }
    };

    let formatter = Arc::from(encoders::new_event_formatter(&encoder, config.headline_width));
    let actor = HandlerActor::new(handler_name.clone(), level, formatter, action);
    println!(
      "[fibre_rollup] Handler '{}' ready ({}).",
      actor.name,
      actor.kind_name()
    );
    actors.push(actor);
  }

  if let Some(unused) = externals.keys().next() {
    return Err(Error::HandlerSetup {
      handler_name: unused.clone(),
      reason: "bound with RollupBuilder::external but not declared as a `kind: external` handler"
        .to_string(),
    });
  }

  Ok(HandlerSetup {
    actors,
    guards,
    streams,
  })
}

fn shared<W: io::Write + Send + 'static>(writer: W) -> SharedWriter {
  Arc::new(Mutex::new(Box::new(writer)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::subscriber::Emitter;
  use std::fs;
  use tempfile::tempdir;

  struct Sink;
  impl Emitter for Sink {
    fn emit(&self, _record: &LogRecord, _formatted: &[u8]) -> io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn find_config_file_not_found() {
    let _ = fs::remove_file(format!(
      "{}.{}",
      DEFAULT_CONFIG_BASE_NAME, DEFAULT_CONFIG_EXTENSION
    ));
    let result = find_config_file(Some("nonexistent-env"));
    assert!(matches!(result, Err(Error::ConfigNotFound(_))));
  }

  #[test]
  fn settings_parse_errors_are_reported() {
    let result = settings_from_str("version: 1\nunknown_key: true\n");
    assert!(matches!(result, Err(Error::ConfigParse(_))));
  }

  #[test]
  fn load_settings_reads_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fibre_rollup.yaml");
    fs::write(&path, "version: 1\nsources:\n  default:\n    level: info\n").unwrap();

    let config = load_settings(&path).unwrap();
    assert!(config.sources.contains_key("default"));

    let missing = load_settings(&dir.path().join("missing.yaml"));
    assert!(matches!(missing, Err(Error::ConfigRead(_))));
  }

  #[test]
  fn file_handler_creates_parent_directories() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("nested/logs/audit.log");
    let yaml = format!(
      "handlers:\n  audit:\n    kind: file\n    path: {:?}\n",
      log_path.display().to_string()
    );
    let config = settings_from_str(&yaml).unwrap();

    let setup = build_handlers(&config, HashMap::new()).unwrap();
    assert_eq!(setup.actors.len(), 1);
    assert_eq!(setup.guards.len(), 1);
    assert!(log_path.exists());
  }

  #[test]
  fn custom_handlers_expose_streams() {
    let config =
      settings_from_str("handlers:\n  stream:\n    kind: custom\n    buffer_size: 4\n").unwrap();
    let setup = build_handlers(&config, HashMap::new()).unwrap();
    assert!(setup.streams.contains_key("stream"));
    assert!(setup.guards.is_empty());
  }

  #[test]
  fn external_handlers_must_be_bound_both_ways() {
    let config = settings_from_str("handlers:\n  pager:\n    kind: external\n").unwrap();

    let missing = build_handlers(&config, HashMap::new());
    assert!(matches!(missing, Err(Error::HandlerSetup { ref handler_name, .. }) if handler_name == "pager"));

    let mut externals = HashMap::new();
    externals.insert("pager".to_string(), ExternalHandler::new(Sink));
    externals.insert("stray".to_string(), ExternalHandler::new(Sink));
    let stray = build_handlers(&config, externals);
    assert!(matches!(stray, Err(Error::HandlerSetup { ref handler_name, .. }) if handler_name == "stray"));
  }
}
