use crate::config::raw::{
  ConfigRaw, EncoderConfigRaw, HandlerConfigRaw, HandlerRefRaw, SourceConfigRaw,
};
use crate::error::{Error, Result};
use crate::model::Level;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_appender::rolling::Rotation;

pub(crate) const DEFAULT_PATTERN: &str = "[%d] %p %t - %m%n";

// --- Processed Top Level Config ---
#[derive(Debug, Clone)]
pub struct ConfigInternal {
  pub debug: bool,
  pub host: Option<String>,
  pub headline_width: usize,
  pub ignore_not_found: bool,
  pub global_level: Option<Level>,
  pub global_handlers: Option<Vec<HandlerBinding>>,
  pub handlers: HashMap<String, HandlerInternal>,
  pub sources: HashMap<String, SourceInternal>,
  /// Capacity of the internal error channel, `None` when reporting is disabled.
  pub error_reporting_buffer: Option<usize>,
}

// --- Processed Handler Config ---
#[derive(Debug, Clone)]
pub struct HandlerInternal {
  pub name: String,
  pub kind: HandlerKindInternal,
  pub level: Option<Level>,
  pub encoder: EncoderInternal,
}

#[derive(Debug, Clone)]
pub enum HandlerKindInternal {
  Console,
  File(FileHandlerInternal),
  RollingFile(RollingFileHandlerInternal),
  Custom(CustomHandlerInternal),
  External,
}

#[derive(Debug, Clone)]
pub struct FileHandlerInternal {
  pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RollingFileHandlerInternal {
  pub directory: PathBuf,
  pub file_name_prefix: String,
  pub rotation_policy: Rotation,
}

#[derive(Debug, Clone)]
pub struct CustomHandlerInternal {
  pub buffer_size: usize,
}

// --- Processed Encoder Config ---
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderInternal {
  Pattern(PatternEncoderInternal),
  JsonLines(JsonLinesEncoderInternal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternEncoderInternal {
  pub pattern_string: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonLinesEncoderInternal {
  pub flatten_attributes: bool,
}

impl Default for EncoderInternal {
  fn default() -> Self {
    EncoderInternal::Pattern(PatternEncoderInternal {
      pattern_string: DEFAULT_PATTERN.to_string(),
    })
  }
}

// --- Processed Source Config ---

/// A validated reference to a declared handler, with optional per-reference overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerBinding {
  pub name: String,
  /// Overrides the handler's own level for records routed through this binding.
  pub level: Option<Level>,
  /// Overrides the handler's own encoder for records routed through this binding.
  pub encoder: Option<EncoderInternal>,
}

impl HandlerBinding {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      level: None,
      encoder: None,
    }
  }
}

/// One row of the source table. `handler` and `handlers` are kept apart because resolution
/// treats them differently: only a `handlers` list lets a level-less entry defer filtering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceInternal {
  pub level: Option<Level>,
  pub handler: Option<HandlerBinding>,
  pub handlers: Option<Vec<HandlerBinding>>,
}

// --- Conversion and Validation Logic ---

/// Processes the raw, deserialized configuration into a validated internal representation.
pub fn process_raw_config(raw_config: ConfigRaw) -> Result<ConfigInternal> {
  if raw_config.headline_width == 0 {
    return Err(Error::InvalidConfigValue {
      field: "headline_width".to_string(),
      message: "headline_width must be at least 1.".to_string(),
    });
  }

  let mut processed_handlers = HashMap::new();

  // 1. Process Handlers
  for (name, raw_handler) in raw_config.handlers {
    let encoder = match raw_handler.encoder_config_raw() {
      Some(raw_encoder) => process_encoder_config_raw(raw_encoder),
      None => EncoderInternal::default(),
    };
    let level = raw_handler
      .level_raw()
      .map(|l| parse_level(l, &format!("handlers.{}.level", name)))
      .transpose()?;

    let kind = match raw_handler {
      HandlerConfigRaw::Console(_) => HandlerKindInternal::Console,
      HandlerConfigRaw::File(raw_file) => {
        if raw_file.path.is_empty() {
          return Err(Error::InvalidConfigValue {
            field: format!("handlers.{}.path", name),
            message: "File handler path cannot be empty.".to_string(),
          });
        }
        HandlerKindInternal::File(FileHandlerInternal {
          path: PathBuf::from(raw_file.path),
        })
      }
      HandlerConfigRaw::RollingFile(raw_rolling) => {
        let rotation_policy = match raw_rolling.time_granularity.to_lowercase().as_str() {
          "minutely" => Rotation::MINUTELY,
          "hourly" => Rotation::HOURLY,
          "daily" => Rotation::DAILY,
          "never" => Rotation::NEVER,
          other => {
            return Err(Error::InvalidConfigValue {
              field: format!("handlers.{}.time_granularity", name),
              message: format!(
                "Unknown time_granularity '{}'. Expected 'minutely', 'hourly', 'daily', or 'never'.",
                other
              ),
            })
          }
        };
        HandlerKindInternal::RollingFile(RollingFileHandlerInternal {
          directory: PathBuf::from(raw_rolling.directory),
          file_name_prefix: raw_rolling.file_name_prefix,
          rotation_policy,
        })
      }
      HandlerConfigRaw::Custom(raw_custom) => {
        if raw_custom.buffer_size == 0 {
          return Err(Error::InvalidConfigValue {
            field: format!("handlers.{}.buffer_size", name),
            message: "Custom handler buffer_size cannot be zero.".to_string(),
          });
        }
        HandlerKindInternal::Custom(CustomHandlerInternal {
          buffer_size: raw_custom.buffer_size,
        })
      }
      HandlerConfigRaw::External(_) => HandlerKindInternal::External,
    };

    processed_handlers.insert(
      name.clone(),
      HandlerInternal {
        name,
        kind,
        level,
        encoder,
      },
    );
  }

  // 2. Process global fallbacks
  let global_level = raw_config
    .global_level
    .as_deref()
    .map(|l| parse_level(l, "global_level"))
    .transpose()?;

  let global_handlers = raw_config
    .global_handlers
    .map(|refs| process_handler_refs(refs, "global_handlers", &processed_handlers))
    .transpose()?;

  // 3. Process the source table
  let mut processed_sources = HashMap::new();
  for (source, raw_source) in raw_config.sources {
    let entry = process_source_config_raw(&source, raw_source, &processed_handlers)?;
    processed_sources.insert(source, entry);
  }

  let error_reporting_buffer = if raw_config.internal_error_reporting.enabled {
    if raw_config.internal_error_reporting.buffer_size == 0 {
      return Err(Error::InvalidConfigValue {
        field: "internal_error_reporting.buffer_size".to_string(),
        message: "Internal error channel buffer_size cannot be zero.".to_string(),
      });
    }
    Some(raw_config.internal_error_reporting.buffer_size)
  } else {
    None
  };

  Ok(ConfigInternal {
    debug: raw_config.debug,
    host: raw_config.host.filter(|h| !h.is_empty()),
    headline_width: raw_config.headline_width,
    ignore_not_found: raw_config.ignore_not_found,
    global_level,
    global_handlers,
    handlers: processed_handlers,
    sources: processed_sources,
    error_reporting_buffer,
  })
}

fn process_source_config_raw(
  source: &str,
  raw_source: SourceConfigRaw,
  handlers: &HashMap<String, HandlerInternal>,
) -> Result<SourceInternal> {
  let level = raw_source
    .level
    .as_deref()
    .map(|l| parse_level(l, &format!("sources.{}.level", source)))
    .transpose()?;

  let handler = raw_source
    .handler
    .map(|r| process_handler_ref(r, &format!("sources.{}.handler", source), handlers))
    .transpose()?;

  let handler_list = raw_source
    .handlers
    .map(|refs| process_handler_refs(refs, &format!("sources.{}.handlers", source), handlers))
    .transpose()?;

  Ok(SourceInternal {
    level,
    handler,
    handlers: handler_list,
  })
}

fn process_handler_refs(
  refs: Vec<HandlerRefRaw>,
  field: &str,
  handlers: &HashMap<String, HandlerInternal>,
) -> Result<Vec<HandlerBinding>> {
  refs
    .into_iter()
    .map(|r| process_handler_ref(r, field, handlers))
    .collect()
}

fn process_handler_ref(
  raw_ref: HandlerRefRaw,
  field: &str,
  handlers: &HashMap<String, HandlerInternal>,
) -> Result<HandlerBinding> {
  if !handlers.contains_key(raw_ref.name()) {
    return Err(Error::InvalidConfigValue {
      field: field.to_string(),
      message: format!(
        "Reference to undefined handler '{}'. Available handlers: {:?}",
        raw_ref.name(),
        handlers.keys()
      ),
    });
  }

  match raw_ref {
    HandlerRefRaw::Name(name) => Ok(HandlerBinding::named(name)),
    HandlerRefRaw::Detailed(detailed) => {
      let level = detailed
        .level
        .as_deref()
        .map(|l| parse_level(l, &format!("{}.{}.level", field, detailed.name)))
        .transpose()?;
      let encoder = detailed.format.map(|pattern_string| {
        EncoderInternal::Pattern(PatternEncoderInternal { pattern_string })
      });
      Ok(HandlerBinding {
        name: detailed.name,
        level,
        encoder,
      })
    }
  }
}

fn process_encoder_config_raw(raw_encoder: EncoderConfigRaw) -> EncoderInternal {
  match raw_encoder {
    EncoderConfigRaw::Pattern(raw_pattern) => EncoderInternal::Pattern(PatternEncoderInternal {
      pattern_string: raw_pattern
        .pattern
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PATTERN.to_string()),
    }),
    EncoderConfigRaw::JsonLines(raw_json) => EncoderInternal::JsonLines(JsonLinesEncoderInternal {
      flatten_attributes: raw_json.flatten_attributes,
    }),
  }
}

fn parse_level(level_str: &str, field: &str) -> Result<Level> {
  level_str
    .parse::<Level>()
    .map_err(|e| Error::InvalidConfigValue {
      field: field.to_string(),
      message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::raw::{
    ConsoleHandlerConfigRaw, DetailedHandlerRefRaw, HandlerConfigRaw, SourceConfigRaw,
  };

  fn raw_with_console() -> ConfigRaw {
    let mut raw = ConfigRaw::default();
    raw.handlers.insert(
      "console".to_string(),
      HandlerConfigRaw::Console(ConsoleHandlerConfigRaw::default()),
    );
    raw
  }

  #[test]
  fn parse_level_reports_field() {
    let result = parse_level("INVALID_LEVEL", "sources.app.level");
    if let Err(Error::InvalidConfigValue { field, message }) = result {
      assert_eq!(field, "sources.app.level");
      assert!(message.contains("Invalid log level string 'INVALID_LEVEL'"));
    } else {
      panic!("Expected InvalidConfigValue error");
    }
  }

  #[test]
  fn handlers_get_default_pattern_encoder() {
    let config = process_raw_config(raw_with_console()).unwrap();
    let console = config.handlers.get("console").unwrap();
    assert_eq!(console.encoder, EncoderInternal::default());
    assert!(console.level.is_none());
  }

  #[test]
  fn source_refs_to_unknown_handlers_are_rejected() {
    let mut raw = raw_with_console();
    raw.sources.insert(
      "app".to_string(),
      SourceConfigRaw {
        level: Some("info".to_string()),
        handler: Some(HandlerRefRaw::Name("missing".to_string())),
        handlers: None,
      },
    );

    match process_raw_config(raw) {
      Err(Error::InvalidConfigValue { field, .. }) => assert_eq!(field, "sources.app.handler"),
      other => panic!("Expected InvalidConfigValue, got {:?}", other),
    }
  }

  #[test]
  fn detailed_refs_carry_overrides() {
    let mut raw = raw_with_console();
    raw.global_handlers = Some(vec![HandlerRefRaw::Detailed(DetailedHandlerRefRaw {
      name: "console".to_string(),
      level: Some("error".to_string()),
      format: Some("%p %m".to_string()),
    })]);

    let config = process_raw_config(raw).unwrap();
    let bindings = config.global_handlers.unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].level, Some(Level::Error));
    assert_eq!(
      bindings[0].encoder,
      Some(EncoderInternal::Pattern(PatternEncoderInternal {
        pattern_string: "%p %m".to_string()
      }))
    );
  }

  #[test]
  fn zero_headline_width_is_rejected() {
    let mut raw = ConfigRaw::default();
    raw.headline_width = 0;
    assert!(matches!(
      process_raw_config(raw),
      Err(Error::InvalidConfigValue { .. })
    ));
  }

  #[test]
  fn empty_host_is_treated_as_absent() {
    let mut raw = ConfigRaw::default();
    raw.host = Some(String::new());
    assert!(process_raw_config(raw).unwrap().host.is_none());
  }
}
