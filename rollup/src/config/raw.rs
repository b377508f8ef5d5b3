use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct InternalErrorReportingRaw {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default = "default_buffer_size")]
  pub buffer_size: usize,
}

// --- Top Level Config ---
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigRaw {
  #[serde(default = "default_version")]
  pub version: u32,
  /// Only consulted as the last threshold fallback for unmatched sources.
  #[serde(default)]
  pub debug: bool,
  /// Default host stamped on records that don't name one.
  #[serde(default)]
  pub host: Option<String>,
  #[serde(default = "default_headline_width")]
  pub headline_width: usize,
  #[serde(default)]
  pub ignore_not_found: bool,
  #[serde(default)]
  pub global_level: Option<String>,
  #[serde(default)]
  pub global_handlers: Option<Vec<HandlerRefRaw>>,
  #[serde(default)]
  pub handlers: HashMap<String, HandlerConfigRaw>,
  #[serde(default)]
  pub sources: HashMap<String, SourceConfigRaw>,
  #[serde(default)]
  pub internal_error_reporting: InternalErrorReportingRaw,
}

fn default_version() -> u32 {
  1
}

fn default_headline_width() -> usize {
  crate::fingerprint::DEFAULT_HEADLINE_WIDTH
}

// --- Handler Config ---
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum HandlerConfigRaw {
  Console(ConsoleHandlerConfigRaw),
  File(FileHandlerConfigRaw),
  RollingFile(RollingFileHandlerConfigRaw),
  Custom(CustomHandlerConfigRaw),
  External(ExternalHandlerConfigRaw),
}

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConsoleHandlerConfigRaw {
  #[serde(default)]
  pub level: Option<String>,
  #[serde(default)]
  pub encoder: Option<EncoderConfigRaw>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileHandlerConfigRaw {
  pub path: String,
  #[serde(default)]
  pub level: Option<String>,
  #[serde(default)]
  pub encoder: Option<EncoderConfigRaw>,
}

fn default_file_name_prefix() -> String {
  "fibre_rollup.log".to_string()
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RollingFileHandlerConfigRaw {
  pub directory: String,
  #[serde(default = "default_file_name_prefix")]
  pub file_name_prefix: String,
  /// Expected values: "minutely", "hourly", "daily", or "never".
  pub time_granularity: String,
  #[serde(default)]
  pub level: Option<String>,
  #[serde(default)]
  pub encoder: Option<EncoderConfigRaw>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CustomHandlerConfigRaw {
  /// The capacity of the underlying `fibre` channel.
  #[serde(default = "default_buffer_size")]
  pub buffer_size: usize,
  #[serde(default)]
  pub level: Option<String>,
}

/// A handler whose emitter is supplied in code through `RollupBuilder::external`.
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ExternalHandlerConfigRaw {
  #[serde(default)]
  pub level: Option<String>,
  #[serde(default)]
  pub encoder: Option<EncoderConfigRaw>,
}

fn default_buffer_size() -> usize {
  256
}

// --- Encoder Config ---
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum EncoderConfigRaw {
  Pattern(PatternEncoderConfigRaw),
  JsonLines(JsonLinesEncoderConfigRaw),
}

#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct PatternEncoderConfigRaw {
  pub pattern: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct JsonLinesEncoderConfigRaw {
  /// If true, attributes are added to the top-level JSON object
  /// instead of being nested under an "attributes" key.
  #[serde(default)]
  pub flatten_attributes: bool,
}

// --- Source Config ---

/// A reference from a source (or the global list) to a declared handler.
///
/// Either just the handler name, or the name plus a level and/or format that apply to this
/// reference only.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(untagged)]
pub enum HandlerRefRaw {
  Name(String),
  Detailed(DetailedHandlerRefRaw),
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct DetailedHandlerRefRaw {
  pub name: String,
  #[serde(default)]
  pub level: Option<String>,
  /// A pattern string, shorthand for a pattern encoder.
  #[serde(default)]
  pub format: Option<String>,
}

impl HandlerRefRaw {
  pub fn name(&self) -> &str {
    match self {
      HandlerRefRaw::Name(name) => name,
      HandlerRefRaw::Detailed(detailed) => &detailed.name,
    }
  }
}

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct SourceConfigRaw {
  #[serde(default)]
  pub level: Option<String>,
  #[serde(default)]
  pub handler: Option<HandlerRefRaw>,
  #[serde(default)]
  pub handlers: Option<Vec<HandlerRefRaw>>,
}

impl Default for ConfigRaw {
  fn default() -> Self {
    Self {
      version: default_version(),
      debug: false,
      host: None,
      headline_width: default_headline_width(),
      ignore_not_found: false,
      global_level: None,
      global_handlers: None,
      handlers: HashMap::new(),
      sources: HashMap::new(),
      internal_error_reporting: Default::default(),
    }
  }
}

impl HandlerConfigRaw {
  /// Helper to get the optional encoder configuration from any handler variant.
  pub fn encoder_config_raw(&self) -> Option<EncoderConfigRaw> {
    match self {
      HandlerConfigRaw::Console(c) => c.encoder.clone(),
      HandlerConfigRaw::File(f) => f.encoder.clone(),
      HandlerConfigRaw::RollingFile(r) => r.encoder.clone(),
      HandlerConfigRaw::External(e) => e.encoder.clone(),
      HandlerConfigRaw::Custom(_) => None,
    }
  }

  pub fn level_raw(&self) -> Option<&str> {
    match self {
      HandlerConfigRaw::Console(c) => c.level.as_deref(),
      HandlerConfigRaw::File(f) => f.level.as_deref(),
      HandlerConfigRaw::RollingFile(r) => r.level.as_deref(),
      HandlerConfigRaw::Custom(c) => c.level.as_deref(),
      HandlerConfigRaw::External(e) => e.level.as_deref(),
    }
  }
}
