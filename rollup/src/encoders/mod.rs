// Defines strategies for formatting LogRecords into byte streams.

use crate::config::processed::EncoderInternal;
use crate::error::Result;
use crate::model::LogRecord;

pub mod json;
pub mod pattern;
pub mod util;

/// Trait for types that can format a `LogRecord` into a byte vector.
pub trait EventFormatter: Send + Sync + 'static {
  /// Formats the given `LogRecord` into a `Vec<u8>`.
  /// Line-based formatters should end the output with a newline.
  fn format_event(&self, record: &LogRecord) -> Result<Vec<u8>>;
}

/// Creates an `EventFormatter` instance based on the processed encoder configuration.
///
/// `headline_width` must match the aggregation store's so `%H` prints the summary's headline.
pub(crate) fn new_event_formatter(
  config: &EncoderInternal,
  headline_width: usize,
) -> Box<dyn EventFormatter> {
  match config {
    EncoderInternal::Pattern(pattern_conf) => Box::new(
      pattern::PatternFormatter::new(&pattern_conf.pattern_string)
        .with_headline_width(headline_width),
    ),
    EncoderInternal::JsonLines(json_conf) => {
      Box::new(json::JsonLinesFormatter::new(json_conf.flatten_attributes))
    }
  }
}
