use super::{util, EventFormatter};
use crate::error::Result;
use crate::fingerprint;
use crate::model::LogRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;

// Either a conversion specifier (`%-8p`, `%d{%H:%M}`) or an escaped `%%`.
static PATTERN_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?P<specifier>%(?P<padding>-?\d+)?(?P<converter>[a-zA-Z])(?:\{(?P<options>[^}]+)\})?)|(?P<escaped>%%)")
    .expect("Pattern regex should be valid")
});

/// Represents a single piece of a parsed logging pattern.
#[derive(Debug)]
enum Segment {
  Literal(String),
  Specifier(PatternSpecifier),
}

/// The internal representation of a conversion specifier like `%-5p`.
#[derive(Debug)]
struct PatternSpecifier {
  converter: char,
  padding: Option<i32>,
  options: Option<String>,
}

/// Formats records with a log4j-style conversion pattern.
///
/// | specifier | output |
/// |-----------|--------|
/// | `%d`, `%d{fmt}` | timestamp, RFC 3339 or chrono format |
/// | `%p`, `%l` | level |
/// | `%t` | source |
/// | `%h` | host |
/// | `%m` | message |
/// | `%H` | headline (first line, cut to the headline width, 60 by default) |
/// | `%f` | fingerprint prefix, once aggregated |
/// | `%X`, `%X{key}` | all attributes, or one |
/// | `%n` | newline |
pub struct PatternFormatter {
  segments: Vec<Segment>,
  headline_width: usize,
}

impl PatternFormatter {
  pub fn new(pattern_string: &str) -> Self {
    let segments = Self::parse(pattern_string);
    Self {
      segments,
      headline_width: fingerprint::DEFAULT_HEADLINE_WIDTH,
    }
  }

  pub fn with_headline_width(mut self, headline_width: usize) -> Self {
    self.headline_width = headline_width.max(1);
    self
  }

  fn parse(pattern: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last_end = 0;

    for caps in PATTERN_REGEX.captures_iter(pattern) {
      let Some(mat) = caps.get(0) else { continue };

      if mat.start() > last_end {
        segments.push(Segment::Literal(pattern[last_end..mat.start()].to_string()));
      }

      if let Some(converter) = caps
        .name("converter")
        .and_then(|m| m.as_str().chars().next())
      {
        let padding = caps.name("padding").and_then(|m| m.as_str().parse().ok());
        let options = caps.name("options").map(|m| m.as_str().to_string());
        segments.push(Segment::Specifier(PatternSpecifier {
          converter,
          padding,
          options,
        }));
      } else if caps.name("escaped").is_some() {
        segments.push(Segment::Literal("%".to_string()));
      }

      last_end = mat.end();
    }

    if last_end < pattern.len() {
      segments.push(Segment::Literal(pattern[last_end..].to_string()));
    }

    segments
  }

  fn format_specifier(&self, buf: &mut String, spec: &PatternSpecifier, record: &LogRecord) {
    let mut content = String::with_capacity(64);
    let needs_padding = spec.padding.is_some();
    let target_buf: &mut String = if needs_padding { &mut content } else { buf };

    match spec.converter {
      'd' => {
        if let Some(format_str) = &spec.options {
          util::write_timestamp_with_format(target_buf, &record.timestamp, format_str);
        } else {
          util::write_timestamp(target_buf, &record.timestamp);
        }
      }
      'p' | 'l' => {
        let _ = write!(target_buf, "{}", record.level);
      }
      't' => target_buf.push_str(&record.source),
      'h' => {
        if let Some(host) = &record.host {
          target_buf.push_str(host);
        }
      }
      'm' => target_buf.push_str(&record.message),
      'H' => target_buf.push_str(fingerprint::headline(&record.message, self.headline_width)),
      'f' => {
        if let Some(fp) = &record.summary {
          target_buf.push_str(&fp.short());
        }
      }
      // Newline does not support padding and writes directly to the final buffer.
      'n' => {
        buf.push('\n');
        return;
      }
      'X' => {
        if let Some(key) = &spec.options {
          if let Some(value) = record.attributes.get(key) {
            let _ = write!(target_buf, "{}", value);
          }
        } else if !record.attributes.is_empty() {
          let mut sorted_keys: Vec<_> = record.attributes.keys().collect();
          sorted_keys.sort();

          target_buf.push('{');
          for (i, key) in sorted_keys.iter().enumerate() {
            if i > 0 {
              target_buf.push_str(", ");
            }
            let _ = write!(target_buf, "{}={}", key, record.attributes[*key]);
          }
          target_buf.push('}');
        }
      }
      // Unknown specifiers are ignored.
      _ => {}
    }

    if let Some(padding) = spec.padding {
      self.apply_padding(buf, &content, padding);
    }
  }

  fn apply_padding(&self, buf: &mut String, content: &str, padding: i32) {
    let width = padding.unsigned_abs() as usize;
    if content.chars().count() >= width {
      buf.push_str(content);
      return;
    }

    if padding > 0 {
      let _ = write!(buf, "{:>width$}", content, width = width);
    } else {
      let _ = write!(buf, "{:<width$}", content, width = width);
    }
  }
}

impl EventFormatter for PatternFormatter {
  fn format_event(&self, record: &LogRecord) -> Result<Vec<u8>> {
    let mut output = String::with_capacity(256);

    for segment in &self.segments {
      match segment {
        Segment::Literal(text) => output.push_str(text),
        Segment::Specifier(spec) => self.format_specifier(&mut output, spec, record),
      }
    }

    if !output.ends_with('\n') {
      output.push('\n');
    }

    Ok(output.into_bytes())
  }
}
