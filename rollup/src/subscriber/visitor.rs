use crate::model::{Attributes, LogValue};
use tracing::field::{Field, Visit};

/// Collects a `tracing` event's fields: `message` becomes the record body, everything else an
/// attribute.
#[derive(Default)]
pub(crate) struct AttributeVisitor {
  pub(crate) message: Option<String>,
  pub(crate) attributes: Attributes,
  // Counts repeated "message" fields so each gets its own key.
  message_field_count: u32,
}

impl AttributeVisitor {
  fn record_message_or(&mut self, field: &Field, text: String, as_value: fn(String) -> LogValue) {
    if field.name() != "message" {
      self.attributes.insert(field.name().to_string(), as_value(text));
    } else if self.message.is_none() {
      self.message = Some(text);
    } else {
      self.message_field_count += 1;
      self
        .attributes
        .insert(format!("message.{}", self.message_field_count), as_value(text));
    }
  }

  fn insert(&mut self, field: &Field, value: LogValue) {
    self.attributes.insert(field.name().to_string(), value);
  }
}

impl Visit for AttributeVisitor {
  fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
    self.record_message_or(field, format!("{:?}", value), LogValue::Debug);
  }

  fn record_str(&mut self, field: &Field, value: &str) {
    self.record_message_or(field, value.to_string(), LogValue::String);
  }

  fn record_i64(&mut self, field: &Field, value: i64) {
    self.insert(field, LogValue::Int(value));
  }

  fn record_u64(&mut self, field: &Field, value: u64) {
    match i64::try_from(value) {
      Ok(v) => self.insert(field, LogValue::Int(v)),
      Err(_) => self.insert(field, LogValue::String(value.to_string())),
    }
  }

  fn record_f64(&mut self, field: &Field, value: f64) {
    self.insert(field, LogValue::Float(value));
  }

  fn record_bool(&mut self, field: &Field, value: bool) {
    self.insert(field, LogValue::Bool(value));
  }
}
