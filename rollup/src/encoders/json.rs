use super::{util, EventFormatter};
use crate::error::{Error, Result};
use crate::model::{LogRecord, LogValue};
use serde_json::Value;
use std::collections::BTreeMap;

/// One JSON object per line. Keys come out sorted.
pub struct JsonLinesFormatter {
  flatten_attributes: bool,
}

impl JsonLinesFormatter {
  pub fn new(flatten_attributes: bool) -> Self {
    Self { flatten_attributes }
  }
}

fn to_json_value(log_value: &LogValue) -> Value {
  match log_value {
    LogValue::String(s) => Value::String(s.clone()),
    LogValue::Int(i) => Value::Number((*i).into()),
    LogValue::Float(f) => serde_json::Number::from_f64(*f)
      .map(Value::Number)
      .unwrap_or(Value::Null),
    LogValue::Bool(b) => Value::Bool(*b),
    LogValue::Debug(d) => Value::String(d.clone()),
  }
}

impl EventFormatter for JsonLinesFormatter {
  fn format_event(&self, record: &LogRecord) -> Result<Vec<u8>> {
    let mut json_map = BTreeMap::new();

    if self.flatten_attributes {
      // Attributes go in first so the record's own keys win on collision.
      for (key, value) in &record.attributes {
        json_map.insert(key.clone(), to_json_value(value));
      }
    }

    let mut ts_buf = String::new();
    util::write_timestamp(&mut ts_buf, &record.timestamp);
    json_map.insert("timestamp".to_string(), Value::String(ts_buf));
    json_map.insert("level".to_string(), Value::String(record.level.to_string()));
    json_map.insert("source".to_string(), Value::String(record.source.clone()));
    json_map.insert("message".to_string(), Value::String(record.message.clone()));

    if let Some(host) = &record.host {
      json_map.insert("host".to_string(), Value::String(host.clone()));
    }
    if let Some(fp) = &record.summary {
      json_map.insert("fingerprint".to_string(), Value::String(fp.to_string()));
    }
    if let Some(id) = record.id {
      json_map.insert("id".to_string(), Value::Number(id.into()));
    }

    if !self.flatten_attributes && !record.attributes.is_empty() {
      let attributes: serde_json::Map<String, Value> = record
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), to_json_value(value)))
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .collect();
      json_map.insert("attributes".to_string(), Value::Object(attributes));
    }

    let json_string = serde_json::to_string(&json_map)
      .map_err(|e| Error::Internal(format!("JSON serialization failed: {}", e)))?;

    Ok(format!("{}\n", json_string).into_bytes())
  }
}
