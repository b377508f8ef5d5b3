//! Turning errors (and optionally the request that raised them) into ERROR records.

use std::error::Error as StdError;
use std::fmt::{self, Write};
use std::io;

/// Source used for exceptions logged without a request.
///
/// Exceptions are routed by these two fixed sources, never by the error's type name. A source
/// entry for `exception` covers both, since `exception.request` falls back to it by prefix; add
/// an `exception.request` entry to route request failures separately. Configurations keyed by
/// error type names (`Exception`, `UnspecifiedException`, ...) must move to these keys.
pub const EXCEPTION_SOURCE: &str = "exception";
/// Source used for exceptions logged with a request.
pub const REQUEST_EXCEPTION_SOURCE: &str = "exception.request";

const RULE: &str = "========================================";

/// A missing resource. Exceptions carrying this anywhere in their chain are dropped when
/// `ignore_not_found` is set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Not found: {0}")]
pub struct NotFound(pub String);

/// The request an exception happened under, as far as the log cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
  pub method: String,
  pub absolute_uri: String,
  pub headers: Vec<(String, String)>,
  pub remote_addr: Option<String>,
}

impl RequestContext {
  pub fn new(method: impl Into<String>, absolute_uri: impl Into<String>) -> Self {
    Self {
      method: method.into(),
      absolute_uri: absolute_uri.into(),
      headers: Vec::new(),
      remote_addr: None,
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
    self.remote_addr = Some(addr.into());
    self
  }
}

impl fmt::Display for RequestContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<Request {} {}>", self.method, self.absolute_uri)?;
    if let Some(addr) = &self.remote_addr {
      write!(f, "\nREMOTE_ADDR: {}", addr)?;
    }
    for (name, value) in &self.headers {
      write!(f, "\n{}: {}", name, value)?;
    }
    Ok(())
  }
}

/// Walks `error` and its `source()` chain looking for a not-found error.
pub fn is_not_found(error: &(dyn StdError + 'static)) -> bool {
  let mut current = Some(error);
  while let Some(err) = current {
    if err.downcast_ref::<NotFound>().is_some() {
      return true;
    }
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
      if io_err.kind() == io::ErrorKind::NotFound {
        return true;
      }
    }
    current = err.source();
  }
  false
}

/// Renders `error` as `Error: ...` followed by one `Caused by: ...` line per source.
pub fn format_error_chain(error: &(dyn StdError + 'static)) -> String {
  let mut out = format!("Error: {}", error);
  let mut current = error.source();
  while let Some(cause) = current {
    let _ = write!(out, "\nCaused by: {}", cause);
    current = cause.source();
  }
  out
}

/// Builds the record body and source for an exception.
pub(crate) fn exception_message(
  message: &str,
  error: Option<&(dyn StdError + 'static)>,
  request: Option<&RequestContext>,
) -> (String, &'static str) {
  let mut body = message.to_string();
  if let Some(err) = error {
    if !body.is_empty() && !body.ends_with('\n') {
      body.push('\n');
    }
    body.push_str(&format_error_chain(err));
  }

  match request {
    Some(request) => (
      format!(
        "Absolute URI: {}\n{}\n{}\n{}\nRequest:\n{}",
        request.absolute_uri, RULE, body, RULE, request
      ),
      REQUEST_EXCEPTION_SOURCE,
    ),
    None => (body, EXCEPTION_SOURCE),
  }
}
