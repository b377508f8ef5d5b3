// Maps a dotted source name to its effective threshold and handlers.

use crate::config::processed::{ConfigInternal, HandlerBinding, SourceInternal};
use crate::encoders::{self, EventFormatter};
use crate::error::{Error, Result};
use crate::model::{Level, LevelFilter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Table key consulted after every prefix of the source has missed.
pub const DEFAULT_ENTRY: &str = "default";

/// The outcome of resolving one source against the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
  /// The table key that matched, `None` when the global fallbacks applied.
  pub matched: Option<String>,
  pub threshold: LevelFilter,
  pub handlers: Vec<HandlerBinding>,
}

/// Finds the most specific table entry for `source`.
///
/// Tries `source` itself, then each shorter dotted prefix (`a.b.c`, `a.b`, `a`), and finally
/// [`DEFAULT_ENTRY`].
pub fn most_specific_entry<'t, V>(
  table: &'t HashMap<String, V>,
  source: &str,
) -> Option<(&'t str, &'t V)> {
  let mut candidate = source;
  while !candidate.is_empty() {
    if let Some((key, value)) = table.get_key_value(candidate) {
      return Some((key.as_str(), value));
    }
    candidate = match candidate.rfind('.') {
      Some(idx) => &candidate[..idx],
      None => "",
    };
  }
  table
    .get_key_value(DEFAULT_ENTRY)
    .map(|(key, value)| (key.as_str(), value))
}

/// Resolves `source` against `config`.
///
/// Threshold for a matched entry: its own level, else `global_level`, else `ALL` when the entry
/// declares a `handlers` list (so filtering is left to those handlers), else an error.
/// Handlers: the single `handler`, else the `handlers` list, else `global_handlers`.
///
/// With no matching entry the global fallbacks apply only if `global_handlers` is set:
/// `global_level`, else `DEBUG` in debug mode, else `WARNING`.
pub fn resolve(source: &str, config: &ConfigInternal) -> Result<Resolution> {
  match most_specific_entry(&config.sources, source) {
    Some((key, entry)) => Ok(Resolution {
      matched: Some(key.to_string()),
      threshold: entry_threshold(key, entry, config.global_level)?,
      handlers: entry_handlers(entry, config.global_handlers.as_deref()),
    }),
    None => match &config.global_handlers {
      Some(global_handlers) => {
        let threshold = match config.global_level {
          Some(level) => LevelFilter::from(level),
          None if config.debug => LevelFilter::DEBUG,
          None => LevelFilter::WARNING,
        };
        Ok(Resolution {
          matched: None,
          threshold,
          handlers: global_handlers.clone(),
        })
      }
      None => Err(Error::Unconfigured {
        source_name: source.to_string(),
      }),
    },
  }
}

fn entry_threshold(
  key: &str,
  entry: &SourceInternal,
  global_level: Option<Level>,
) -> Result<LevelFilter> {
  if let Some(level) = entry.level.or(global_level) {
    return Ok(LevelFilter::from(level));
  }
  if entry.handlers.is_some() {
    return Ok(LevelFilter::ALL);
  }
  Err(Error::LevelUnresolved {
    entry: key.to_string(),
  })
}

fn entry_handlers(
  entry: &SourceInternal,
  global_handlers: Option<&[HandlerBinding]>,
) -> Vec<HandlerBinding> {
  if let Some(single) = &entry.handler {
    vec![single.clone()]
  } else if let Some(list) = &entry.handlers {
    list.clone()
  } else {
    global_handlers.map(<[_]>::to_vec).unwrap_or_default()
  }
}

/// A resolved handler reference, with any per-reference format already compiled.
#[derive(Clone)]
pub struct HandlerRoute {
  pub name: String,
  pub level: Option<Level>,
  pub formatter: Option<Arc<dyn EventFormatter>>,
}

impl fmt::Debug for HandlerRoute {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HandlerRoute")
      .field("name", &self.name)
      .field("level", &self.level)
      .field("formatter", &self.formatter.as_ref().map(|_| "override"))
      .finish()
  }
}

/// What the ingestion path needs to know about a source.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
  pub matched: Option<String>,
  pub threshold: LevelFilter,
  pub routes: Vec<HandlerRoute>,
}

impl EffectiveConfig {
  /// Builds per-route formatters with the store's headline width.
  pub fn from_resolution(resolution: Resolution, headline_width: usize) -> Self {
    let routes = resolution
      .handlers
      .into_iter()
      .map(|binding| HandlerRoute {
        formatter: binding
          .encoder
          .as_ref()
          .map(|encoder| Arc::from(encoders::new_event_formatter(encoder, headline_width))),
        name: binding.name,
        level: binding.level,
      })
      .collect();
    EffectiveConfig {
      matched: resolution.matched,
      threshold: resolution.threshold,
      routes,
    }
  }
}

/// Resolves sources against an immutable configuration, caching each result for the life of
/// the resolver.
pub struct ConfigResolver {
  config: Arc<ConfigInternal>,
  cache: RwLock<HashMap<String, Arc<EffectiveConfig>>>,
}

impl ConfigResolver {
  /// Builds a resolver and checks every entry of the source table resolves.
  ///
  /// A level-less entry with no fallback is a startup error, not something to discover on the
  /// first record.
  pub fn new(config: Arc<ConfigInternal>) -> Result<Self> {
    let mut keys: Vec<&String> = config.sources.keys().collect();
    keys.sort();
    for key in keys {
      resolve(key, &config)?;
    }
    Ok(Self {
      config,
      cache: RwLock::new(HashMap::new()),
    })
  }

  pub fn config(&self) -> &ConfigInternal {
    &self.config
  }

  /// Resolves `source` without touching the cache.
  pub fn resolve_uncached(&self, source: &str) -> Result<Resolution> {
    resolve(source, &self.config)
  }

  pub fn effective(&self, source: &str) -> Result<Arc<EffectiveConfig>> {
    if let Some(hit) = self.cache.read().get(source) {
      return Ok(hit.clone());
    }

    let effective = Arc::new(EffectiveConfig::from_resolution(
      resolve(source, &self.config)?,
      self.config.headline_width,
    ));
    let mut cache = self.cache.write();
    let entry = cache
      .entry(source.to_string())
      .or_insert_with(|| effective.clone());
    Ok(entry.clone())
  }

  pub fn cached_sources(&self) -> usize {
    self.cache.read().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::processed::HandlerInternal;
  use crate::config::processed::{EncoderInternal, HandlerKindInternal};
  use pretty_assertions::assert_eq;

  fn config() -> ConfigInternal {
    let mut handlers = HashMap::new();
    for name in ["console", "audit"] {
      handlers.insert(
        name.to_string(),
        HandlerInternal {
          name: name.to_string(),
          kind: HandlerKindInternal::Console,
          level: None,
          encoder: EncoderInternal::default(),
        },
      );
    }
    ConfigInternal {
      debug: false,
      host: None,
      headline_width: 60,
      ignore_not_found: false,
      global_level: None,
      global_handlers: None,
      handlers,
      sources: HashMap::new(),
      error_reporting_buffer: None,
    }
  }

  fn entry(level: Option<Level>) -> SourceInternal {
    SourceInternal {
      level,
      ..Default::default()
    }
  }

  #[test]
  fn prefix_search_prefers_longest_match() {
    let mut table = HashMap::new();
    table.insert("a".to_string(), 1);
    table.insert("a.b".to_string(), 2);
    table.insert("default".to_string(), 0);

    assert_eq!(most_specific_entry(&table, "a.b.c"), Some(("a.b", &2)));
    assert_eq!(most_specific_entry(&table, "a.bc"), Some(("a", &1)));
    assert_eq!(most_specific_entry(&table, "x.y"), Some(("default", &0)));
    assert_eq!(most_specific_entry(&table, ""), Some(("default", &0)));
  }

  #[test]
  fn prefix_search_matches_whole_segments_only() {
    let mut table = HashMap::new();
    table.insert("app".to_string(), ());
    assert!(most_specific_entry(&table, "apple.core").is_none());
  }

  #[test]
  fn deep_source_inherits_ancestor_level() {
    let mut cfg = config();
    cfg.sources.insert("a".to_string(), entry(Some(Level::Error)));

    let resolution = resolve("a.b.c", &cfg).unwrap();
    assert_eq!(resolution.matched.as_deref(), Some("a"));
    assert_eq!(resolution.threshold, LevelFilter::ERROR);
  }

  #[test]
  fn default_entry_is_the_last_candidate() {
    let mut cfg = config();
    cfg.sources.insert("default".to_string(), entry(Some(Level::Info)));
    cfg.sources.insert("app.db".to_string(), entry(Some(Level::Critical)));

    assert_eq!(resolve("app.db.pool", &cfg).unwrap().threshold, LevelFilter::CRITICAL);
    assert_eq!(resolve("app.web", &cfg).unwrap().threshold, LevelFilter::INFO);
  }

  #[test]
  fn entry_without_level_uses_global_level() {
    let mut cfg = config();
    cfg.global_level = Some(Level::Warning);
    cfg.sources.insert(
      "app".to_string(),
      SourceInternal {
        handlers: Some(vec![HandlerBinding::named("console")]),
        ..Default::default()
      },
    );
    assert_eq!(resolve("app", &cfg).unwrap().threshold, LevelFilter::WARNING);
  }

  #[test]
  fn handlers_without_level_defer_to_handlers() {
    let mut cfg = config();
    cfg.sources.insert(
      "app".to_string(),
      SourceInternal {
        handlers: Some(vec![HandlerBinding::named("console")]),
        ..Default::default()
      },
    );
    let resolution = resolve("app.module", &cfg).unwrap();
    assert_eq!(resolution.threshold, LevelFilter::ALL);
    assert_eq!(resolution.handlers, vec![HandlerBinding::named("console")]);
  }

  #[test]
  fn single_handler_without_level_does_not_defer() {
    let mut cfg = config();
    cfg.sources.insert(
      "app".to_string(),
      SourceInternal {
        handler: Some(HandlerBinding::named("console")),
        ..Default::default()
      },
    );
    match resolve("app", &cfg) {
      Err(Error::LevelUnresolved { entry }) => assert_eq!(entry, "app"),
      other => panic!("Expected LevelUnresolved, got {:?}", other),
    }
  }

  #[test]
  fn single_handler_wins_over_list_and_globals() {
    let mut cfg = config();
    cfg.global_handlers = Some(vec![HandlerBinding::named("audit")]);
    cfg.sources.insert(
      "app".to_string(),
      SourceInternal {
        level: Some(Level::Info),
        handler: Some(HandlerBinding::named("console")),
        handlers: Some(vec![HandlerBinding::named("audit")]),
      },
    );
    cfg.sources.insert("lib".to_string(), entry(Some(Level::Info)));

    let app = resolve("app", &cfg).unwrap();
    assert_eq!(app.handlers, vec![HandlerBinding::named("console")]);
    let lib = resolve("lib", &cfg).unwrap();
    assert_eq!(lib.handlers, vec![HandlerBinding::named("audit")]);
  }

  #[test]
  fn unmatched_source_without_globals_is_a_configuration_error() {
    let mut cfg = config();
    cfg.sources.insert("other".to_string(), entry(Some(Level::Info)));
    let err = resolve("app.db", &cfg).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(
      err.to_string(),
      "No configuration applies to source 'app.db' and no global_handlers are set."
    );
    assert!(matches!(err, Error::Unconfigured { source_name } if source_name == "app.db"));
  }

  #[test]
  fn unmatched_source_falls_back_to_global_handlers() {
    let mut cfg = config();
    cfg.global_handlers = Some(vec![HandlerBinding::named("console")]);

    let resolution = resolve("anything", &cfg).unwrap();
    assert_eq!(resolution.matched, None);
    assert_eq!(resolution.threshold, LevelFilter::WARNING);

    cfg.debug = true;
    assert_eq!(resolve("anything", &cfg).unwrap().threshold, LevelFilter::DEBUG);

    cfg.global_level = Some(Level::Error);
    assert_eq!(resolve("anything", &cfg).unwrap().threshold, LevelFilter::ERROR);
  }

  #[test]
  fn resolver_rejects_unresolvable_entries_at_startup() {
    let mut cfg = config();
    cfg.sources.insert("app".to_string(), entry(None));
    assert!(matches!(
      ConfigResolver::new(Arc::new(cfg)),
      Err(Error::LevelUnresolved { .. })
    ));
  }

  #[test]
  fn resolver_caches_per_source() {
    let mut cfg = config();
    cfg.sources.insert("app".to_string(), entry(Some(Level::Info)));
    let resolver = ConfigResolver::new(Arc::new(cfg)).unwrap();

    let first = resolver.effective("app.db").unwrap();
    let second = resolver.effective("app.db").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.cached_sources(), 1);
    assert!(resolver.effective("elsewhere").is_err());
    assert_eq!(resolver.cached_sources(), 1);
  }
}
