//! Configuration and wiring for the Trellis HTTP server.
//!
//! The binary in `main.rs` only parses the CLI, initialises tracing and calls
//! into this module, so everything here is testable without a socket.

use std::{
  collections::{BTreeMap, HashMap},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use axum::Router;
use serde::Deserialize;
use trellis_api::{AppState, DEFAULT_ACTIVITY_MAX_LIMIT, FeedLimits};
use trellis_core::{
  entity::Entity,
  registry::{EntityRegistry, StaticResolver},
  relation::RelationKind,
};
use trellis_store_sqlite::{DEFAULT_DEDUP_WINDOW_SECS, SqliteStore};

/// Prefix for environment overrides, e.g. `TRELLIS_PORT=9000`.
pub const ENV_PREFIX: &str = "TRELLIS";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `trellis.toml` and the
/// environment.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub dedup_window_secs:  i64,
  pub feed_default_limit: i64,
  pub feed_max_limit:     i64,
  pub activity_max_limit: usize,
  pub follow_kind:        String,
  /// JSON file of `{ "<type>": { "<id>": <entity> } }`.
  pub catalog_path:       Option<PathBuf>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "127.0.0.1".to_string(),
      port:               8080,
      store_path:         PathBuf::from("trellis.db"),
      dedup_window_secs:  DEFAULT_DEDUP_WINDOW_SECS,
      feed_default_limit: trellis_core::feed::DEFAULT_FEED_LIMIT,
      feed_max_limit:     trellis_api::DEFAULT_FEED_MAX_LIMIT,
      activity_max_limit: DEFAULT_ACTIVITY_MAX_LIMIT,
      follow_kind:        RelationKind::FOLLOW.to_string(),
      catalog_path:       None,
    }
  }
}

impl ServerConfig {
  /// Layer the TOML file at `path` (optional) under `TRELLIS_*` variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix(ENV_PREFIX))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn feed_limits(&self) -> anyhow::Result<FeedLimits> {
    anyhow::ensure!(
      self.feed_max_limit > 0,
      "feed_max_limit must be positive, got {}",
      self.feed_max_limit
    );
    Ok(FeedLimits {
      default: self.feed_default_limit.min(self.feed_max_limit),
      max:     self.feed_max_limit,
    })
  }

  pub fn activity_max_limit(&self) -> anyhow::Result<usize> {
    anyhow::ensure!(
      self.activity_max_limit > 0,
      "activity_max_limit must be positive"
    );
    Ok(self.activity_max_limit)
  }

  pub fn dedup_window(&self) -> anyhow::Result<chrono::Duration> {
    anyhow::ensure!(
      self.dedup_window_secs >= 0,
      "dedup_window_secs must not be negative, got {}",
      self.dedup_window_secs
    );
    chrono::Duration::try_seconds(self.dedup_window_secs).with_context(|| {
      format!(
        "dedup_window_secs is out of range, got {}",
        self.dedup_window_secs
      )
    })
  }
}

// ─── Entity catalog ───────────────────────────────────────────────────────────

/// Entities served from a static file, keyed by type tag then id.
///
/// Hosts with their own entity tables register resolvers in code; the catalog
/// covers deployments where the display data is small and fixed.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct Catalog(pub BTreeMap<String, HashMap<i64, Entity>>);

impl Catalog {
  pub fn from_json(json: &str) -> anyhow::Result<Self> {
    serde_json::from_str(json).context("catalog is not a `{type: {id: entity}}` map")
  }

  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read catalog at {path:?}"))?;
    Self::from_json(&raw)
  }

  /// Register one [`StaticResolver`] per type tag.
  pub fn register_into(self, registry: &EntityRegistry) -> anyhow::Result<()> {
    for (type_tag, entities) in self.0 {
      tracing::info!(type_tag = %type_tag, entities = entities.len(), "registering catalog type");
      registry
        .register(type_tag.clone(), StaticResolver::new(entities))
        .with_context(|| format!("failed to register catalog type {type_tag:?}"))?;
    }
    Ok(())
  }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

/// Open the store, load the catalog and build the API router.
pub async fn build_app(cfg: &ServerConfig) -> anyhow::Result<Router> {
  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_dedup_window(cfg.dedup_window()?);

  let registry = Arc::new(EntityRegistry::new());
  if let Some(path) = &cfg.catalog_path {
    Catalog::load(&expand_tilde(path))?.register_into(&registry)?;
  }
  if registry.type_tags().is_empty() {
    tracing::warn!("no entity resolvers registered; feed items will not be hydrated");
  }

  let follow_kind = RelationKind::new(cfg.follow_kind.clone())
    .context("invalid follow_kind")?;
  let state = AppState::new(Arc::new(store), registry)
    .with_follow_kind(follow_kind)
    .with_limits(cfg.feed_limits()?)
    .with_activity_max_limit(cfg.activity_max_limit()?);

  Ok(trellis_api::api_router(state))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use config::{File, FileFormat};
  use trellis_core::entity::EntityRef;

  use super::*;

  fn from_toml(toml: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn missing_keys_take_defaults() {
    let cfg = from_toml("port = 9000\n");
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.dedup_window_secs, 60);
    assert_eq!(cfg.feed_default_limit, 10);
    assert_eq!(cfg.feed_max_limit, 100);
    assert_eq!(cfg.activity_max_limit, 500);
    assert_eq!(cfg.follow_kind, "follow");
    assert!(cfg.catalog_path.is_none());
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("trellis.db"));
  }

  #[test]
  fn limits_are_checked() {
    let cfg = from_toml("feed_default_limit = 500\nfeed_max_limit = 50\n");
    let limits = cfg.feed_limits().unwrap();
    assert_eq!((limits.default, limits.max), (50, 50));

    assert!(from_toml("feed_max_limit = 0\n").feed_limits().is_err());
    assert!(from_toml("activity_max_limit = 0\n").activity_max_limit().is_err());
    assert_eq!(
      from_toml("activity_max_limit = 200\n").activity_max_limit().unwrap(),
      200
    );
    assert!(from_toml("dedup_window_secs = -1\n").dedup_window().is_err());
  }

  #[test]
  fn oversized_dedup_window_is_rejected() {
    let cfg = from_toml("dedup_window_secs = 10000000000000000\n");
    let err = cfg.dedup_window().unwrap_err();
    assert!(err.to_string().contains("out of range"), "{err}");

    let wide = from_toml("dedup_window_secs = 9000000000000\n");
    assert_eq!(
      wide.dedup_window().unwrap(),
      chrono::Duration::seconds(9_000_000_000_000)
    );
  }

  #[tokio::test]
  async fn catalog_registers_static_resolvers() {
    let catalog = Catalog::from_json(
      r#"{
        "user":  { "1": { "username": "ada" }, "2": { "username": "lin" } },
        "image": { "7": { "title": "tidepool" } }
      }"#,
    )
    .unwrap();

    let registry = EntityRegistry::new();
    catalog.register_into(&registry).unwrap();
    assert_eq!(
      registry.type_tags(),
      BTreeSet::from(["image".to_string(), "user".to_string()])
    );

    let image: EntityRef = "image:7".parse().unwrap();
    let resolved = registry.resolve_all([&image]).await.unwrap();
    assert_eq!(resolved[&image]["title"], "tidepool");
  }

  #[test]
  fn catalog_rejects_non_numeric_ids() {
    assert!(Catalog::from_json(r#"{ "user": { "ada": {} } }"#).is_err());
  }

  #[tokio::test]
  async fn app_builds_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("catalog.json");
    std::fs::write(&catalog, r#"{ "user": { "1": { "username": "ada" } } }"#).unwrap();

    let cfg = ServerConfig {
      store_path: dir.path().join("trellis.db"),
      catalog_path: Some(catalog),
      ..ServerConfig::default()
    };
    build_app(&cfg).await.unwrap();
    assert!(dir.path().join("trellis.db").exists());
  }

  #[test]
  fn tilde_expands_to_home() {
    let plain = PathBuf::from("/var/lib/trellis.db");
    assert_eq!(expand_tilde(&plain), plain);
  }
}
