//! JSON REST API for Trellis.
//!
//! Exposes an axum [`Router`] backed by any store implementing both
//! [`RelationshipStore`] and [`ActivityLog`]. Authentication is the host's
//! concern: subject ids arrive in the request and are trusted.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", trellis_api::api_router(state))
//! ```

pub mod activity;
pub mod error;
pub mod feed;
pub mod relationships;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tower_http::trace::TraceLayer;
use trellis_core::{
  feed::{DEFAULT_FEED_LIMIT, FeedAssembler},
  registry::EntityRegistry,
  relation::RelationKind,
  store::{ActivityLog, RelationshipStore},
  toggle::ToggleService,
};

pub use error::ApiError;

/// Largest feed page a client may request.
pub const DEFAULT_FEED_MAX_LIMIT: i64 = 100;

/// Largest `GET /activity` page a client may request.
pub const DEFAULT_ACTIVITY_MAX_LIMIT: usize = 500;

// ─── Application state ────────────────────────────────────────────────────────

/// Page-size policy for `GET /feed`.
#[derive(Debug, Clone, Copy)]
pub struct FeedLimits {
  pub default: i64,
  pub max:     i64,
}

impl Default for FeedLimits {
  fn default() -> Self {
    Self { default: DEFAULT_FEED_LIMIT, max: DEFAULT_FEED_MAX_LIMIT }
  }
}

impl FeedLimits {
  /// Apply the default to a missing limit and cap it at `max`. Non-positive
  /// limits pass through untouched.
  pub fn effective(&self, requested: Option<i64>) -> i64 {
    requested.unwrap_or(self.default).min(self.max)
  }
}

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:              Arc<S>,
  pub registry:           Arc<EntityRegistry>,
  pub toggles:            Arc<ToggleService<S, S>>,
  pub feed:               Arc<FeedAssembler<S, S>>,
  pub limits:             FeedLimits,
  /// Requested activity page sizes above this are clamped down to it.
  pub activity_max_limit: usize,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:              Arc::clone(&self.store),
      registry:           Arc::clone(&self.registry),
      toggles:            Arc::clone(&self.toggles),
      feed:               Arc::clone(&self.feed),
      limits:             self.limits,
      activity_max_limit: self.activity_max_limit,
    }
  }
}

impl<S> AppState<S>
where
  S: RelationshipStore + ActivityLog,
{
  /// Wire the services around one store that holds both edges and events.
  pub fn new(store: Arc<S>, registry: Arc<EntityRegistry>) -> Self {
    Self {
      toggles: Arc::new(ToggleService::new(store.clone(), store.clone())),
      feed: Arc::new(FeedAssembler::new(
        store.clone(),
        store.clone(),
        registry.clone(),
      )),
      store,
      registry,
      limits: FeedLimits::default(),
      activity_max_limit: DEFAULT_ACTIVITY_MAX_LIMIT,
    }
  }

  pub fn with_follow_kind(mut self, kind: RelationKind) -> Self {
    let feed = FeedAssembler::new(
      self.store.clone(),
      self.store.clone(),
      self.registry.clone(),
    )
    .with_follow_kind(kind);
    self.feed = Arc::new(feed);
    self
  }

  pub fn with_limits(mut self, limits: FeedLimits) -> Self {
    self.limits = limits;
    self
  }

  pub fn with_activity_max_limit(mut self, max: usize) -> Self {
    self.activity_max_limit = max;
    self
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: RelationshipStore + ActivityLog + 'static,
{
  Router::new()
    // Relationships
    .route("/relationships/{kind}/toggle", post(relationships::toggle::<S>))
    .route(
      "/relationships/{kind}/targets/{subject}",
      get(relationships::targets::<S>),
    )
    .route(
      "/relationships/{kind}/sources/{type_tag}/{id}",
      get(relationships::sources::<S>),
    )
    .route("/relationships/{kind}/exists", get(relationships::exists::<S>))
    // Activity
    .route("/activity", get(activity::list::<S>).post(activity::record::<S>))
    .route("/activity/{id}", get(activity::get_one::<S>))
    // Feed
    .route("/feed/{viewer}", get(feed::handler::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
