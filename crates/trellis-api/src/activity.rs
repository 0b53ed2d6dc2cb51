//! Handlers for `/activity` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/activity` | Body: [`RecordBody`]; 201 when new, 200 when deduplicated |
//! | `GET`  | `/activity` | Optional `before`, `after`, `since`, `actor`, `verb`, `target`, `order`, `limit` |
//! | `GET`  | `/activity/{id}` | 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use trellis_core::{
  activity::{
    ActivityEvent, DEFAULT_PAGE_LIMIT, EventId, EventPage, EventQuery, Order,
    Verb,
  },
  entity::{EntityRef, SubjectId},
  store::{ActivityLog, RelationshipStore},
};

use crate::{AppState, error::ApiError};

// ─── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecordBody {
  pub actor:  SubjectId,
  pub verb:   Verb,
  pub target: Option<EntityRef>,
}

/// `POST /activity`
pub async fn record<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<RecordBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RelationshipStore + ActivityLog,
{
  let recorded = state
    .store
    .record(body.actor, &body.verb, body.target.as_ref())
    .await
    .map_err(ApiError::store)?;
  let status = if recorded.deduplicated {
    StatusCode::OK
  } else {
    StatusCode::CREATED
  };
  Ok((status, Json(recorded)))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub before: Option<i64>,
  pub after:  Option<i64>,
  /// Inclusive lower bound on `created_at`.
  pub since:  Option<DateTime<Utc>>,
  pub actor:  Option<i64>,
  pub verb:   Option<String>,
  /// `<type>:<id>`.
  pub target: Option<String>,
  pub order:  Option<Order>,
  pub limit:  Option<usize>,
}

impl ListParams {
  /// Build the page query, clamping the requested size to `max`. A zero
  /// limit is still rejected.
  fn into_query(self, max: usize) -> Result<EventQuery, ApiError> {
    let mut query = EventQuery::new()
      .limit(self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(max));
    if let Some(order) = self.order {
      query.order = order;
    }
    if let Some(before) = self.before {
      query = query.before(EventId(before));
    }
    if let Some(after) = self.after {
      query = query.after(EventId(after));
    }
    if let Some(since) = self.since {
      query = query.since(since);
    }
    if let Some(actor) = self.actor {
      query = query.restricted_to_actors([SubjectId(actor)]);
    }
    if let Some(verb) = self.verb {
      query = query.with_verb(Verb::new(verb)?);
    }
    if let Some(target) = self.target {
      query = query.targeting(target.parse()?);
    }
    query.validate()?;
    Ok(query)
  }
}

/// `GET /activity[?before=..][&after=..][&since=..][&actor=..][&limit=..]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<EventPage>, ApiError>
where
  S: RelationshipStore + ActivityLog,
{
  let query = params.into_query(state.activity_max_limit)?;
  let page = state.store.page(&query).await.map_err(ApiError::store)?;
  Ok(Json(page))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /activity/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<ActivityEvent>, ApiError>
where
  S: RelationshipStore + ActivityLog,
{
  let event = state
    .store
    .get(EventId(id))
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("event {id} not found")))?;
  Ok(Json(event))
}
