//! Handlers for `/relationships` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/relationships/{kind}/toggle` | Body: [`ToggleBody`] |
//! | `GET`  | `/relationships/{kind}/targets/{subject}` | Targets plus count |
//! | `GET`  | `/relationships/{kind}/sources/{type}/{id}` | Sources, newest edge first, plus count |
//! | `GET`  | `/relationships/{kind}/exists` | `?from=<id>&target=<type>:<id>` |

use std::collections::BTreeSet;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use trellis_core::{
  activity::Verb,
  entity::{EntityRef, SubjectId},
  relation::RelationKind,
  store::{ActivityLog, RelationshipStore},
  toggle::{DesiredState, ToggleOutcome},
};

use crate::{AppState, error::ApiError};

// ─── Toggle ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /relationships/{kind}/toggle`.
#[derive(Debug, Deserialize)]
pub struct ToggleBody {
  pub from:  SubjectId,
  pub to:    EntityRef,
  pub state: DesiredState,
  /// Recorded as activity when the edge is actually created.
  pub verb:  Option<Verb>,
}

/// `POST /relationships/{kind}/toggle`
pub async fn toggle<S>(
  State(state): State<AppState<S>>,
  Path(kind): Path<String>,
  Json(body): Json<ToggleBody>,
) -> Result<Json<ToggleOutcome>, ApiError>
where
  S: RelationshipStore + ActivityLog,
{
  let kind = RelationKind::new(kind)?;
  let outcome = state
    .toggles
    .toggle(&kind, body.from, &body.to, body.state, body.verb.as_ref())
    .await?;
  Ok(Json(outcome))
}

// ─── Forward / reverse lookups ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TargetsResponse {
  pub targets: BTreeSet<EntityRef>,
  pub count:   u64,
}

/// `GET /relationships/{kind}/targets/{subject}`
pub async fn targets<S>(
  State(state): State<AppState<S>>,
  Path((kind, subject)): Path<(String, i64)>,
) -> Result<Json<TargetsResponse>, ApiError>
where
  S: RelationshipStore + ActivityLog,
{
  let kind = RelationKind::new(kind)?;
  let from = SubjectId(subject);
  let targets = state
    .store
    .targets_of(&kind, from)
    .await
    .map_err(ApiError::store)?;
  let count = state
    .store
    .count_targets(&kind, from)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(TargetsResponse { targets, count }))
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
  pub sources: Vec<SubjectId>,
  pub count:   u64,
}

/// `GET /relationships/{kind}/sources/{type}/{id}`
pub async fn sources<S>(
  State(state): State<AppState<S>>,
  Path((kind, type_tag, id)): Path<(String, String, i64)>,
) -> Result<Json<SourcesResponse>, ApiError>
where
  S: RelationshipStore + ActivityLog,
{
  let kind = RelationKind::new(kind)?;
  let to = EntityRef::new(type_tag, id)?;
  let sources = state
    .store
    .sources_of(&kind, &to)
    .await
    .map_err(ApiError::store)?;
  let count = state
    .store
    .count_sources(&kind, &to)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(SourcesResponse { sources, count }))
}

// ─── Exists ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExistsParams {
  pub from:   i64,
  /// `<type>:<id>`, e.g. `image:42`.
  pub target: String,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
  pub exists: bool,
}

/// `GET /relationships/{kind}/exists?from=<id>&target=<type>:<id>`
pub async fn exists<S>(
  State(state): State<AppState<S>>,
  Path(kind): Path<String>,
  Query(params): Query<ExistsParams>,
) -> Result<Json<ExistsResponse>, ApiError>
where
  S: RelationshipStore + ActivityLog,
{
  let kind = RelationKind::new(kind)?;
  let target: EntityRef = params.target.parse()?;
  let exists = state
    .store
    .exists_between(&kind, SubjectId(params.from), &target)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(ExistsResponse { exists }))
}
