//! Handler for `GET /feed/{viewer}[?limit=..][&before=..]`.
//!
//! A missing `limit` uses the configured default; larger values are capped at
//! the configured maximum. A non-positive limit yields an empty page.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use trellis_core::{
  activity::EventId,
  entity::SubjectId,
  feed::{FeedPage, FeedRequest},
  store::{ActivityLog, RelationshipStore},
};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct FeedParams {
  pub limit:  Option<i64>,
  /// `next_cursor` from the previous page.
  pub before: Option<i64>,
}

pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Path(viewer): Path<i64>,
  Query(params): Query<FeedParams>,
) -> Result<Json<FeedPage>, ApiError>
where
  S: RelationshipStore + ActivityLog,
{
  let request = FeedRequest {
    limit:  state.limits.effective(params.limit),
    before: params.before.map(EventId),
  };
  let page = state.feed.build_feed_page(SubjectId(viewer), request).await?;
  Ok(Json(page))
}
