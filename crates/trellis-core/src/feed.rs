//! Feed assembly: a bounded, newest-first, hydrated view of the activity log
//! filtered by the viewer's follow graph.
//!
//! Policy: a viewer who follows nobody sees the global stream (minus their
//! own actions) so a new user's dashboard is never empty. A viewer who
//! follows someone sees only the followed subjects' actions.

use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;

use crate::{
  Error, Result,
  activity::{ActivityEvent, EventId, EventQuery},
  entity::{Entity, EntityRef, SubjectId},
  hydrate::BatchHydrator,
  registry::EntityRegistry,
  relation::RelationKind,
  store::{ActivityLog, RelationshipStore},
};

/// Page size used by callers that do not ask for one.
pub const DEFAULT_FEED_LIMIT: i64 = 10;

// ─── Page types ──────────────────────────────────────────────────────────────

/// An event with its actor and target resolved. Either may be `None` when the
/// entity is gone or its type has no resolver.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
  pub event:  ActivityEvent,
  pub actor:  Option<Entity>,
  pub target: Option<Entity>,
}

/// A request-scoped, never-persisted page of feed items.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedPage {
  pub items:       Vec<FeedItem>,
  /// Pass as [`FeedRequest::before`] to fetch the next page.
  pub next_cursor: Option<EventId>,
}

impl FeedPage {
  pub fn event_ids(&self) -> Vec<EventId> {
    self.items.iter().map(|i| i.event.id).collect()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedRequest {
  /// `<= 0` yields an empty page.
  pub limit:  i64,
  /// Only events older than this cursor.
  pub before: Option<EventId>,
}

impl Default for FeedRequest {
  fn default() -> Self { Self { limit: DEFAULT_FEED_LIMIT, before: None } }
}

// ─── Assembler ───────────────────────────────────────────────────────────────

/// Builds feeds. Read-only: dropping a `build_feed` future at any point
/// leaves no trace.
pub struct FeedAssembler<R, L> {
  relations:   Arc<R>,
  log:         Arc<L>,
  hydrator:    BatchHydrator,
  follow_kind: RelationKind,
}

impl<R, L> FeedAssembler<R, L>
where
  R: RelationshipStore,
  L: ActivityLog,
{
  pub fn new(
    relations: Arc<R>,
    log: Arc<L>,
    registry: Arc<EntityRegistry>,
  ) -> Self {
    Self {
      relations,
      log,
      hydrator: BatchHydrator::new(registry),
      follow_kind: RelationKind::follow(),
    }
  }

  /// Use `kind` instead of `"follow"` to compute the viewer's graph.
  pub fn with_follow_kind(mut self, kind: RelationKind) -> Self {
    self.follow_kind = kind;
    self
  }

  /// The newest `limit` feed items for `viewer`.
  pub async fn build_feed(
    &self,
    viewer: SubjectId,
    limit: i64,
  ) -> Result<FeedPage> {
    self
      .build_feed_page(viewer, FeedRequest { limit, before: None })
      .await
  }

  /// Like [`build_feed`](Self::build_feed), continuing from a cursor.
  pub async fn build_feed_page(
    &self,
    viewer: SubjectId,
    request: FeedRequest,
  ) -> Result<FeedPage> {
    if request.limit <= 0 {
      return Ok(FeedPage::default());
    }
    let limit = usize::try_from(request.limit).map_err(|_| {
      Error::InvalidArgument(format!("feed limit {} too large", request.limit))
    })?;

    let followed = self.followed_subjects(viewer).await?;

    let mut query = EventQuery::new()
      .excluding_actor(viewer)
      .newest_first()
      .limit(limit);
    if !followed.is_empty() {
      query = query.restricted_to_actors(followed);
    }
    if let Some(before) = request.before {
      query = query.before(before);
    }

    let page = self.log.page(&query).await.map_err(Error::storage)?;
    tracing::debug!(
      viewer = %viewer,
      personalised = query.actors.is_some(),
      events = page.events.len(),
      "assembled feed"
    );

    let mut feed = self.hydrator.hydrate(page.events).await?;
    feed.next_cursor = page.next_cursor;
    Ok(feed)
  }

  /// Subjects the viewer follows. Non-subject targets and a self-follow do
  /// not count.
  async fn followed_subjects(
    &self,
    viewer: SubjectId,
  ) -> Result<BTreeSet<SubjectId>> {
    let targets = self
      .relations
      .targets_of(&self.follow_kind, viewer)
      .await
      .map_err(Error::storage)?;
    Ok(
      targets
        .iter()
        .filter_map(EntityRef::as_subject)
        .filter(|s| *s != viewer)
        .collect(),
    )
  }
}
