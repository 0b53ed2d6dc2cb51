//! The storage traits: [`RelationshipStore`] and [`ActivityLog`].
//!
//! The traits are implemented by storage backends (e.g.
//! `trellis-store-sqlite`). The services in this crate depend on these
//! abstractions, not on any concrete backend. The two stores are the only
//! writers in the engine; everything else reads.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::{
  collections::{BTreeSet, VecDeque},
  future::Future,
};

use futures::{Stream, stream};

use crate::{
  activity::{ActivityEvent, EventId, EventPage, EventQuery, Recorded, Verb},
  entity::{EntityRef, SubjectId},
  relation::{AddOutcome, RelationKind, RemoveOutcome},
};

// ─── Relationships ───────────────────────────────────────────────────────────

/// A durable set of directed, typed edges.
///
/// `add` and `remove` are idempotent and individually atomic: concurrent
/// `add` calls for one `(kind, from, to)` leave exactly one edge and report
/// `created = true` at most once. Backends get this from their own
/// insert-if-absent primitive rather than from a lock in the caller.
pub trait RelationshipStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert the edge unless it already exists.
  fn add<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
    to: &'a EntityRef,
  ) -> impl Future<Output = Result<AddOutcome, Self::Error>> + Send + 'a;

  /// Delete the edge if present.
  fn remove<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
    to: &'a EntityRef,
  ) -> impl Future<Output = Result<RemoveOutcome, Self::Error>> + Send + 'a;

  fn exists_between<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
    to: &'a EntityRef,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Everything `from` currently points at with `kind`.
  fn targets_of<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
  ) -> impl Future<Output = Result<BTreeSet<EntityRef>, Self::Error>> + Send + 'a;

  /// Reverse lookup, most recent edge first.
  fn sources_of<'a>(
    &'a self,
    kind: &'a RelationKind,
    to: &'a EntityRef,
  ) -> impl Future<Output = Result<Vec<SubjectId>, Self::Error>> + Send + 'a;

  /// Number of subjects pointing at `to` (follower count, like count).
  fn count_sources<'a>(
    &'a self,
    kind: &'a RelationKind,
    to: &'a EntityRef,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Number of entities `from` points at (following count).
  fn count_targets<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}

// ─── Activity ────────────────────────────────────────────────────────────────

/// Append-only log of actions.
pub trait ActivityLog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append an event unless the same `(actor, verb, target)` was recorded
  /// within the store's dedup window, in which case the prior event is
  /// returned with `deduplicated = true`. A duplicate is not an error.
  ///
  /// The check and the insert are not globally serialised; under heavy
  /// contention one duplicate may slip through.
  fn record<'a>(
    &'a self,
    actor: SubjectId,
    verb: &'a Verb,
    target: Option<&'a EntityRef>,
  ) -> impl Future<Output = Result<Recorded, Self::Error>> + Send + 'a;

  fn get(
    &self,
    id: EventId,
  ) -> impl Future<Output = Result<Option<ActivityEvent>, Self::Error>> + Send + '_;

  /// One page of events matching `query`, in the query's order.
  fn page<'a>(
    &'a self,
    query: &'a EventQuery,
  ) -> impl Future<Output = Result<EventPage, Self::Error>> + Send + 'a;
}

/// Lazily walk every event matching `query`, fetching one page at a time.
///
/// The walk only moves forward. To restart, build a new query resumed from
/// any id already seen.
pub fn scan<'a, L>(
  log: &'a L,
  query: EventQuery,
) -> impl Stream<Item = Result<ActivityEvent, L::Error>> + Send + 'a
where
  L: ActivityLog,
{
  struct State {
    next:     Option<EventQuery>,
    buffered: VecDeque<ActivityEvent>,
  }

  let start = State { next: Some(query), buffered: VecDeque::new() };

  stream::try_unfold(start, move |mut state| async move {
    loop {
      if let Some(event) = state.buffered.pop_front() {
        return Ok::<_, L::Error>(Some((event, state)));
      }
      let Some(query) = state.next.take() else {
        return Ok(None);
      };
      let page = log.page(&query).await?;
      state.next = page.next_cursor.map(|cursor| query.resume_from(cursor));
      state.buffered.extend(page.events);
    }
  })
}
