//! Activity events and the query surface over the activity log.
//!
//! Events are append-only: once written, no field is ever updated and no
//! event is deleted by normal operation. Event ids are assigned by the store
//! in write order, so id order and `created_at` order agree.

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  entity::{EntityRef, SubjectId},
};

/// Page size used when a query does not set one.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

// ─── Verb ────────────────────────────────────────────────────────────────────

/// What an actor did, e.g. `"likes"` or `"is following"`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Verb(String);

impl Verb {
  pub fn new(verb: impl Into<String>) -> Result<Self> {
    let verb = verb.into();
    if verb.trim().is_empty() {
      return Err(Error::InvalidArgument("verb must not be empty".into()));
    }
    Ok(Self(verb))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Verb {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::new(s) }
}

impl From<Verb> for String {
  fn from(v: Verb) -> Self { v.0 }
}

impl fmt::Display for Verb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Monotonic, store-assigned event identifier. Also the paging cursor.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// An immutable record of an action, optionally against a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
  pub id:         EventId,
  pub actor:      SubjectId,
  pub verb:       Verb,
  /// Absent for verbs like "created account".
  pub target:     Option<EntityRef>,
  pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
  /// Whether this event repeats the `(actor, verb, target)` triple.
  /// Targets compare by exact type and id.
  pub fn same_action(
    &self,
    actor: SubjectId,
    verb: &Verb,
    target: Option<&EntityRef>,
  ) -> bool {
    self.actor == actor && &self.verb == verb && self.target.as_ref() == target
  }
}

/// Result of [`ActivityLog::record`](crate::store::ActivityLog::record).
#[derive(Debug, Clone, Serialize)]
pub struct Recorded {
  /// The new event, or the prior matching one when deduplicated.
  pub event:        ActivityEvent,
  pub deduplicated: bool,
}

// ─── Query ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
  #[default]
  NewestFirst,
  OldestFirst,
}

/// Composable filter over the activity log, consumed by
/// [`ActivityLog::page`](crate::store::ActivityLog::page).
///
/// Paging is cursor-based on [`EventId`]: `before`/`after` bound the id range,
/// and [`resume_from`](Self::resume_from) continues from the last id of a
/// previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
  /// If set, only these actors. An empty set matches nothing.
  pub actors:          Option<BTreeSet<SubjectId>>,
  pub excluded_actors: BTreeSet<SubjectId>,
  pub verb:            Option<Verb>,
  pub target:          Option<EntityRef>,
  /// Inclusive lower bound on `created_at`.
  pub since:           Option<DateTime<Utc>>,
  /// Exclusive upper bound on the event id.
  pub before:          Option<EventId>,
  /// Exclusive lower bound on the event id.
  pub after:           Option<EventId>,
  pub order:           Order,
  pub limit:           usize,
}

impl Default for EventQuery {
  fn default() -> Self {
    Self {
      actors:          None,
      excluded_actors: BTreeSet::new(),
      verb:            None,
      target:          None,
      since:           None,
      before:          None,
      after:           None,
      order:           Order::default(),
      limit:           DEFAULT_PAGE_LIMIT,
    }
  }
}

impl EventQuery {
  pub fn new() -> Self { Self::default() }

  pub fn since(mut self, ts: DateTime<Utc>) -> Self {
    self.since = Some(ts);
    self
  }

  pub fn before(mut self, id: EventId) -> Self {
    self.before = Some(id);
    self
  }

  pub fn after(mut self, id: EventId) -> Self {
    self.after = Some(id);
    self
  }

  pub fn excluding_actor(mut self, subject: SubjectId) -> Self {
    self.excluded_actors.insert(subject);
    self
  }

  /// Restrict to `actors`. Repeated calls intersect.
  pub fn restricted_to_actors(
    mut self,
    actors: impl IntoIterator<Item = SubjectId>,
  ) -> Self {
    let incoming: BTreeSet<SubjectId> = actors.into_iter().collect();
    self.actors = Some(match self.actors.take() {
      Some(current) => current.intersection(&incoming).copied().collect(),
      None => incoming,
    });
    self
  }

  pub fn with_verb(mut self, verb: Verb) -> Self {
    self.verb = Some(verb);
    self
  }

  pub fn targeting(mut self, target: EntityRef) -> Self {
    self.target = Some(target);
    self
  }

  pub fn newest_first(mut self) -> Self {
    self.order = Order::NewestFirst;
    self
  }

  pub fn oldest_first(mut self) -> Self {
    self.order = Order::OldestFirst;
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }

  /// Continue after `cursor` in the query's direction.
  pub fn resume_from(mut self, cursor: EventId) -> Self {
    match self.order {
      Order::NewestFirst => self.before = Some(cursor),
      Order::OldestFirst => self.after = Some(cursor),
    }
    self
  }

  /// Reject queries no backend can answer.
  pub fn validate(&self) -> Result<()> {
    if self.limit == 0 {
      return Err(Error::InvalidArgument(
        "query limit must be positive".into(),
      ));
    }
    Ok(())
  }

  /// Whether a query can match anything at all.
  pub fn is_satisfiable(&self) -> bool {
    match &self.actors {
      Some(actors) => actors.iter().any(|a| !self.excluded_actors.contains(a)),
      None => true,
    }
  }

  /// The filter predicate, ignoring order and limit.
  pub fn matches(&self, event: &ActivityEvent) -> bool {
    if let Some(actors) = &self.actors
      && !actors.contains(&event.actor)
    {
      return false;
    }
    if self.excluded_actors.contains(&event.actor) {
      return false;
    }
    if let Some(verb) = &self.verb
      && &event.verb != verb
    {
      return false;
    }
    if let Some(target) = &self.target
      && event.target.as_ref() != Some(target)
    {
      return false;
    }
    if let Some(since) = self.since
      && event.created_at < since
    {
      return false;
    }
    if let Some(before) = self.before
      && event.id >= before
    {
      return false;
    }
    if let Some(after) = self.after
      && event.id <= after
    {
      return false;
    }
    true
  }
}

/// One page of events plus the cursor for the next page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventPage {
  pub events:      Vec<ActivityEvent>,
  /// Set when the page is full; there may be more events past it.
  pub next_cursor: Option<EventId>,
}

impl EventPage {
  /// Build a page from rows fetched with `limit`.
  pub fn from_rows(events: Vec<ActivityEvent>, limit: usize) -> Self {
    let next_cursor = if events.len() >= limit {
      events.last().map(|e| e.id)
    } else {
      None
    };
    Self { events, next_cursor }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn event(id: i64, actor: i64, target: Option<&str>) -> ActivityEvent {
    ActivityEvent {
      id:         EventId(id),
      actor:      SubjectId(actor),
      verb:       Verb::new("likes").unwrap(),
      target:     target.map(|t| t.parse().unwrap()),
      created_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
    }
  }

  #[test]
  fn empty_verb_is_rejected() {
    assert!(matches!(Verb::new(""), Err(Error::InvalidArgument(_))));
  }

  #[test]
  fn restricted_actors_intersect() {
    let q = EventQuery::new()
      .restricted_to_actors([SubjectId(1), SubjectId(2)])
      .restricted_to_actors([SubjectId(2), SubjectId(3)]);
    assert_eq!(q.actors, Some(BTreeSet::from([SubjectId(2)])));
  }

  #[test]
  fn empty_actor_set_matches_nothing() {
    let q = EventQuery::new().restricted_to_actors([]);
    assert!(!q.is_satisfiable());
    assert!(!q.matches(&event(1, 1, None)));
  }

  #[test]
  fn excluded_actor_wins_over_restriction() {
    let q = EventQuery::new()
      .restricted_to_actors([SubjectId(1)])
      .excluding_actor(SubjectId(1));
    assert!(!q.is_satisfiable());
    assert!(!q.matches(&event(1, 1, None)));
  }

  #[test]
  fn cursor_bounds_are_exclusive() {
    let q = EventQuery::new().before(EventId(5)).after(EventId(2));
    assert!(!q.matches(&event(5, 1, None)));
    assert!(!q.matches(&event(2, 1, None)));
    assert!(q.matches(&event(3, 1, None)));
  }

  #[test]
  fn resume_follows_direction() {
    let newest = EventQuery::new().resume_from(EventId(10));
    assert_eq!(newest.before, Some(EventId(10)));
    let oldest = EventQuery::new().oldest_first().resume_from(EventId(10));
    assert_eq!(oldest.after, Some(EventId(10)));
  }

  #[test]
  fn target_filter_is_exact() {
    let q = EventQuery::new().targeting("image:1".parse().unwrap());
    assert!(q.matches(&event(1, 1, Some("image:1"))));
    assert!(!q.matches(&event(2, 1, Some("image:2"))));
    assert!(!q.matches(&event(3, 1, None)));
  }

  #[test]
  fn same_action_distinguishes_targets() {
    let e = event(1, 7, Some("image:1"));
    let verb = Verb::new("likes").unwrap();
    let img1 = "image:1".parse::<EntityRef>().unwrap();
    let img2 = "image:2".parse::<EntityRef>().unwrap();
    assert!(e.same_action(SubjectId(7), &verb, Some(&img1)));
    assert!(!e.same_action(SubjectId(7), &verb, Some(&img2)));
    assert!(!e.same_action(SubjectId(7), &verb, None));
  }

  #[test]
  fn zero_limit_fails_validation() {
    assert!(EventQuery::new().limit(0).validate().is_err());
  }

  #[test]
  fn page_cursor_only_when_full() {
    let full = EventPage::from_rows(vec![event(3, 1, None), event(2, 1, None)], 2);
    assert_eq!(full.next_cursor, Some(EventId(2)));
    let partial = EventPage::from_rows(vec![event(3, 1, None)], 2);
    assert_eq!(partial.next_cursor, None);
  }
}
