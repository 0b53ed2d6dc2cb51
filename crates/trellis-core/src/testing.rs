//! In-memory fakes for exercising the services without a database.

use std::{
  collections::{BTreeSet, HashMap},
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use crate::{
  activity::{ActivityEvent, EventId, EventPage, EventQuery, Order, Recorded, Verb},
  clock::{Clock, ManualClock},
  entity::{Entity, EntityRef, SubjectId},
  error::BoxError,
  registry::Resolver,
  relation::{AddOutcome, RelationKind, RelationshipEdge, RemoveOutcome},
  store::{ActivityLog, RelationshipStore},
};

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Echoes `{"type", "id"}` for every id and counts its calls.
#[derive(Clone)]
pub struct CountingResolver {
  type_tag: String,
  calls:    Arc<AtomicUsize>,
  last_ids: Arc<Mutex<Option<BTreeSet<i64>>>>,
}

impl CountingResolver {
  pub fn echo(type_tag: &str) -> Self {
    Self {
      type_tag: type_tag.to_owned(),
      calls:    Arc::new(AtomicUsize::new(0)),
      last_ids: Arc::new(Mutex::new(None)),
    }
  }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

  pub fn last_ids(&self) -> Option<BTreeSet<i64>> {
    self.last_ids.lock().unwrap().clone()
  }
}

#[async_trait]
impl Resolver for CountingResolver {
  async fn resolve(
    &self,
    ids: &BTreeSet<i64>,
  ) -> Result<HashMap<i64, Entity>, BoxError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    *self.last_ids.lock().unwrap() = Some(ids.clone());
    Ok(
      ids
        .iter()
        .map(|id| (*id, json!({ "type": self.type_tag, "id": id })))
        .collect(),
    )
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("memory store unavailable")]
pub struct Unavailable;

#[derive(Default)]
struct Inner {
  edges:  Vec<RelationshipEdge>,
  events: Vec<ActivityEvent>,
}

/// Both storage traits over plain vectors, with a manual clock and a switch
/// that makes every call fail.
#[derive(Clone)]
pub struct MemoryStore {
  inner:      Arc<Mutex<Inner>>,
  pub clock:  ManualClock,
  window:     Duration,
  failing:    Arc<AtomicBool>,
  page_calls: Arc<AtomicUsize>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      inner:      Arc::default(),
      clock:      ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
      ),
      window:     Duration::seconds(60),
      failing:    Arc::new(AtomicBool::new(false)),
      page_calls: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub fn fail(&self, on: bool) { self.failing.store(on, Ordering::SeqCst); }

  pub fn page_calls(&self) -> usize { self.page_calls.load(Ordering::SeqCst) }

  pub fn edge_count(&self) -> usize { self.inner.lock().unwrap().edges.len() }

  pub fn event_count(&self) -> usize {
    self.inner.lock().unwrap().events.len()
  }

  fn check(&self) -> Result<(), Unavailable> {
    if self.failing.load(Ordering::SeqCst) {
      Err(Unavailable)
    } else {
      Ok(())
    }
  }

  fn position(
    inner: &Inner,
    kind: &RelationKind,
    from: SubjectId,
    to: &EntityRef,
  ) -> Option<usize> {
    inner
      .edges
      .iter()
      .position(|e| &e.kind == kind && e.from == from && &e.to == to)
  }
}

impl RelationshipStore for MemoryStore {
  type Error = Unavailable;

  async fn add<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
    to: &'a EntityRef,
  ) -> Result<AddOutcome, Unavailable> {
    self.check()?;
    let mut inner = self.inner.lock().unwrap();
    if let Some(i) = Self::position(&inner, kind, from, to) {
      return Ok(AddOutcome { created: false, edge: inner.edges[i].clone() });
    }
    let edge = RelationshipEdge {
      kind: kind.clone(),
      from,
      to: to.clone(),
      created_at: self.clock.now(),
    };
    inner.edges.push(edge.clone());
    Ok(AddOutcome { created: true, edge })
  }

  async fn remove<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
    to: &'a EntityRef,
  ) -> Result<RemoveOutcome, Unavailable> {
    self.check()?;
    let mut inner = self.inner.lock().unwrap();
    let removed = match Self::position(&inner, kind, from, to) {
      Some(i) => {
        inner.edges.remove(i);
        true
      }
      None => false,
    };
    Ok(RemoveOutcome { removed })
  }

  async fn exists_between<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
    to: &'a EntityRef,
  ) -> Result<bool, Unavailable> {
    self.check()?;
    let inner = self.inner.lock().unwrap();
    Ok(Self::position(&inner, kind, from, to).is_some())
  }

  async fn targets_of<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
  ) -> Result<BTreeSet<EntityRef>, Unavailable> {
    self.check()?;
    let inner = self.inner.lock().unwrap();
    Ok(
      inner
        .edges
        .iter()
        .filter(|e| &e.kind == kind && e.from == from)
        .map(|e| e.to.clone())
        .collect(),
    )
  }

  async fn sources_of<'a>(
    &'a self,
    kind: &'a RelationKind,
    to: &'a EntityRef,
  ) -> Result<Vec<SubjectId>, Unavailable> {
    self.check()?;
    let inner = self.inner.lock().unwrap();
    Ok(
      inner
        .edges
        .iter()
        .rev()
        .filter(|e| &e.kind == kind && &e.to == to)
        .map(|e| e.from)
        .collect(),
    )
  }

  async fn count_sources<'a>(
    &'a self,
    kind: &'a RelationKind,
    to: &'a EntityRef,
  ) -> Result<u64, Unavailable> {
    Ok(self.sources_of(kind, to).await?.len() as u64)
  }

  async fn count_targets<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
  ) -> Result<u64, Unavailable> {
    Ok(self.targets_of(kind, from).await?.len() as u64)
  }
}

impl ActivityLog for MemoryStore {
  type Error = Unavailable;

  async fn record<'a>(
    &'a self,
    actor: SubjectId,
    verb: &'a Verb,
    target: Option<&'a EntityRef>,
  ) -> Result<Recorded, Unavailable> {
    self.check()?;
    let now = self.clock.now();
    let mut inner = self.inner.lock().unwrap();
    let prior = inner.events.iter().rev().find(|e| {
      e.created_at >= now - self.window && e.same_action(actor, verb, target)
    });
    if let Some(event) = prior {
      return Ok(Recorded { event: event.clone(), deduplicated: true });
    }
    let event = ActivityEvent {
      id: EventId(inner.events.len() as i64 + 1),
      actor,
      verb: verb.clone(),
      target: target.cloned(),
      created_at: now,
    };
    inner.events.push(event.clone());
    Ok(Recorded { event, deduplicated: false })
  }

  async fn get(&self, id: EventId) -> Result<Option<ActivityEvent>, Unavailable> {
    self.check()?;
    let inner = self.inner.lock().unwrap();
    Ok(inner.events.iter().find(|e| e.id == id).cloned())
  }

  async fn page<'a>(
    &'a self,
    query: &'a EventQuery,
  ) -> Result<EventPage, Unavailable> {
    self.check()?;
    self.page_calls.fetch_add(1, Ordering::SeqCst);
    let inner = self.inner.lock().unwrap();
    let matching = inner.events.iter().filter(|e| query.matches(e)).cloned();
    let events: Vec<_> = match query.order {
      Order::NewestFirst => matching.rev().take(query.limit).collect(),
      Order::OldestFirst => matching.take(query.limit).collect(),
    };
    Ok(EventPage::from_rows(events, query.limit))
  }
}
