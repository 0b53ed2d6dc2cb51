//! The relationship toggle service used by request handlers.
//!
//! Flips an edge on or off and, on a real off→on transition, records an
//! activity event. Activity describes transitions: re-adding an existing
//! edge records nothing, and removal never records anything.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  activity::{Recorded, Verb},
  entity::{EntityRef, SubjectId},
  relation::RelationKind,
  store::{ActivityLog, RelationshipStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
  On,
  Off,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleOutcome {
  /// `true` iff the relationship store changed. Callers keeping a displayed
  /// counter adjust it by exactly one when this is set.
  pub applied: bool,
  /// The activity recorded for the transition, if any.
  pub event:   Option<Recorded>,
}

pub struct ToggleService<R, L> {
  relations: Arc<R>,
  log:       Arc<L>,
}

impl<R, L> ToggleService<R, L>
where
  R: RelationshipStore,
  L: ActivityLog,
{
  pub fn new(relations: Arc<R>, log: Arc<L>) -> Self { Self { relations, log } }

  /// Drive `(kind, from, to)` to `desired`, recording `verb` when an edge is
  /// actually created.
  ///
  /// Safe to retry: a repeated call is a no-op with `applied = false`. If
  /// recording fails after the edge was created, the error is returned and
  /// the edge stays. A retry then finds the edge present and does not
  /// re-attempt the event, so that event is lost.
  pub async fn toggle(
    &self,
    kind: &RelationKind,
    from: SubjectId,
    to: &EntityRef,
    desired: DesiredState,
    verb: Option<&Verb>,
  ) -> Result<ToggleOutcome> {
    match desired {
      DesiredState::On => {
        let added =
          self.relations.add(kind, from, to).await.map_err(Error::storage)?;
        if !added.created {
          tracing::debug!(%kind, %from, %to, "edge already present");
          return Ok(ToggleOutcome { applied: false, event: None });
        }

        let event = match verb {
          Some(verb) => Some(
            self
              .log
              .record(from, verb, Some(to))
              .await
              .map_err(Error::storage)?,
          ),
          None => None,
        };
        tracing::debug!(%kind, %from, %to, recorded = event.is_some(), "edge created");
        Ok(ToggleOutcome { applied: true, event })
      }
      DesiredState::Off => {
        let removed =
          self.relations.remove(kind, from, to).await.map_err(Error::storage)?;
        tracing::debug!(%kind, %from, %to, removed = removed.removed, "edge removal");
        Ok(ToggleOutcome { applied: removed.removed, event: None })
      }
    }
  }

  /// Shorthand for [`toggle`](Self::toggle) from a boolean.
  pub async fn set(
    &self,
    kind: &RelationKind,
    from: SubjectId,
    to: &EntityRef,
    on: bool,
    verb: Option<&Verb>,
  ) -> Result<ToggleOutcome> {
    let desired = if on { DesiredState::On } else { DesiredState::Off };
    self.toggle(kind, from, to, desired, verb).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    activity::EventQuery,
    testing::MemoryStore,
  };

  fn service(store: &MemoryStore) -> ToggleService<MemoryStore, MemoryStore> {
    let store = Arc::new(store.clone());
    ToggleService::new(store.clone(), store)
  }

  fn image(id: i64) -> EntityRef { EntityRef::new("image", id).unwrap() }

  #[tokio::test]
  async fn toggling_on_twice_applies_once() {
    let store = MemoryStore::new();
    let svc = service(&store);
    let like = RelationKind::like();
    let verb = Verb::new("likes").unwrap();

    let first = svc
      .toggle(&like, SubjectId(1), &image(7), DesiredState::On, Some(&verb))
      .await
      .unwrap();
    let second = svc
      .toggle(&like, SubjectId(1), &image(7), DesiredState::On, Some(&verb))
      .await
      .unwrap();

    assert!(first.applied);
    assert!(first.event.is_some());
    assert!(!second.applied);
    assert!(second.event.is_none());
    assert_eq!(store.edge_count(), 1);
    assert_eq!(store.event_count(), 1);
  }

  #[tokio::test]
  async fn toggling_off_never_records() {
    let store = MemoryStore::new();
    let svc = service(&store);
    let like = RelationKind::like();
    let verb = Verb::new("likes").unwrap();

    svc.set(&like, SubjectId(1), &image(7), true, Some(&verb)).await.unwrap();
    let off = svc
      .set(&like, SubjectId(1), &image(7), false, Some(&verb))
      .await
      .unwrap();
    let off_again = svc
      .set(&like, SubjectId(1), &image(7), false, Some(&verb))
      .await
      .unwrap();

    assert!(off.applied);
    assert!(!off_again.applied);
    assert_eq!(store.edge_count(), 0);
    assert_eq!(store.event_count(), 1);
  }

  #[tokio::test]
  async fn no_verb_means_no_event() {
    let store = MemoryStore::new();
    let out = service(&store)
      .toggle(
        &RelationKind::follow(),
        SubjectId(1),
        &SubjectId(2).to_entity_ref(),
        DesiredState::On,
        None,
      )
      .await
      .unwrap();
    assert!(out.applied);
    assert!(out.event.is_none());
    assert_eq!(store.event_count(), 0);
  }

  #[tokio::test]
  async fn re_follow_inside_window_is_deduplicated() {
    let store = MemoryStore::new();
    let svc = service(&store);
    let follow = RelationKind::follow();
    let verb = Verb::new("is following").unwrap();
    let to = SubjectId(2).to_entity_ref();

    svc.set(&follow, SubjectId(1), &to, true, Some(&verb)).await.unwrap();
    svc.set(&follow, SubjectId(1), &to, false, Some(&verb)).await.unwrap();
    let again = svc.set(&follow, SubjectId(1), &to, true, Some(&verb)).await.unwrap();

    assert!(again.applied);
    assert!(again.event.unwrap().deduplicated);
    let events = store.page(&EventQuery::new()).await.unwrap().events;
    assert_eq!(events.len(), 1);
  }

  #[tokio::test]
  async fn storage_failure_propagates() {
    let store = MemoryStore::new();
    store.fail(true);
    let err = service(&store)
      .toggle(&RelationKind::like(), SubjectId(1), &image(1), DesiredState::On, None)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
  }

  #[tokio::test]
  async fn event_lost_when_recording_fails_is_not_retried() {
    let relations = MemoryStore::new();
    let log = MemoryStore::new();
    let svc = ToggleService::new(Arc::new(relations.clone()), Arc::new(log.clone()));
    let like = RelationKind::like();
    let verb = Verb::new("likes").unwrap();

    log.fail(true);
    let err = svc
      .toggle(&like, SubjectId(1), &image(7), DesiredState::On, Some(&verb))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(relations.edge_count(), 1);

    log.fail(false);
    let retry = svc
      .toggle(&like, SubjectId(1), &image(7), DesiredState::On, Some(&verb))
      .await
      .unwrap();
    assert!(!retry.applied);
    assert!(retry.event.is_none());
    assert_eq!(log.event_count(), 0);
  }
}
