//! Batch hydration of activity events.
//!
//! A page of N events names up to N actors and N targets. Resolving them one
//! by one costs `2 × N` lookups; the [`BatchHydrator`] collects the distinct
//! references across the whole page and resolves them with one resolver call
//! per entity type. Actors are references of type
//! [`SUBJECT_TYPE`](crate::entity::SUBJECT_TYPE), so they share that call
//! with any user targets.

use std::{collections::BTreeSet, sync::Arc};

use crate::{
  Result,
  activity::ActivityEvent,
  entity::EntityRef,
  feed::{FeedItem, FeedPage},
  registry::EntityRegistry,
};

#[derive(Debug, Clone)]
pub struct BatchHydrator {
  registry: Arc<EntityRegistry>,
}

impl BatchHydrator {
  pub fn new(registry: Arc<EntityRegistry>) -> Self { Self { registry } }

  /// Resolve actors and targets for `events`, preserving their order.
  ///
  /// A reference whose type has no resolver degrades that field to `None`;
  /// the event stays in the page. A resolver failure fails the page.
  pub async fn hydrate(&self, events: Vec<ActivityEvent>) -> Result<FeedPage> {
    if events.is_empty() {
      return Ok(FeedPage::default());
    }

    let mut refs: BTreeSet<EntityRef> = BTreeSet::new();
    for event in &events {
      refs.insert(event.actor.to_entity_ref());
      if let Some(target) = &event.target {
        refs.insert(target.clone());
      }
    }

    let resolution = self.registry.resolve_partial(&refs).await?;
    if !resolution.unknown_types.is_empty() {
      tracing::warn!(
        types = ?resolution.unknown_types,
        "no resolver registered; hydrating those references as absent"
      );
    }

    let items = events
      .into_iter()
      .map(|event| {
        let actor = resolution.get(&event.actor.to_entity_ref()).cloned();
        let target = event
          .target
          .as_ref()
          .and_then(|t| resolution.get(t))
          .cloned();
        FeedItem { event, actor, target }
      })
      .collect();

    Ok(FeedPage { items, next_cursor: None })
  }
}
