//! The EntityRef registry: maps a type tag to a batch resolver.
//!
//! Entity-owning subsystems register one [`Resolver`] per type tag at process
//! start; that registration is their only integration point with the engine.
//! Resolution groups references by tag and calls each resolver once with the
//! distinct id set for that tag.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  future::Future,
  sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::{
  Error, Result,
  entity::{Entity, EntityRef},
  error::BoxError,
};

// ─── Resolvers ───────────────────────────────────────────────────────────────

/// Loads a batch of entities of one type by id.
///
/// Ids with no entity are left out of the returned map. Implementations may
/// perform I/O; timeouts are theirs to enforce.
#[async_trait]
pub trait Resolver: Send + Sync {
  async fn resolve(
    &self,
    ids: &BTreeSet<i64>,
  ) -> Result<HashMap<i64, Entity>, BoxError>;
}

/// Adapts an async closure into a [`Resolver`].
pub struct FnResolver<F>(pub F);

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
  F: Fn(BTreeSet<i64>) -> Fut + Send + Sync,
  Fut: Future<Output = Result<HashMap<i64, Entity>, BoxError>> + Send + 'static,
{
  async fn resolve(
    &self,
    ids: &BTreeSet<i64>,
  ) -> Result<HashMap<i64, Entity>, BoxError> {
    (self.0)(ids.clone()).await
  }
}

/// Serves entities from a fixed in-memory map.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
  entities: HashMap<i64, Entity>,
}

impl StaticResolver {
  pub fn new(entities: HashMap<i64, Entity>) -> Self { Self { entities } }
}

#[async_trait]
impl Resolver for StaticResolver {
  async fn resolve(
    &self,
    ids: &BTreeSet<i64>,
  ) -> Result<HashMap<i64, Entity>, BoxError> {
    Ok(
      ids
        .iter()
        .filter_map(|id| self.entities.get(id).map(|e| (*id, e.clone())))
        .collect(),
    )
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Output of [`EntityRegistry::resolve_partial`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
  pub resolved:      HashMap<EntityRef, Entity>,
  /// Tags that had no registered resolver; their refs are not in `resolved`.
  pub unknown_types: BTreeSet<String>,
}

impl Resolution {
  pub fn get(&self, entity_ref: &EntityRef) -> Option<&Entity> {
    self.resolved.get(entity_ref)
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Type tag → resolver. Registration may happen at any time, including after
/// references to the tag have been stored.
#[derive(Default)]
pub struct EntityRegistry {
  resolvers: RwLock<HashMap<String, Arc<dyn Resolver>>>,
}

impl EntityRegistry {
  pub fn new() -> Self { Self::default() }

  /// Associate `type_tag` with `resolver`, replacing any previous one.
  pub fn register<R>(
    &self,
    type_tag: impl Into<String>,
    resolver: R,
  ) -> Result<()>
  where
    R: Resolver + 'static,
  {
    let type_tag = type_tag.into();
    if type_tag.trim().is_empty() {
      return Err(Error::InvalidArgument(
        "entity type tag must not be empty".into(),
      ));
    }
    tracing::debug!(type_tag = %type_tag, "registering entity resolver");
    self
      .resolvers
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(type_tag, Arc::new(resolver));
    Ok(())
  }

  /// Register an async closure as the resolver for `type_tag`.
  pub fn register_fn<F, Fut>(
    &self,
    type_tag: impl Into<String>,
    f: F,
  ) -> Result<()>
  where
    F: Fn(BTreeSet<i64>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HashMap<i64, Entity>, BoxError>> + Send + 'static,
  {
    self.register(type_tag, FnResolver(f))
  }

  pub fn is_registered(&self, type_tag: &str) -> bool {
    self
      .resolvers
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .contains_key(type_tag)
  }

  pub fn type_tags(&self) -> BTreeSet<String> {
    self
      .resolvers
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .cloned()
      .collect()
  }

  /// Resolve every ref, failing with [`Error::UnknownType`] if any tag is
  /// unregistered. The check happens before any resolver runs.
  pub async fn resolve_all<'a, I>(
    &self,
    refs: I,
  ) -> Result<HashMap<EntityRef, Entity>>
  where
    I: IntoIterator<Item = &'a EntityRef>,
  {
    let resolution = self.resolve_partial(refs).await?;
    match resolution.unknown_types.into_iter().next() {
      Some(tag) => Err(Error::UnknownType(tag)),
      None => Ok(resolution.resolved),
    }
  }

  /// Resolve what can be resolved; unknown tags are reported rather than
  /// failing the batch. A failing resolver still fails the whole call.
  pub async fn resolve_partial<'a, I>(&self, refs: I) -> Result<Resolution>
  where
    I: IntoIterator<Item = &'a EntityRef>,
  {
    let mut grouped: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
    for r in refs {
      grouped.entry(r.type_tag().to_owned()).or_default().insert(r.id());
    }

    // Snapshot the resolvers so no lock is held across an await.
    let mut unknown_types = BTreeSet::new();
    let mut batches = Vec::with_capacity(grouped.len());
    {
      let resolvers =
        self.resolvers.read().unwrap_or_else(PoisonError::into_inner);
      for (tag, ids) in grouped {
        match resolvers.get(&tag) {
          Some(resolver) => batches.push((tag, ids, Arc::clone(resolver))),
          None => {
            unknown_types.insert(tag);
          }
        }
      }
    }

    let loaded = try_join_all(batches.into_iter().map(
      |(tag, ids, resolver)| async move {
        tracing::trace!(type_tag = %tag, count = ids.len(), "resolving batch");
        match resolver.resolve(&ids).await {
          Ok(found) => Ok((tag, found)),
          Err(source) => Err(Error::Resolver { type_tag: tag, source }),
        }
      },
    ))
    .await?;

    let mut resolved = HashMap::new();
    for (tag, found) in loaded {
      for (id, entity) in found {
        resolved.insert(EntityRef::new(tag.clone(), id)?, entity);
      }
    }

    Ok(Resolution { resolved, unknown_types })
  }
}

impl std::fmt::Debug for EntityRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EntityRegistry")
      .field("type_tags", &self.type_tags())
      .finish()
  }
}
