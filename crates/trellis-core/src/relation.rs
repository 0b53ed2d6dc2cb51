//! Relationship edges: directed, typed links from a subject to an entity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  entity::{EntityRef, SubjectId},
};

/// The class of a relationship, e.g. `"follow"` or `"like"`. All kinds share
/// one storage shape.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct RelationKind(String);

impl RelationKind {
  pub const FOLLOW: &'static str = "follow";
  pub const LIKE: &'static str = "like";

  pub fn new(kind: impl Into<String>) -> Result<Self> {
    let kind = kind.into();
    if kind.trim().is_empty() {
      return Err(Error::InvalidArgument(
        "relationship kind must not be empty".into(),
      ));
    }
    Ok(Self(kind))
  }

  pub fn follow() -> Self { Self(Self::FOLLOW.to_owned()) }

  pub fn like() -> Self { Self(Self::LIKE.to_owned()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for RelationKind {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::new(s) }
}

impl From<RelationKind> for String {
  fn from(k: RelationKind) -> Self { k.0 }
}

impl fmt::Display for RelationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A stored edge. At most one exists per `(kind, from, to)`; edges are
/// created and destroyed, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
  pub kind:       RelationKind,
  pub from:       SubjectId,
  pub to:         EntityRef,
  pub created_at: DateTime<Utc>,
}

/// Result of [`RelationshipStore::add`](crate::store::RelationshipStore::add).
#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
  /// `false` when the edge already existed; not an error.
  pub created: bool,
  /// The edge as stored, whether new or pre-existing.
  pub edge:    RelationshipEdge,
}

/// Result of
/// [`RelationshipStore::remove`](crate::store::RelationshipStore::remove).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemoveOutcome {
  pub removed: bool,
}
