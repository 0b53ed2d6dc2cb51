//! Subjects and polymorphic entity references.
//!
//! The core never owns entity data. It carries a type tag and an id; whatever
//! the tag names is loaded on demand through the
//! [`EntityRegistry`](crate::registry::EntityRegistry).

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Type tag under which subjects (users) are registered and referenced.
pub const SUBJECT_TYPE: &str = "user";

/// A hydrated entity as returned by a resolver. Its shape belongs to the
/// subsystem that registered the type.
pub type Entity = serde_json::Value;

// ─── SubjectId ───────────────────────────────────────────────────────────────

/// Opaque identifier of an acting user.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct SubjectId(pub i64);

impl SubjectId {
  /// The reference under which this subject is resolved or targeted.
  pub fn to_entity_ref(self) -> EntityRef {
    EntityRef { type_tag: SUBJECT_TYPE.to_owned(), id: self.0 }
  }
}

impl fmt::Display for SubjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<i64> for SubjectId {
  fn from(id: i64) -> Self { Self(id) }
}

// ─── EntityRef ───────────────────────────────────────────────────────────────

/// A type-tagged reference to any registered entity.
///
/// The tag does not have to be registered when the reference is created or
/// stored; only resolution requires it.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "RawEntityRef")]
pub struct EntityRef {
  #[serde(rename = "type")]
  type_tag: String,
  id:       i64,
}

#[derive(Deserialize)]
struct RawEntityRef {
  #[serde(rename = "type")]
  type_tag: String,
  id:       i64,
}

impl TryFrom<RawEntityRef> for EntityRef {
  type Error = Error;

  fn try_from(raw: RawEntityRef) -> Result<Self> {
    Self::new(raw.type_tag, raw.id)
  }
}

impl EntityRef {
  /// Build a reference, rejecting an empty type tag.
  pub fn new(type_tag: impl Into<String>, id: i64) -> Result<Self> {
    let type_tag = type_tag.into();
    if type_tag.trim().is_empty() {
      return Err(Error::InvalidArgument(
        "entity type tag must not be empty".into(),
      ));
    }
    Ok(Self { type_tag, id })
  }

  pub fn type_tag(&self) -> &str { &self.type_tag }

  pub fn id(&self) -> i64 { self.id }

  /// The subject this reference names, if it is of [`SUBJECT_TYPE`].
  pub fn as_subject(&self) -> Option<SubjectId> {
    (self.type_tag == SUBJECT_TYPE).then_some(SubjectId(self.id))
  }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.type_tag, self.id)
  }
}

/// Parses the `type:id` form produced by [`Display`](fmt::Display).
impl FromStr for EntityRef {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let (tag, id) = s.rsplit_once(':').ok_or_else(|| {
      Error::InvalidArgument(format!("expected `type:id`, got {s:?}"))
    })?;
    let id = id.parse::<i64>().map_err(|e| {
      Error::InvalidArgument(format!("bad entity id in {s:?}: {e}"))
    })?;
    Self::new(tag, id)
  }
}
