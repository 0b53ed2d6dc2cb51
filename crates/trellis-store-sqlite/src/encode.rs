//! Encoding and decoding helpers between Trellis domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with fixed microsecond precision and a `Z`
//! suffix, so comparing the strings compares the instants. Entity refs are
//! split into a `target_type` / `target_id` column pair.

use chrono::{DateTime, SecondsFormat, Utc};
use trellis_core::{
  activity::{ActivityEvent, EventId, Verb},
  entity::{EntityRef, SubjectId},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── EntityRef ───────────────────────────────────────────────────────────────

pub fn encode_target(target: Option<&EntityRef>) -> (Option<String>, Option<i64>) {
  match target {
    Some(t) => (Some(t.type_tag().to_owned()), Some(t.id())),
    None => (None, None),
  }
}

pub fn decode_target(
  target_type: Option<String>,
  target_id: Option<i64>,
) -> Result<Option<EntityRef>> {
  match (target_type, target_id) {
    (Some(tag), Some(id)) => Ok(Some(EntityRef::new(tag, id)?)),
    _ => Ok(None),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `events` row.
pub struct RawEvent {
  pub event_id:    i64,
  pub actor_id:    i64,
  pub verb:        String,
  pub target_type: Option<String>,
  pub target_id:   Option<i64>,
  pub created_at:  String,
}

impl RawEvent {
  /// Map a row selected with
  /// [`EVENT_COLUMNS`](crate::schema::EVENT_COLUMNS).
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:    row.get(0)?,
      actor_id:    row.get(1)?,
      verb:        row.get(2)?,
      target_type: row.get(3)?,
      target_id:   row.get(4)?,
      created_at:  row.get(5)?,
    })
  }

  pub fn into_event(self) -> Result<ActivityEvent> {
    Ok(ActivityEvent {
      id:         EventId(self.event_id),
      actor:      SubjectId(self.actor_id),
      verb:       Verb::new(self.verb)?,
      target:     decode_target(self.target_type, self.target_id)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
