//! [`SqliteStore`], the SQLite implementation of [`RelationshipStore`] and
//! [`ActivityLog`].

use std::{collections::BTreeSet, path::Path, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior, types::Value};
use trellis_core::{
  activity::{ActivityEvent, EventId, EventPage, EventQuery, Order, Recorded, Verb},
  clock::{Clock, SystemClock},
  entity::{EntityRef, SubjectId},
  relation::{AddOutcome, RelationKind, RelationshipEdge, RemoveOutcome},
  store::{ActivityLog, RelationshipStore},
};

use crate::{
  Result,
  encode::{RawEvent, decode_dt, decode_target, encode_dt, encode_target},
  schema::{DEDUP_WITH_TARGET, DEDUP_WITHOUT_TARGET, EVENT_COLUMNS, SCHEMA},
};

/// Trailing window inside which identical actions collapse into one event.
pub const DEFAULT_DEDUP_WINDOW_SECS: i64 = 60;

// ─── Store ───────────────────────────────────────────────────────────────────

/// Relationship edges and activity events backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// funnel through one connection thread, so each `add`, `remove` and `record`
/// runs as one serialised transaction.
#[derive(Clone)]
pub struct SqliteStore {
  conn:         tokio_rusqlite::Connection,
  clock:        Arc<dyn Clock>,
  dedup_window: Duration,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      clock: Arc::new(SystemClock),
      dedup_window: Duration::seconds(DEFAULT_DEDUP_WINDOW_SECS),
    })
  }

  /// Measure event times and the dedup window against `clock`.
  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  pub fn with_dedup_window(mut self, window: Duration) -> Self {
    self.dedup_window = window;
    self
  }

  pub fn dedup_window(&self) -> Duration { self.dedup_window }

  /// Run a `SELECT COUNT(*)`-shaped statement.
  async fn count(&self, sql: &'static str, params: Vec<Value>) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(sql, rusqlite::params_from_iter(params), |r| {
          r.get(0)
        })?)
      })
      .await?;
    Ok(u64::try_from(n).unwrap_or_default())
  }
}

fn edge_key(
  kind: &RelationKind,
  from: SubjectId,
  to: &EntityRef,
) -> (String, i64, String, i64) {
  (kind.as_str().to_owned(), from.0, to.type_tag().to_owned(), to.id())
}

// ─── RelationshipStore impl ──────────────────────────────────────────────────

impl RelationshipStore for SqliteStore {
  type Error = crate::Error;

  async fn add<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
    to: &'a EntityRef,
  ) -> Result<AddOutcome> {
    let (kind_str, from_id, target_type, target_id) = edge_key(kind, from, to);
    let now_str = encode_dt(self.clock.now());

    // The unique key turns a racing duplicate into a no-op; `changes` tells
    // us which caller won.
    let (created, created_at) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
          "INSERT INTO edges (kind, from_id, target_type, target_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (kind, from_id, target_type, target_id) DO NOTHING",
          rusqlite::params![kind_str, from_id, target_type, target_id, now_str],
        )?;
        let created_at: String = tx.query_row(
          "SELECT created_at FROM edges
           WHERE kind = ?1 AND from_id = ?2 AND target_type = ?3 AND target_id = ?4",
          rusqlite::params![kind_str, from_id, target_type, target_id],
          |r| r.get(0),
        )?;
        tx.commit()?;
        Ok((inserted == 1, created_at))
      })
      .await?;

    Ok(AddOutcome {
      created,
      edge: RelationshipEdge {
        kind: kind.clone(),
        from,
        to: to.clone(),
        created_at: decode_dt(&created_at)?,
      },
    })
  }

  async fn remove<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
    to: &'a EntityRef,
  ) -> Result<RemoveOutcome> {
    let (kind_str, from_id, target_type, target_id) = edge_key(kind, from, to);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM edges
           WHERE kind = ?1 AND from_id = ?2 AND target_type = ?3 AND target_id = ?4",
          rusqlite::params![kind_str, from_id, target_type, target_id],
        )?)
      })
      .await?;

    Ok(RemoveOutcome { removed: deleted > 0 })
  }

  async fn exists_between<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
    to: &'a EntityRef,
  ) -> Result<bool> {
    let (kind_str, from_id, target_type, target_id) = edge_key(kind, from, to);

    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM edges
               WHERE kind = ?1 AND from_id = ?2 AND target_type = ?3 AND target_id = ?4",
              rusqlite::params![kind_str, from_id, target_type, target_id],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;

    Ok(exists)
  }

  async fn targets_of<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
  ) -> Result<BTreeSet<EntityRef>> {
    let kind_str = kind.as_str().to_owned();

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT target_type, target_id FROM edges
           WHERE kind = ?1 AND from_id = ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str, from.0], |r| {
            Ok((r.get(0)?, r.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(tag, id)| Ok(EntityRef::new(tag, id)?))
      .collect()
  }

  async fn sources_of<'a>(
    &'a self,
    kind: &'a RelationKind,
    to: &'a EntityRef,
  ) -> Result<Vec<SubjectId>> {
    let kind_str = kind.as_str().to_owned();
    let target_type = to.type_tag().to_owned();
    let target_id = to.id();

    let ids: Vec<i64> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT from_id FROM edges
           WHERE kind = ?1 AND target_type = ?2 AND target_id = ?3
           ORDER BY created_at DESC, edge_id DESC",
        )?;
        let ids = stmt
          .query_map(rusqlite::params![kind_str, target_type, target_id], |r| {
            r.get(0)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
      })
      .await?;

    Ok(ids.into_iter().map(SubjectId).collect())
  }

  async fn count_sources<'a>(
    &'a self,
    kind: &'a RelationKind,
    to: &'a EntityRef,
  ) -> Result<u64> {
    self
      .count(
        "SELECT COUNT(*) FROM edges
         WHERE kind = ?1 AND target_type = ?2 AND target_id = ?3",
        vec![
          Value::Text(kind.as_str().to_owned()),
          Value::Text(to.type_tag().to_owned()),
          Value::Integer(to.id()),
        ],
      )
      .await
  }

  async fn count_targets<'a>(
    &'a self,
    kind: &'a RelationKind,
    from: SubjectId,
  ) -> Result<u64> {
    self
      .count(
        "SELECT COUNT(*) FROM edges WHERE kind = ?1 AND from_id = ?2",
        vec![Value::Text(kind.as_str().to_owned()), Value::Integer(from.0)],
      )
      .await
  }
}

// ─── ActivityLog impl ────────────────────────────────────────────────────────

impl ActivityLog for SqliteStore {
  type Error = crate::Error;

  async fn record<'a>(
    &'a self,
    actor: SubjectId,
    verb: &'a Verb,
    target: Option<&'a EntityRef>,
  ) -> Result<Recorded> {
    let now = self.clock.now();
    let now_str = encode_dt(now);
    // A window reaching past the earliest representable instant covers
    // the whole log.
    let cutoff = now
      .checked_sub_signed(self.dedup_window)
      .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let cutoff_str = encode_dt(cutoff);
    let verb_str = verb.as_str().to_owned();
    let (target_type, target_id) = encode_target(target);

    let (raw, deduplicated) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let prior = match (&target_type, target_id) {
          (Some(tt), Some(tid)) => tx
            .query_row(
              DEDUP_WITH_TARGET,
              rusqlite::params![actor.0, verb_str, tt, tid, cutoff_str],
              RawEvent::from_row,
            )
            .optional()?,
          _ => tx
            .query_row(
              DEDUP_WITHOUT_TARGET,
              rusqlite::params![actor.0, verb_str, cutoff_str],
              RawEvent::from_row,
            )
            .optional()?,
        };
        if let Some(prior) = prior {
          tx.commit()?;
          return Ok((prior, true));
        }

        // Never stamp an event earlier than the newest one, so id order and
        // time order agree even if the clock steps back.
        let latest: Option<String> = tx
          .query_row(
            "SELECT created_at FROM events ORDER BY event_id DESC LIMIT 1",
            [],
            |r| r.get(0),
          )
          .optional()?;
        let created_at = match latest {
          Some(latest) if latest > now_str => latest,
          _ => now_str,
        };

        tx.execute(
          "INSERT INTO events (actor_id, verb, target_type, target_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![actor.0, verb_str, target_type, target_id, created_at],
        )?;
        let event_id = tx.last_insert_rowid();
        tx.commit()?;

        Ok((
          RawEvent {
            event_id,
            actor_id: actor.0,
            verb: verb_str,
            target_type,
            target_id,
            created_at,
          },
          false,
        ))
      })
      .await?;

    let event = raw.into_event()?;
    if deduplicated {
      tracing::debug!(event_id = %event.id, actor = %actor, verb = %verb, "duplicate action collapsed");
    } else {
      tracing::debug!(event_id = %event.id, actor = %actor, verb = %verb, "activity recorded");
    }
    Ok(Recorded { event, deduplicated })
  }

  async fn get(&self, id: EventId) -> Result<Option<ActivityEvent>> {
    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?1"),
              rusqlite::params![id.0],
              RawEvent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEvent::into_event).transpose()
  }

  async fn page<'a>(&'a self, query: &'a EventQuery) -> Result<EventPage> {
    query.validate()?;
    if !query.is_satisfiable() {
      return Ok(EventPage::default());
    }

    let limit = query.limit;
    let PageSql { sql, params, staged } = page_sql(query);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (table, ids) in &staged {
          tx.execute_batch(&format!(
            "CREATE TEMP TABLE IF NOT EXISTS {table} (actor_id INTEGER PRIMARY KEY);
             DELETE FROM temp.{table};"
          ))?;
          let mut insert = tx
            .prepare(&format!("INSERT INTO temp.{table} (actor_id) VALUES (?1)"))?;
          for id in ids {
            insert.execute(rusqlite::params![id])?;
          }
        }

        let rows = {
          let mut stmt = tx.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params_from_iter(params), RawEvent::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        for (table, _) in &staged {
          tx.execute(&format!("DELETE FROM temp.{table}"), [])?;
        }
        tx.commit()?;
        Ok(rows)
      })
      .await?;

    let events = raws
      .into_iter()
      .map(RawEvent::into_event)
      .collect::<Result<Vec<_>>>()?;
    Ok(EventPage::from_rows(events, limit))
  }
}

/// Actor sets above this size go through a temp table rather than one `?`
/// each. SQLite caps a statement at 32766 variables.
const INLINE_ACTOR_LIMIT: usize = 500;

/// A page query ready to run.
struct PageSql {
  sql:    String,
  params: Vec<Value>,
  /// Temp tables to fill with actor ids before running `sql`.
  staged: Vec<(&'static str, Vec<i64>)>,
}

/// `actor_id <op> (...)`, inline for small sets and staged otherwise.
fn actor_condition(
  op: &str,
  table: &'static str,
  actors: &BTreeSet<SubjectId>,
  params: &mut Vec<Value>,
  staged: &mut Vec<(&'static str, Vec<i64>)>,
) -> String {
  if actors.len() > INLINE_ACTOR_LIMIT {
    staged.push((table, actors.iter().map(|a| a.0).collect()));
    format!("actor_id {op} (SELECT actor_id FROM temp.{table})")
  } else {
    params.extend(actors.iter().map(|a| Value::Integer(a.0)));
    format!("actor_id {op} ({})", vec!["?"; actors.len()].join(", "))
  }
}

/// Build the `SELECT` for an [`EventQuery`] with positional parameters.
fn page_sql(query: &EventQuery) -> PageSql {
  let mut conds: Vec<String> = Vec::new();
  let mut params: Vec<Value> = Vec::new();
  let mut staged = Vec::new();

  if let Some(actors) = &query.actors {
    conds.push(actor_condition(
      "IN",
      "page_actors",
      actors,
      &mut params,
      &mut staged,
    ));
  }
  if !query.excluded_actors.is_empty() {
    conds.push(actor_condition(
      "NOT IN",
      "page_excluded_actors",
      &query.excluded_actors,
      &mut params,
      &mut staged,
    ));
  }
  if let Some(verb) = &query.verb {
    conds.push("verb = ?".into());
    params.push(Value::Text(verb.as_str().to_owned()));
  }
  if let Some(target) = &query.target {
    conds.push("target_type = ? AND target_id = ?".into());
    params.push(Value::Text(target.type_tag().to_owned()));
    params.push(Value::Integer(target.id()));
  }
  if let Some(since) = query.since {
    conds.push("created_at >= ?".into());
    params.push(Value::Text(encode_dt(since)));
  }
  if let Some(before) = query.before {
    conds.push("event_id < ?".into());
    params.push(Value::Integer(before.0));
  }
  if let Some(after) = query.after {
    conds.push("event_id > ?".into());
    params.push(Value::Integer(after.0));
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };
  let direction = match query.order {
    Order::NewestFirst => "DESC",
    Order::OldestFirst => "ASC",
  };
  params.push(Value::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));

  let sql = format!(
    "SELECT {EVENT_COLUMNS} FROM events
     {where_clause}
     ORDER BY event_id {direction}
     LIMIT ?"
  );
  PageSql { sql, params, staged }
}
