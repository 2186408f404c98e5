//! Client-local session marker store.
//!
//! One marker per (user, subtopic) records the attempt currently in
//! progress, so a fresh launch can detect an abandoned session. Markers are
//! written on every challenge load and removed on every clean terminal
//! transition. They are a hint, not an authority; the server-side session
//! lock is the source of truth.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result, params};

/// Marker row for one in-progress attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMarker {
  pub user_id: i64,
  pub subtopic_id: i64,
  pub challenge_id: i64,
  pub user_challenge_id: i64,
  pub status: String,
  pub start_time: DateTime<Utc>,
}

pub struct MarkerStore {
  conn: Connection,
}

impl MarkerStore {
  pub fn open(path: &std::path::Path) -> Result<Self> {
    let conn = Connection::open(path)?;
    Self::init_schema(&conn)?;
    Ok(Self { conn })
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    Self::init_schema(&conn)?;
    Ok(Self { conn })
  }

  fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
      r#"
      CREATE TABLE IF NOT EXISTS session_markers (
        user_id INTEGER NOT NULL,
        subtopic_id INTEGER NOT NULL,
        challenge_id INTEGER NOT NULL,
        user_challenge_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        start_time TEXT NOT NULL,
        PRIMARY KEY (user_id, subtopic_id)
      );
      "#,
    )
  }

  /// Upsert the marker for this (user, subtopic)
  pub fn put(&self, marker: &SessionMarker) -> Result<()> {
    self.conn.execute(
      r#"
      INSERT INTO session_markers (user_id, subtopic_id, challenge_id, user_challenge_id, status, start_time)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6)
      ON CONFLICT (user_id, subtopic_id) DO UPDATE SET
        challenge_id = excluded.challenge_id,
        user_challenge_id = excluded.user_challenge_id,
        status = excluded.status,
        start_time = excluded.start_time
      "#,
      params![
        marker.user_id,
        marker.subtopic_id,
        marker.challenge_id,
        marker.user_challenge_id,
        marker.status,
        marker.start_time.to_rfc3339(),
      ],
    )?;
    Ok(())
  }

  pub fn get(&self, user_id: i64, subtopic_id: i64) -> Result<Option<SessionMarker>> {
    self
      .conn
      .query_row(
        r#"
        SELECT user_id, subtopic_id, challenge_id, user_challenge_id, status, start_time
        FROM session_markers WHERE user_id = ?1 AND subtopic_id = ?2
        "#,
        params![user_id, subtopic_id],
        |row| {
          let start_time: String = row.get(5)?;
          Ok(SessionMarker {
            user_id: row.get(0)?,
            subtopic_id: row.get(1)?,
            challenge_id: row.get(2)?,
            user_challenge_id: row.get(3)?,
            status: row.get(4)?,
            start_time: DateTime::parse_from_rfc3339(&start_time)
              .map(|dt| dt.with_timezone(&Utc))
              .unwrap_or_else(|_| Utc::now()),
          })
        },
      )
      .optional()
  }

  pub fn remove(&self, user_id: i64, subtopic_id: i64) -> Result<()> {
    self.conn.execute(
      "DELETE FROM session_markers WHERE user_id = ?1 AND subtopic_id = ?2",
      params![user_id, subtopic_id],
    )?;
    Ok(())
  }
}
