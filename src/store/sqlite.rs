//! SQLite-backed outcome history
//!
//! One row per outcome, keyed by sequence index. Appends are single-row
//! inserts; a full rewrite runs inside one transaction so a crash leaves
//! either the old or the new history, never a mix.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::{info, warn};

use super::HistoryBackend;
use crate::models::Outcome;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS outcomes (
    sequence_index INTEGER PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    value INTEGER NOT NULL,
    received_at TEXT NOT NULL
);
"#;

pub struct SqliteHistory {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl SqliteHistory {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!("📊 Outcome database initialized at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: db_path.to_string(),
        })
    }
}

fn insert_outcome(conn: &Connection, outcome: &Outcome) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO outcomes (sequence_index, external_id, value, received_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            outcome.sequence_index as i64,
            &outcome.external_id,
            outcome.value as i64,
            outcome
                .received_at
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ],
    )
}

impl HistoryBackend for SqliteHistory {
    fn load(&self) -> Result<Vec<Outcome>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT sequence_index, external_id, value, received_at
             FROM outcomes ORDER BY sequence_index ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut outcomes = Vec::new();
        for row in rows {
            let (sequence_index, external_id, value, received_at) = row?;
            let received_at = DateTime::parse_from_rfc3339(&received_at)
                .with_context(|| format!("Bad timestamp for outcome {}", external_id))?
                .with_timezone(&Utc);
            outcomes.push(Outcome {
                value: value as u32,
                external_id,
                sequence_index: sequence_index as u64,
                received_at,
            });
        }
        Ok(outcomes)
    }

    fn record_append(&self, history: &[Outcome]) -> Result<()> {
        let Some(outcome) = history.last() else {
            return Ok(());
        };
        let conn = self.conn.lock();
        insert_outcome(&conn, outcome)
            .with_context(|| format!("Failed to insert outcome {}", outcome.external_id))?;
        Ok(())
    }

    fn save_all(&self, history: &[Outcome]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM outcomes", [])?;
        for outcome in history {
            insert_outcome(&tx, outcome)?;
        }
        tx.commit().context("Failed to commit history rewrite")?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}
