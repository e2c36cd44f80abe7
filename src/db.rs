use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{parse_review_count, parse_timestamp, Difficulty, ReviewableItem};
use crate::scheduler;

/// Storage operations the review flow depends on.
pub trait ReviewStore {
    /// Most recently added items first, at most `limit` of them.
    fn list_items(&self, limit: usize) -> Result<Vec<ReviewableItem>>;

    fn get_item(&self, id: i64) -> Result<Option<ReviewableItem>>;

    /// Returns false when no row with `id` exists.
    fn persist_review_state(
        &self,
        id: i64,
        times_reviewed: i64,
        last_reviewed: DateTime<Utc>,
    ) -> Result<bool>;
}

const SELECT_PROBLEM: &str =
    "SELECT id, text, difficulty, created_at, link, last_reviewed, times_reviewed FROM problems";

// Columns added after the first release, with their definitions
const MIGRATED_COLUMNS: [(&str, &str); 5] = [
    ("difficulty", "TEXT NOT NULL DEFAULT 'unknown'"),
    // Backfilled in migrate(); ALTER TABLE only accepts constant defaults
    ("created_at", "TEXT"),
    ("link", "TEXT"),
    ("last_reviewed", "TEXT"),
    ("times_reviewed", "INTEGER NOT NULL DEFAULT 0"),
];

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS problems (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                difficulty TEXT NOT NULL DEFAULT 'unknown',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                last_reviewed TEXT,
                times_reviewed INTEGER NOT NULL DEFAULT 0,
                link TEXT
            );
            "#,
        )?;

        self.migrate()
    }

    // Bring databases created by older versions up to the current columns
    fn migrate(&self) -> Result<()> {
        let existing = self.column_names("problems")?;

        for (column, definition) in MIGRATED_COLUMNS {
            if !existing.iter().any(|c| c == column) {
                info!(column, "adding missing column to problems");
                self.conn.execute_batch(&format!(
                    "ALTER TABLE problems ADD COLUMN {} {};",
                    column, definition
                ))?;
            }
        }

        self.conn.execute_batch(
            r#"
            UPDATE problems SET times_reviewed = 0 WHERE times_reviewed IS NULL;
            UPDATE problems SET difficulty = 'unknown' WHERE difficulty IS NULL;
            UPDATE problems SET created_at = datetime('now') WHERE created_at IS NULL;
            "#,
        )?;

        Ok(())
    }

    fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // Problem operations
    pub fn add_problem(&self, text: &str, difficulty: Difficulty, link: Option<&str>) -> Result<i64> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::EmptyText);
        }
        let link = link.map(str::trim).filter(|l| !l.is_empty());

        self.conn.execute(
            "INSERT INTO problems (text, difficulty, link) VALUES (?1, ?2, ?3)",
            params![text, difficulty.as_str(), link],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_problem(&self, id: i64) -> Result<Option<ReviewableItem>> {
        let mut stmt = self.conn.prepare(&format!("{} WHERE id = ?1", SELECT_PROBLEM))?;

        match stmt.query_row(params![id], read_problem) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_problems(&self, limit: usize) -> Result<Vec<ReviewableItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY id DESC LIMIT ?1", SELECT_PROBLEM))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], read_problem)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_problem(&self, id: i64) -> Result<bool> {
        if id <= 0 {
            return Ok(false);
        }

        let rows = self
            .conn
            .execute("DELETE FROM problems WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Removes every problem and restarts id numbering.
    pub fn delete_all_problems(&self) -> Result<usize> {
        let rows = self.conn.execute("DELETE FROM problems", [])?;
        self.conn
            .execute("DELETE FROM sqlite_sequence WHERE name = 'problems'", [])?;
        Ok(rows)
    }

    pub fn update_review_state(
        &self,
        id: i64,
        times_reviewed: i64,
        last_reviewed: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE problems SET times_reviewed = ?1, last_reviewed = ?2 WHERE id = ?3",
            params![times_reviewed, last_reviewed.to_rfc3339(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_stats(&self, now: DateTime<Utc>) -> Result<Stats> {
        let mut stmt = self.conn.prepare(SELECT_PROBLEM)?;
        let rows = stmt.query_map([], read_problem)?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Stats {
            total_problems: items.len() as i64,
            never_reviewed: items.iter().filter(|i| i.last_reviewed.is_none()).count() as i64,
            due_now: items.iter().filter(|i| scheduler::is_due(i, now)).count() as i64,
            total_reviews: items
                .iter()
                .map(|i| i.times_reviewed.max(0))
                .fold(0i64, |acc, n| acc.saturating_add(n)),
        })
    }
}

impl ReviewStore for Database {
    fn list_items(&self, limit: usize) -> Result<Vec<ReviewableItem>> {
        self.list_problems(limit)
    }

    fn get_item(&self, id: i64) -> Result<Option<ReviewableItem>> {
        self.get_problem(id)
    }

    fn persist_review_state(
        &self,
        id: i64,
        times_reviewed: i64,
        last_reviewed: DateTime<Utc>,
    ) -> Result<bool> {
        self.update_review_state(id, times_reviewed, last_reviewed)
    }
}

// Review history columns are read loosely: a bad value degrades to
// "0 reviews" / "never reviewed" instead of failing the whole batch
fn read_problem(row: &Row<'_>) -> rusqlite::Result<ReviewableItem> {
    let id: i64 = row.get(0)?;
    let difficulty: Option<String> = row.get(2)?;

    Ok(ReviewableItem {
        id,
        text: row.get(1)?,
        difficulty: difficulty
            .as_deref()
            .map(Difficulty::from_str)
            .unwrap_or(Difficulty::Unknown),
        created_at: value_to_text(row.get(3)?).unwrap_or_default(),
        link: row.get(4)?,
        last_reviewed: read_last_reviewed(id, row.get(5)?),
        times_reviewed: read_times_reviewed(id, row.get(6)?),
    })
}

fn read_times_reviewed(id: i64, value: Value) -> i64 {
    match value {
        Value::Integer(n) => n,
        Value::Real(f) if f.is_finite() => f as i64,
        Value::Text(s) => parse_review_count(&s),
        Value::Null => 0,
        other => {
            warn!(id, ?other, "unreadable times_reviewed, treating as 0");
            0
        }
    }
}

fn read_last_reviewed(id: i64, value: Value) -> Option<DateTime<Utc>> {
    let raw = value_to_text(value)?;
    let parsed = parse_timestamp(&raw);
    if parsed.is_none() {
        warn!(id, raw = %raw, "unparseable last_reviewed, treating as never reviewed");
    }
    parsed
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        Value::Integer(n) => Some(n.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub total_problems: i64,
    pub never_reviewed: i64,
    pub due_now: i64,
    pub total_reviews: i64,
}
