mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

use crate::models::*;

const CHORE_COLUMNS: &str = "id, family_code, title, assigned_to, status, photo_url, \
                             completed_by, created_at, completed_at";

/// SQLite-backed storage for the `chores` collection.
///
/// Columns are nullable on purpose: the collection is schema-less, and rows
/// are handed out as [`ChoreDocument`]s carrying only the fields that are set.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        let applied = schema::run_migrations(&conn)?;
        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "Chore database schema updated");
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    // ============================================================
    // Chore operations
    // ============================================================

    /// All chores of a family, newest first. Ties on `created_at` keep
    /// insertion order (latest insert first).
    pub fn get_family_chores(&self, family_code: &str) -> Result<Vec<ChoreDocument>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHORE_COLUMNS} FROM chores
             WHERE family_code = ?
             ORDER BY created_at DESC, seq DESC"
        ))?;

        let chores = stmt
            .query_map([family_code], row_to_document)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(chores)
    }

    pub fn get_chore(&self, id: &str) -> Result<Option<ChoreDocument>> {
        let conn = self.lock()?;
        let doc = conn
            .query_row(
                &format!("SELECT {CHORE_COLUMNS} FROM chores WHERE id = ?"),
                [id],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    /// Insert a new pending chore stamped with the current time.
    pub fn create_chore(&self, input: CreateChoreInput) -> Result<ChoreDocument> {
        let input = input.normalized().map_err(|e| anyhow::anyhow!(e))?;
        let conn = self.lock()?;
        let id = Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());

        conn.execute(
            "INSERT INTO chores (id, family_code, title, assigned_to, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                &id,
                &input.family_code,
                &input.title,
                &input.assigned_to,
                ChoreStatus::Pending.as_str(),
                &now,
            ),
        )?;

        Ok(ChoreDocument::new(id)
            .with(field::FAMILY_CODE, input.family_code)
            .with(field::TITLE, input.title)
            .with(field::ASSIGNED_TO, input.assigned_to)
            .with(field::STATUS, ChoreStatus::Pending.as_str())
            .with(field::CREATED_AT, now))
    }

    /// Merge the fields present in `patch` into an existing chore. A
    /// completed chore stays completed whatever the patch says.
    ///
    /// Returns `None` when no chore has this id.
    pub fn update_chore(&self, id: &str, patch: &ChorePatch) -> Result<Option<ChoreDocument>> {
        {
            let conn = self.lock()?;
            let rows = conn.execute(
                "UPDATE chores SET
                    title = COALESCE(?, title),
                    assigned_to = COALESCE(?, assigned_to),
                    status = CASE WHEN status = 'completed' THEN status
                                  ELSE COALESCE(?, status) END,
                    photo_url = COALESCE(?, photo_url),
                    completed_by = COALESCE(?, completed_by),
                    completed_at = COALESCE(?, completed_at)
                 WHERE id = ?",
                (
                    &patch.title,
                    &patch.assigned_to,
                    patch.status.map(|s| s.as_str()),
                    &patch.photo_url,
                    &patch.completed_by,
                    patch.completed_at.map(format_timestamp),
                    id,
                ),
            )?;
            if rows == 0 {
                return Ok(None);
            }
        }

        self.get_chore(id)
    }

    /// Write a record verbatim, replacing any record with the same id.
    /// Unlike [`Database::create_chore`] nothing is validated or stamped, so
    /// this can seed records with missing fields. Only string fields are
    /// kept; anything else is dropped, as the columns are text.
    pub fn put_document(&self, doc: &ChoreDocument) -> Result<()> {
        let conn = self.lock()?;
        let text = |key: &str| doc.fields.get(key).and_then(Value::as_str).map(str::to_string);

        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO chores ({CHORE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            rusqlite::params![
                &doc.id,
                text(field::FAMILY_CODE),
                text(field::TITLE),
                text(field::ASSIGNED_TO),
                text(field::STATUS),
                text(field::PHOTO_URL),
                text(field::COMPLETED_BY),
                text(field::CREATED_AT),
                text(field::COMPLETED_AT),
            ],
        )?;
        Ok(())
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<ChoreDocument> {
    let mut doc = ChoreDocument::new(row.get::<_, String>(0)?);
    let columns = [
        (1, field::FAMILY_CODE),
        (2, field::TITLE),
        (3, field::ASSIGNED_TO),
        (4, field::STATUS),
        (5, field::PHOTO_URL),
        (6, field::COMPLETED_BY),
        (7, field::CREATED_AT),
        (8, field::COMPLETED_AT),
    ];
    for (idx, key) in columns {
        if let Some(value) = row.get::<_, Option<String>>(idx)? {
            doc.fields.insert(key.to_string(), Value::String(value));
        }
    }
    Ok(doc)
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
