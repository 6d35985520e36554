//! Durable insight store over the `wisdom` table.
//!
//! [`MemoryStore`] serializes every operation through one connection mutex, so a
//! lookup never observes a half-written entry and concurrent inserts to the same
//! fingerprint resolve last-writer-wins. Mutations commit a transaction before
//! returning; with `synchronous = FULL` (see [`crate::db::open_database`]) a
//! returned `Ok` is on disk.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::memory::types::{Citation, WisdomEntry};

#[derive(Debug, Error)]
pub enum MemoryError {
    /// A stored row violates the entry invariants. Not recoverable by retrying.
    #[error("memory store corrupt at fingerprint {fingerprint:?}: {reason}")]
    Corrupt { fingerprint: String, reason: String },

    #[error("memory storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to encode citations: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("memory store unavailable: {0}")]
    Unavailable(String),
}

impl MemoryError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

/// Raw column values, validated into a [`WisdomEntry`] by [`WisdomRow::into_entry`].
struct WisdomRow {
    fingerprint: String,
    question: String,
    answer: String,
    citations: String,
    created_at: String,
    hit_count: i64,
}

impl WisdomRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fingerprint: row.get(0)?,
            question: row.get(1)?,
            answer: row.get(2)?,
            citations: row.get(3)?,
            created_at: row.get(4)?,
            hit_count: row.get(5)?,
        })
    }

    fn into_entry(self) -> MemoryResult<WisdomEntry> {
        let corrupt = |reason: String| MemoryError::Corrupt {
            fingerprint: self.fingerprint.clone(),
            reason,
        };

        let citations: Vec<Citation> = serde_json::from_str(&self.citations)
            .map_err(|e| corrupt(format!("unreadable citations: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt(format!("bad created_at {:?}: {e}", self.created_at)))?
            .with_timezone(&Utc);
        let hit_count = u32::try_from(self.hit_count)
            .map_err(|_| corrupt(format!("hit_count out of range: {}", self.hit_count)))?;
        if self.answer.trim().is_empty() {
            return Err(corrupt("empty answer".into()));
        }

        Ok(WisdomEntry {
            fingerprint: self.fingerprint,
            original_question: self.question,
            answer_text: self.answer,
            citations,
            created_at,
            hit_count,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT fingerprint, question, answer, citations, created_at, hit_count FROM wisdom";

#[derive(Clone)]
pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl MemoryStore {
    /// Wrap a connection shared with other components (e.g. the retriever).
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> MemoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MemoryError::Unavailable(format!("db lock poisoned: {e}")))
    }

    pub fn lookup(&self, fingerprint: &str) -> MemoryResult<Option<WisdomEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE fingerprint = ?1"),
                params![fingerprint],
                WisdomRow::from_row,
            )
            .optional()?;
        row.map(WisdomRow::into_entry).transpose()
    }

    /// Insert or overwrite the entry for `entry.fingerprint`.
    pub fn insert(&self, entry: &WisdomEntry) -> MemoryResult<()> {
        let citations = serde_json::to_string(&entry.citations)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO wisdom (fingerprint, question, answer, citations, created_at, hit_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(fingerprint) DO UPDATE SET \
               question = excluded.question, answer = excluded.answer, \
               citations = excluded.citations, created_at = excluded.created_at, \
               hit_count = excluded.hit_count",
            params![
                entry.fingerprint,
                entry.original_question,
                entry.answer_text,
                citations,
                entry.created_at.to_rfc3339(),
                entry.hit_count,
            ],
        )?;
        write_audit_log(
            &tx,
            "insert",
            Some(&entry.fingerprint),
            Some(&serde_json::json!({"citations": entry.citations.len()})),
        )?;

        tx.commit()?;
        tracing::debug!(fingerprint = %entry.fingerprint, "insight stored");
        Ok(())
    }

    /// Increment the replay counter. Returns the new count, or `None` if the
    /// fingerprint is not stored.
    pub fn record_hit(&self, fingerprint: &str) -> MemoryResult<Option<u32>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let count: Option<i64> = tx
            .query_row(
                "UPDATE wisdom SET hit_count = hit_count + 1 WHERE fingerprint = ?1 RETURNING hit_count",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        if count.is_some() {
            write_audit_log(&tx, "hit", Some(fingerprint), None)?;
        }

        tx.commit()?;
        Ok(count.map(|c| c.clamp(0, u32::MAX as i64) as u32))
    }

    pub fn count(&self) -> MemoryResult<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM wisdom", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> MemoryResult<Vec<WisdomEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at, fingerprint"))?;
        let rows = stmt
            .query_map([], WisdomRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(WisdomRow::into_entry).collect()
    }

    /// Irreversibly delete every entry. Returns the number removed.
    pub fn clear(&self) -> MemoryResult<u64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM wisdom", [])? as u64;
        write_audit_log(
            &tx,
            "clear",
            None,
            Some(&serde_json::json!({"removed": removed})),
        )?;
        tx.commit()?;
        tracing::info!(removed, "insight memory cleared");
        Ok(removed)
    }
}

/// Write an entry to the wisdom_log audit table.
fn write_audit_log(
    conn: &Connection,
    operation: &str,
    fingerprint: Option<&str>,
    details: Option<&serde_json::Value>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO wisdom_log (operation, fingerprint, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            operation,
            fingerprint,
            details.map(|d| d.to_string()),
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> MemoryStore {
        let conn = crate::db::open_memory_database().unwrap();
        MemoryStore::new(Arc::new(Mutex::new(conn)))
    }

    fn citation(uid: &str, range: &str) -> Citation {
        Citation {
            sutta_uid: uid.into(),
            title: "Title".into(),
            segment_range: range.into(),
            text_snippet: "snippet".into(),
            score: 0.5,
        }
    }

    #[test]
    fn insert_then_lookup() {
        let store = test_store();
        let entry = WisdomEntry::new(
            "what is dukkha",
            "What is dukkha?",
            "Dukkha is suffering.",
            vec![citation("sn56.11", "sn56.11:5.1-5.4")],
        );
        store.insert(&entry).unwrap();

        let found = store.lookup("what is dukkha").unwrap().unwrap();
        assert_eq!(found.answer_text, "Dukkha is suffering.");
        assert_eq!(found.citations, entry.citations);
        assert_eq!(found.hit_count, 0);
        assert!(store.lookup("something else").unwrap().is_none());
    }

    #[test]
    fn insert_overwrites_same_fingerprint() {
        let store = test_store();
        store
            .insert(&WisdomEntry::new("fp", "Q?", "first", vec![]))
            .unwrap();
        store
            .insert(&WisdomEntry::new("fp", "Q?", "second", vec![]))
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.lookup("fp").unwrap().unwrap().answer_text, "second");
    }

    #[test]
    fn record_hit_increments() {
        let store = test_store();
        store.insert(&WisdomEntry::new("fp", "Q", "A", vec![])).unwrap();
        assert_eq!(store.record_hit("fp").unwrap(), Some(1));
        assert_eq!(store.record_hit("fp").unwrap(), Some(2));
        assert_eq!(store.record_hit("missing").unwrap(), None);
        assert_eq!(store.lookup("fp").unwrap().unwrap().hit_count, 2);
    }

    #[test]
    fn clear_empties_store_and_logs() {
        let store = test_store();
        store.insert(&WisdomEntry::new("a", "Q", "A", vec![])).unwrap();
        store.insert(&WisdomEntry::new("b", "Q", "A", vec![])).unwrap();
        assert_eq!(store.clear().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);

        let conn = store.conn.lock().unwrap();
        let clears: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM wisdom_log WHERE operation = 'clear'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(clears, 1);
    }

    #[test]
    fn unreadable_citations_are_reported_as_corruption() {
        let store = test_store();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO wisdom (fingerprint, question, answer, citations, created_at) \
                 VALUES ('fp', 'Q', 'A', 'not json', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        }
        let err = store.lookup("fp").unwrap_err();
        assert!(err.is_corruption(), "unexpected error: {err}");
    }

    #[test]
    fn entries_are_ordered_oldest_first() {
        let store = test_store();
        let mut older = WisdomEntry::new("old", "Q1", "A1", vec![]);
        older.created_at = DateTime::parse_from_rfc3339("2023-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        store.insert(&WisdomEntry::new("new", "Q2", "A2", vec![])).unwrap();
        store.insert(&older).unwrap();

        let fingerprints: Vec<String> = store
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.fingerprint)
            .collect();
        assert_eq!(fingerprints, vec!["old".to_string(), "new".to_string()]);
    }
}
