//! SQLite-based persistent storage for vocabulary entries

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{is_valid_pattern, LetterEntry};
use crate::types::Level;

/// SQLite-based letter store
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct SqliteLetterStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLetterStore {
    /// Open (or create) the store at the given path
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::init_schema(&conn)?;
        info!("Letter store opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a store that lives only as long as this handle
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS letter_table (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                level INTEGER NOT NULL CHECK (level BETWEEN 1 AND 3),
                text TEXT NOT NULL,
                braille_pattern TEXT NOT NULL
            );

            -- One row per level once its vocabulary has been loaded
            CREATE TABLE IF NOT EXISTS seed_state (
                level INTEGER PRIMARY KEY,
                seeded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_letter_level ON letter_table(level);
            CREATE INDEX IF NOT EXISTS idx_letter_text ON letter_table(text);
        "#)?;

        Ok(())
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<LetterEntry> {
        let level: i64 = row.get(1)?;
        let level = Level::try_from(level).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Integer,
                e.into(),
            )
        })?;

        Ok(LetterEntry {
            id: Some(row.get(0)?),
            level,
            text: row.get(2)?,
            braille_pattern: row.get(3)?,
        })
    }

    /// All entries for a level, empty when none exist
    pub async fn get_by_level(&self, level: Level) -> Result<Vec<LetterEntry>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT id, level, text, braille_pattern FROM letter_table WHERE level = ?1"
        )?;

        let entries = stmt
            .query_map(params![level.as_i64()], Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Loaded {} entries for level {}", entries.len(), level);
        Ok(entries)
    }

    /// First entry (lowest id) whose text matches exactly
    pub async fn get_by_text(&self, text: &str) -> Result<Option<LetterEntry>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT id, level, text, braille_pattern FROM letter_table
             WHERE text = ?1 ORDER BY id ASC LIMIT 1"
        )?;

        let entry = stmt.query_row(params![text], Self::row_to_entry).optional()?;
        Ok(entry)
    }

    /// Bulk insert; a colliding primary key overwrites the existing row
    pub async fn insert_all(&self, entries: &[LetterEntry]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        Self::insert_entries(&tx, entries)?;
        tx.commit()?;

        debug!("Inserted {} entries", entries.len());
        Ok(())
    }

    fn insert_entries(conn: &Connection, entries: &[LetterEntry]) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| !is_valid_pattern(&e.braille_pattern)) {
            bail!(
                "Invalid braille pattern '{}' for '{}': only '0' and '1' are allowed",
                bad.braille_pattern,
                bad.text
            );
        }

        let mut stmt = conn.prepare_cached(
            r#"INSERT OR REPLACE INTO letter_table (id, level, text, braille_pattern)
               VALUES (?1, ?2, ?3, ?4)"#
        )?;

        for entry in entries {
            stmt.execute(params![
                entry.id,
                entry.level.as_i64(),
                entry.text,
                entry.braille_pattern,
            ])?;
        }

        Ok(())
    }

    /// Insert `entries` for `level` unless that level was already seeded or
    /// holds rows. The check and the insert share one immediate transaction.
    ///
    /// Returns the number of rows inserted (0 when skipped).
    pub async fn insert_level_if_absent(&self, level: Level, entries: &[LetterEntry]) -> Result<usize> {
        if let Some(stray) = entries.iter().find(|e| e.level != level) {
            bail!("Entry '{}' belongs to level {}, not {}", stray.text, stray.level, level);
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let seeded: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM seed_state WHERE level = ?1)
                     OR EXISTS(SELECT 1 FROM letter_table WHERE level = ?1)",
                params![level.as_i64()],
                |row| row.get(0),
            )?;

        if seeded {
            return Ok(0);
        }

        Self::insert_entries(&tx, entries)?;
        tx.execute(
            "INSERT OR REPLACE INTO seed_state (level, seeded_at) VALUES (?1, ?2)",
            params![level.as_i64(), Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(entries.len())
    }

    /// Number of rows stored for a level
    pub async fn count_by_level(&self, level: Level) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM letter_table WHERE level = ?1",
            params![level.as_i64()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Row counts for every level
    pub async fn stats(&self) -> Result<LetterStats> {
        let mut per_level = Vec::with_capacity(Level::ALL.len());
        for level in Level::ALL {
            per_level.push((level, self.count_by_level(level).await?));
        }

        let total = per_level.iter().map(|(_, n)| n).sum();
        Ok(LetterStats { per_level, total })
    }
}

/// Letter store statistics
#[derive(Debug, Clone)]
pub struct LetterStats {
    pub per_level: Vec<(Level, usize)>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_get_by_level_empty() {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        let entries = store.get_by_level(Level::Syllables).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_insert_and_query_by_level() {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        store
            .insert_all(&[
                LetterEntry::new(Level::Symbols, "ㄱ", "111011"),
                LetterEntry::new(Level::Symbols, "ㄴ", "011011"),
                LetterEntry::new(Level::Syllables, "가", "111011001110"),
            ])
            .await
            .unwrap();

        let level1 = store.get_by_level(Level::Symbols).await.unwrap();
        assert_eq!(level1.len(), 2);
        assert!(level1.iter().all(|e| e.level == Level::Symbols));
        assert!(level1.iter().all(|e| e.id.is_some()));

        assert_eq!(store.count_by_level(Level::Syllables).await.unwrap(), 1);
        assert_eq!(store.count_by_level(Level::Words).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_replaces_on_primary_key() {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        store
            .insert_all(&[LetterEntry::new(Level::Symbols, "ㄱ", "111011").with_id(7)])
            .await
            .unwrap();
        store
            .insert_all(&[LetterEntry::new(Level::Symbols, "ㄷ", "101011").with_id(7)])
            .await
            .unwrap();

        let entries = store.get_by_level(Level::Symbols).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, Some(7));
        assert_eq!(entries[0].text, "ㄷ");
        assert_eq!(entries[0].braille_pattern, "101011");
    }

    #[tokio::test]
    async fn test_get_by_text_first_match_wins() {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        store
            .insert_all(&[
                LetterEntry::new(Level::Syllables, "가", "111011001110"),
                LetterEntry::new(Level::Words, "가", "001010"),
            ])
            .await
            .unwrap();

        let found = store.get_by_text("가").await.unwrap().unwrap();
        assert_eq!(found.level, Level::Syllables);
        assert_eq!(found.braille_pattern, "111011001110");

        assert!(store.get_by_text("없음").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_pattern() {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        let result = store
            .insert_all(&[
                LetterEntry::new(Level::Symbols, "ㄱ", "111011"),
                LetterEntry::new(Level::Symbols, "ㄴ", "01x011"),
            ])
            .await;
        assert!(result.is_err());

        // Nothing from the rejected batch is written
        assert_eq!(store.count_by_level(Level::Symbols).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_level_if_absent_runs_once() {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        let entries = vec![LetterEntry::new(Level::Words, "것", "111000100011")];

        assert_eq!(store.insert_level_if_absent(Level::Words, &entries).await.unwrap(), 1);
        assert_eq!(store.insert_level_if_absent(Level::Words, &entries).await.unwrap(), 0);
        assert_eq!(store.count_by_level(Level::Words).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_level_if_absent_rejects_mixed_levels() {
        let store = SqliteLetterStore::open_in_memory().unwrap();
        let entries = vec![LetterEntry::new(Level::Symbols, "ㄱ", "111011")];
        assert!(store.insert_level_if_absent(Level::Words, &entries).await.is_err());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("braille.db");

        {
            let store = SqliteLetterStore::open(&db_path).await.unwrap();
            store
                .insert_all(&[LetterEntry::new(Level::Symbols, "ㅁ", "011101")])
                .await
                .unwrap();
        }

        let store = SqliteLetterStore::open(&db_path).await.unwrap();
        let found = store.get_by_text("ㅁ").await.unwrap();
        assert_eq!(found.map(|e| e.braille_pattern), Some("011101".to_string()));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 1);
    }
}
