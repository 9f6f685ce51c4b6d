//! SQLite store of previously-seen plays.
//!
//! One row per (title, artist, album) triple. `position` is where the track
//! sat in the history on the last run; `max_position` is a high-water mark
//! that only ratchets upward, used to tell genuine re-plays apart from
//! positional churn. Rows for tracks that fell out of today's window are
//! deleted by the caller.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::history::PlayRecord;

#[derive(Debug, Clone)]
pub struct StoredPlay {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub position: i64,
    pub max_position: i64,
    pub first_time: bool,
}

impl StoredPlay {
    /// Key match is the exact, case-sensitive string triple.
    pub fn matches(&self, record: &PlayRecord) -> bool {
        self.title == record.title && self.artist == record.artist && self.album == record.album
    }
}

pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open history store at {}", path.display()))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS plays (
                title TEXT NOT NULL,
                artist TEXT NOT NULL,
                album TEXT NOT NULL,
                position INTEGER NOT NULL,
                max_position INTEGER,
                first_time INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (title, artist, album)
            );
            "#,
        )?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<StoredPlay>> {
        let mut stmt = self.conn.prepare(
            "SELECT title, artist, album, position, COALESCE(max_position, position), first_time
             FROM plays",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredPlay {
                title: row.get(0)?,
                artist: row.get(1)?,
                album: row.get(2)?,
                position: row.get(3)?,
                max_position: row.get(4)?,
                first_time: row.get(5)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Upsert by the (title, artist, album) key. The high-water mark never
    /// decreases, and the first-time flag set at insert is preserved on
    /// later updates.
    pub fn record_position(
        &self,
        record: &PlayRecord,
        position: i64,
        first_time: bool,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            r#"
            INSERT INTO plays (title, artist, album, position, max_position, first_time, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)
            ON CONFLICT(title, artist, album) DO UPDATE SET
                position = excluded.position,
                max_position = MAX(COALESCE(plays.max_position, plays.position), excluded.position),
                updated_at = excluded.updated_at
            "#,
            params![
                record.title,
                record.artist,
                record.album,
                position,
                first_time,
                now
            ],
        )?;
        Ok(())
    }

    pub fn remove(&self, title: &str, artist: &str, album: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM plays WHERE title = ?1 AND artist = ?2 AND album = ?3",
            params![title, artist, album],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> PlayRecord {
        PlayRecord {
            title: title.to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            played_at: Some("Today".to_string()),
        }
    }

    #[test]
    fn insert_then_read_back() {
        let store = HistoryStore::open_in_memory().expect("store should open");
        store
            .record_position(&record("A"), 3, true)
            .expect("insert should succeed");
        let rows = store.all().expect("read should succeed");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "A");
        assert_eq!(rows[0].position, 3);
        assert_eq!(rows[0].max_position, 3);
        assert!(rows[0].first_time);
    }

    #[test]
    fn max_position_only_ratchets_upward() {
        let store = HistoryStore::open_in_memory().expect("store should open");
        store.record_position(&record("A"), 5, false).expect("insert");
        store.record_position(&record("A"), 2, false).expect("update down");
        let rows = store.all().expect("read");
        assert_eq!(rows[0].position, 2);
        assert_eq!(rows[0].max_position, 5);

        store.record_position(&record("A"), 9, false).expect("update up");
        let rows = store.all().expect("read");
        assert_eq!(rows[0].position, 9);
        assert_eq!(rows[0].max_position, 9);
    }

    #[test]
    fn first_time_flag_survives_updates() {
        let store = HistoryStore::open_in_memory().expect("store should open");
        store.record_position(&record("A"), 1, true).expect("insert");
        store.record_position(&record("A"), 2, false).expect("update");
        let rows = store.all().expect("read");
        assert!(rows[0].first_time);
    }

    #[test]
    fn remove_deletes_exactly_one_key() {
        let store = HistoryStore::open_in_memory().expect("store should open");
        store.record_position(&record("A"), 1, false).expect("insert");
        store.record_position(&record("B"), 2, false).expect("insert");
        store.remove("A", "Artist", "Album").expect("delete");
        let rows = store.all().expect("read");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "B");
    }

    #[test]
    fn invariant_max_position_never_below_position() {
        let store = HistoryStore::open_in_memory().expect("store should open");
        for position in [4, 1, 7, 3] {
            store
                .record_position(&record("A"), position, false)
                .expect("upsert");
            let rows = store.all().expect("read");
            assert!(rows[0].max_position >= rows[0].position);
        }
    }

    #[test]
    fn stored_play_matches_on_exact_triple() {
        let row = StoredPlay {
            title: "A".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            position: 1,
            max_position: 1,
            first_time: false,
        };
        assert!(row.matches(&record("A")));
        assert!(!row.matches(&record("a")));
    }
}
