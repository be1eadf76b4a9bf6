//! Turn history storage using SQLite.
//!
//! Every answered prompt is recorded with the stage that answered it and how
//! long it took, so the chat front-end can show recent turns and statistics.

use rusqlite::{params, Connection, Result};
use std::path::Path;

use reply_engine::Reply;

/// One recorded prompt and its reply.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub id: i64,
    pub timestamp: String,
    pub prompt: String,
    pub reply: String,
    pub mode: String,
    pub latency_ms: i64,
}

/// SQLite-backed turn history.
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open (or create) the history database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::init(Connection::open(db_path)?)
    }

    /// A history that lives only as long as the process.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                prompt TEXT NOT NULL,
                reply TEXT NOT NULL,
                mode TEXT NOT NULL,
                latency_ms INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Store an answered turn, returning its row id.
    pub fn record_turn(&self, prompt: &str, reply: &Reply) -> Result<i64> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let latency_ms = i64::try_from(reply.latency.as_millis()).unwrap_or(i64::MAX);
        self.conn.execute(
            "INSERT INTO turns (timestamp, prompt, reply, mode, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![timestamp, prompt, reply.text, reply.mode.as_str(), latency_ms],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The last `limit` turns, oldest first.
    pub fn recent_turns(&self, limit: u32) -> Result<Vec<HistoryTurn>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, prompt, reply, mode, latency_ms
             FROM turns
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(HistoryTurn {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                prompt: row.get(2)?,
                reply: row.get(3)?,
                mode: row.get(4)?,
                latency_ms: row.get(5)?,
            })
        })?;
        let mut turns = rows.collect::<Result<Vec<_>>>()?;
        turns.reverse();
        Ok(turns)
    }

    pub fn turn_count(&self) -> Result<i64> {
        self.conn.query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))
    }

    /// Number of turns answered by each mode, most frequent first.
    pub fn mode_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT mode, COUNT(*) AS n FROM turns GROUP BY mode ORDER BY n DESC, mode ASC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    /// Delete every recorded turn.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM turns", [])?;
        Ok(())
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        let (total_turns, average_latency_ms): (i64, f64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(AVG(latency_ms), 0.0) FROM turns",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let db_size_bytes = match self.conn.path() {
            Some(path) if !path.is_empty() => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            _ => 0,
        };
        Ok(HistoryStats {
            total_turns,
            average_latency_ms,
            db_size_bytes,
        })
    }
}

#[derive(Debug)]
pub struct HistoryStats {
    pub total_turns: i64,
    pub average_latency_ms: f64,
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reply_engine::Mode;
    use std::time::Duration;

    fn reply(text: &str, mode: Mode, ms: u64) -> Reply {
        Reply {
            text: text.to_string(),
            mode,
            latency: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_store_starts_empty() {
        let store = HistoryStore::in_memory().unwrap();
        assert_eq!(store.turn_count().unwrap(), 0);
        assert!(store.recent_turns(5).unwrap().is_empty());
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_turns, 0);
        assert_eq!(stats.average_latency_ms, 0.0);
    }

    #[test]
    fn test_record_and_retrieve_turn() {
        let store = HistoryStore::in_memory().unwrap();
        let id = store.record_turn("Hello", &reply("Hi there!", Mode::Fallback, 3)).unwrap();
        assert!(id > 0);

        let turns = store.recent_turns(1).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].prompt, "Hello");
        assert_eq!(turns[0].reply, "Hi there!");
        assert_eq!(turns[0].mode, "fallback");
        assert_eq!(turns[0].latency_ms, 3);
    }

    #[test]
    fn test_recent_turns_are_chronological() {
        let store = HistoryStore::in_memory().unwrap();
        store.record_turn("First", &reply("1", Mode::Memory, 1)).unwrap();
        store.record_turn("Second", &reply("2", Mode::Ngram, 2)).unwrap();
        store.record_turn("Third", &reply("3", Mode::Ngram, 6)).unwrap();

        let all = store.recent_turns(10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].prompt, "First");
        assert_eq!(all[2].prompt, "Third");

        let recent = store.recent_turns(2).unwrap();
        assert_eq!(recent[0].prompt, "Second");
        assert_eq!(recent[1].prompt, "Third");

        assert_eq!(
            store.mode_counts().unwrap(),
            vec![("ngram".to_string(), 2), ("memory".to_string(), 1)]
        );
        assert_eq!(store.stats().unwrap().average_latency_ms, 3.0);

        store.clear().unwrap();
        assert_eq!(store.turn_count().unwrap(), 0);
    }
}
