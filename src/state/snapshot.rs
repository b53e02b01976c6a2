/// Persisted engine snapshot
///
/// The minimal, versionless state needed to resume the engine: current
/// theme and index, transition preferences, rotation settings and the
/// rolling metrics. Stored as a single JSON row in a small SQLite
/// database under the user's data directory:
/// - Linux: ~/.local/share/wallshift/wallshift.db
/// - macOS: ~/Library/Application Support/wallshift/wallshift.db
/// - Windows: %APPDATA%\wallshift\wallshift.db
///
/// Writes are debounced: callers save on every relevant mutation, the
/// store only touches disk when the debounce window has passed, and
/// `flush` lands whatever is still pending (called on session end).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::TransitionPrefs;
use crate::error::EngineError;
use crate::state::metrics::PerformanceMetrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub current_theme_id: Option<String>,
    pub current_index: usize,
    pub transition: TransitionPrefs,
    pub cycle_duration_ms: u64,
    pub auto_transition: bool,
    pub adaptive_quality: bool,
    pub last_interaction: DateTime<Utc>,
    pub metrics: PerformanceMetrics,
}

/// The snapshot store owns the SQLite connection and the debounce state
pub struct SnapshotStore {
    conn: Connection,
    db_path: PathBuf,
    debounce: Duration,
    last_write: Option<DateTime<Utc>>,
    pending: Option<EngineSnapshot>,
}

impl SnapshotStore {
    /// Open (or create) the store in the user's data directory
    pub fn open(debounce_ms: u64) -> Result<Self, EngineError> {
        let db_path = Self::default_db_path();
        Self::open_at(&db_path, debounce_ms)
    }

    /// Open (or create) the store at an explicit path
    pub fn open_at(db_path: &Path, debounce_ms: u64) -> Result<Self, EngineError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        info!("snapshot store opened at {}", db_path.display());

        let store = SnapshotStore {
            conn,
            db_path: db_path.to_path_buf(),
            debounce: Duration::milliseconds(debounce_ms as i64),
            last_write: None,
            pending: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests
    pub fn in_memory(debounce_ms: u64) -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        let store = SnapshotStore {
            conn,
            db_path: PathBuf::from(":memory:"),
            debounce: Duration::milliseconds(debounce_ms as i64),
            last_write: None,
            pending: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        path.push("wallshift");
        path.push("wallshift.db");
        path
    }

    fn init_schema(&self) -> Result<(), EngineError> {
        // Single-row table; the snapshot travels as one JSON blob
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS engine_state (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot_json   TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Record a snapshot, writing through only when the debounce window
    /// has elapsed. Returns true when the write hit the database.
    pub fn save(
        &mut self,
        snapshot: EngineSnapshot,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let due = match self.last_write {
            Some(last) => now - last >= self.debounce,
            None => true,
        };

        if !due {
            debug!("snapshot write debounced, holding pending copy");
            self.pending = Some(snapshot);
            return Ok(false);
        }

        self.write_row(&snapshot, now)?;
        self.last_write = Some(now);
        self.pending = None;
        Ok(true)
    }

    /// Land any debounced snapshot immediately
    pub fn flush(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if let Some(snapshot) = self.pending.take() {
            self.write_row(&snapshot, now)?;
            self.last_write = Some(now);
        }
        Ok(())
    }

    /// Load the last persisted snapshot, if any
    pub fn load(&self) -> Result<Option<EngineSnapshot>, EngineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT snapshot_json FROM engine_state WHERE id = 1")?;
        let mut rows = stmt.query([])?;

        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                let snapshot = serde_json::from_str(&json)?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    fn write_row(
        &self,
        snapshot: &EngineSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let json = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT INTO engine_state (id, snapshot_json, updated_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                snapshot_json = excluded.snapshot_json,
                updated_at = excluded.updated_at",
            rusqlite::params![json, now.timestamp_millis()],
        )?;
        debug!("snapshot persisted");
        Ok(())
    }

    /// Number of rows written so far (test observability)
    #[cfg(test)]
    fn updated_at(&self) -> Option<i64> {
        self.conn
            .query_row("SELECT updated_at FROM engine_state WHERE id = 1", [], |r| {
                r.get(0)
            })
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn snapshot(index: usize) -> EngineSnapshot {
        EngineSnapshot {
            current_theme_id: Some("nature".into()),
            current_index: index,
            transition: TransitionPrefs::default(),
            cycle_duration_ms: 30_000,
            auto_transition: true,
            adaptive_quality: true,
            last_interaction: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            metrics: PerformanceMetrics::default(),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let mut store = SnapshotStore::in_memory(0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let snap = snapshot(3);
        assert!(store.save(snap.clone(), now).unwrap());

        let restored = store.load().unwrap().unwrap();
        assert_eq!(restored, snap);
    }

    #[test]
    fn test_empty_store_loads_none() {
        let store = SnapshotStore::in_memory(0).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_writes_inside_window_are_debounced() {
        let mut store = SnapshotStore::in_memory(500).unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        assert!(store.save(snapshot(0), t0).unwrap());
        // 100 ms later: suppressed, held as pending
        let t1 = t0 + Duration::milliseconds(100);
        assert!(!store.save(snapshot(1), t1).unwrap());
        assert_eq!(store.load().unwrap().unwrap().current_index, 0);

        // Flush lands the held copy
        store.flush(t1).unwrap();
        assert_eq!(store.load().unwrap().unwrap().current_index, 1);
    }

    #[test]
    fn test_write_after_window_goes_through() {
        let mut store = SnapshotStore::in_memory(500).unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        store.save(snapshot(0), t0).unwrap();
        let t1 = t0 + Duration::milliseconds(600);
        assert!(store.save(snapshot(2), t1).unwrap());
        assert_eq!(store.load().unwrap().unwrap().current_index, 2);
        assert_eq!(store.updated_at(), Some(t1.timestamp_millis()));
    }
}
