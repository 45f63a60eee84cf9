use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::app_dirs::AppDirs;
use crate::config::Modality;
use crate::error::{GameError, Result};

/// Summary of one finished session, appended to the history log
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub finished_at: DateTime<Local>,
    pub modality: Modality,
    pub n_back: usize,
    pub event_count: usize,
    pub events_presented: usize,
    pub score: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub misses: u32,
    pub cancelled: bool,
}

/// Persistence collaborator for the high score. Calls are best-effort from the
/// engine's point of view: failures are logged and ignored.
pub trait HighScoreStore: Send + Sync + 'static {
    fn read(&self) -> Result<u32>;
    fn write(&self, score: u32) -> Result<()>;

    fn record_session(&self, _record: &SessionRecord) -> Result<()> {
        Ok(())
    }
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS high_score (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        score INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS session_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        finished_at TEXT NOT NULL,
        modality TEXT NOT NULL,
        n_back INTEGER NOT NULL,
        event_count INTEGER NOT NULL,
        events_presented INTEGER NOT NULL,
        score INTEGER NOT NULL,
        correct INTEGER NOT NULL,
        incorrect INTEGER NOT NULL,
        misses INTEGER NOT NULL,
        cancelled BOOLEAN NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_session_history_finished_at ON session_history(finished_at);
"#;

/// SQLite-backed store holding the high score and the session history
#[derive(Debug)]
pub struct SqliteHighScoreStore {
    conn: Mutex<Connection>,
}

impl SqliteHighScoreStore {
    /// Open the store at the default state location
    pub fn new() -> Result<Self> {
        let path = Self::default_path();
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn default_path() -> PathBuf {
        AppDirs::db_path().unwrap_or_else(|| PathBuf::from("nback_scores.db"))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Most recent sessions first
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT finished_at, modality, n_back, event_count, events_presented,
                   score, correct, incorrect, misses, cancelled
            FROM session_history
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let finished_at: String = row.get(0)?;
            let finished_at = DateTime::parse_from_rfc3339(&finished_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        0,
                        "finished_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);
            let modality: String = row.get(1)?;
            let modality = parse_modality(&modality).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(
                    1,
                    "modality".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?;

            Ok(SessionRecord {
                finished_at,
                modality,
                n_back: row.get::<_, i64>(2)? as usize,
                event_count: row.get::<_, i64>(3)? as usize,
                events_presented: row.get::<_, i64>(4)? as usize,
                score: row.get(5)?,
                correct: row.get(6)?,
                incorrect: row.get(7)?,
                misses: row.get(8)?,
                cancelled: row.get(9)?,
            })
        })?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    /// Clear the high score and all history (for testing or reset purposes)
    pub fn clear(&self) -> Result<()> {
        self.conn()
            .execute_batch("DELETE FROM high_score; DELETE FROM session_history;")?;
        Ok(())
    }
}

fn parse_modality(s: &str) -> Option<Modality> {
    match s {
        "Visual" => Some(Modality::Visual),
        "Audio" => Some(Modality::Audio),
        "AudioVisual" => Some(Modality::AudioVisual),
        _ => None,
    }
}

impl HighScoreStore for SqliteHighScoreStore {
    fn read(&self) -> Result<u32> {
        let score: Option<u32> = self
            .conn()
            .query_row("SELECT score FROM high_score WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(score.unwrap_or(0))
    }

    fn write(&self, score: u32) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT INTO high_score (id, score, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET score = excluded.score, updated_at = excluded.updated_at
            "#,
            params![score, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn record_session(&self, record: &SessionRecord) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT INTO session_history
            (finished_at, modality, n_back, event_count, events_presented,
             score, correct, incorrect, misses, cancelled)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.finished_at.to_rfc3339(),
                record.modality.to_string(),
                record.n_back as i64,
                record.event_count as i64,
                record.events_presented as i64,
                record.score,
                record.correct,
                record.incorrect,
                record.misses,
                record.cancelled,
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    high_score: u32,
    writes: Vec<u32>,
    sessions: Vec<SessionRecord>,
    fail_writes: bool,
}

/// In-process store. Clones share the same data, so a caller can keep a handle
/// to inspect what a session persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryHighScoreStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryHighScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_high_score(score: u32) -> Self {
        let store = Self::default();
        store.lock().high_score = score;
        store
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Every value passed to `write`, including failed attempts
    pub fn writes(&self) -> Vec<u32> {
        self.lock().writes.clone()
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.lock().sessions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HighScoreStore for MemoryHighScoreStore {
    fn read(&self) -> Result<u32> {
        Ok(self.lock().high_score)
    }

    fn write(&self, score: u32) -> Result<()> {
        let mut inner = self.lock();
        inner.writes.push(score);
        if inner.fail_writes {
            return Err(GameError::Persistence("store is read-only".into()));
        }
        inner.high_score = score;
        Ok(())
    }

    fn record_session(&self, record: &SessionRecord) -> Result<()> {
        self.lock().sessions.push(record.clone());
        Ok(())
    }
}
