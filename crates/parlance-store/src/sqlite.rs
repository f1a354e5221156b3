//! SQLite-backed transcript store.
//!
//! Append-only ordered record of conversation turns, keyed by session. The
//! orchestrator is the sole writer and guarantees sequential writes within one
//! session; the connection mutex makes concurrent turns on *different*
//! sessions safe.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::schema::SCHEMA_SQL;
use parlance_core::{now_millis, Error, NewTurn, Result, Role, Turn};

pub struct TranscriptStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl TranscriptStore {
    /// Open or create the store. `db_dir` is the directory; the file will be
    /// `db_dir/transcripts.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("transcripts.db");

        let conn = Connection::open(&db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        info!(
            "TranscriptStore initialized: {} sessions, path={}",
            store.count_sessions()?,
            store.db_path.display()
        );

        Ok(store)
    }

    /// Create a session row explicitly. Idempotent; sessions are otherwise
    /// created lazily on first append.
    pub fn create_session(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        Self::ensure_session(&conn, session_id)?;
        Ok(())
    }

    fn ensure_session(conn: &Connection, session_id: &str) -> Result<()> {
        conn.prepare_cached("INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?1, ?2)")
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![session_id, now_millis()])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Insert a new turn. Fails with `DuplicateTurn` if the same
    /// `(session_id, pair_id, role)` already exists, or if the session
    /// already has a system turn.
    pub fn append(&self, turn: NewTurn) -> Result<Turn> {
        let now = now_millis();
        let conn = self.conn.lock();
        Self::ensure_session(&conn, &turn.session_id)?;

        let id = conn
            .prepare_cached(
                "INSERT INTO turns (session_id, pair_id, role, content, audio_ref, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![
                turn.session_id,
                turn.pair_id,
                turn.role.as_str(),
                turn.content,
                turn.audio_ref,
                now,
            ])
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    Error::DuplicateTurn {
                        session_id: turn.session_id.clone(),
                        pair_id: turn.pair_id.clone().unwrap_or_default(),
                        role: turn.role.as_str().into(),
                    }
                } else {
                    Error::Database(e.to_string())
                }
            })?;

        debug!(
            "Appended turn id={} session={} pair={:?} role={}",
            id, turn.session_id, turn.pair_id, turn.role
        );

        Ok(Turn {
            id,
            session_id: turn.session_id,
            pair_id: turn.pair_id,
            role: turn.role,
            content: turn.content,
            audio_ref: turn.audio_ref,
            created_at: now,
            updated_at: now,
        })
    }

    /// Attach an audio reference to an existing turn, bumping `updated_at`.
    /// Fails with `NotFound` if the turn is absent.
    pub fn attach_audio(
        &self,
        session_id: &str,
        pair_id: &str,
        role: Role,
        audio_ref: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn
            .prepare_cached(
                "UPDATE turns SET audio_ref = ?1, updated_at = ?2
                 WHERE session_id = ?3 AND pair_id = ?4 AND role = ?5",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![
                audio_ref,
                now_millis(),
                session_id,
                pair_id,
                role.as_str()
            ])
            .map_err(|e| Error::Database(e.to_string()))?;

        if changed == 0 {
            return Err(Error::NotFound(format!(
                "turn session={} pair={} role={}",
                session_id, pair_id, role
            )));
        }
        Ok(())
    }

    /// All turns for a session, ordered by `created_at` ascending (insert
    /// order breaks millisecond ties).
    pub fn list_by_session(&self, session_id: &str) -> Result<Vec<Turn>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, session_id, pair_id, role, content, audio_ref, created_at, updated_at
                 FROM turns WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let turns = stmt
            .query_map(params![session_id], Self::row_to_turn)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(turns)
    }

    /// Fetch one turn by its pair and role.
    pub fn get_by_pair(&self, session_id: &str, pair_id: &str, role: Role) -> Result<Option<Turn>> {
        let conn = self.conn.lock();
        let turn = conn
            .prepare_cached(
                "SELECT id, session_id, pair_id, role, content, audio_ref, created_at, updated_at
                 FROM turns WHERE session_id = ?1 AND pair_id = ?2 AND role = ?3",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![session_id, pair_id, role.as_str()], Self::row_to_turn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()));
        turn
    }

    /// Bulk removal of a session and its turns. Used only by external cleanup
    /// collaborators, never by the pipeline itself.
    pub fn delete_by_session(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn
            .prepare_cached("DELETE FROM turns WHERE session_id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![session_id])
            .map_err(|e| Error::Database(e.to_string()))?;
        conn.prepare_cached("DELETE FROM sessions WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![session_id])
            .map_err(|e| Error::Database(e.to_string()))?;
        info!("Deleted session {} ({} turns)", session_id, removed);
        Ok(removed)
    }

    pub fn count_sessions(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
            .map_err(|e| Error::Database(e.to_string()))
    }

    fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<Turn> {
        let role_str: String = row.get(3)?;
        let role = Role::parse(&role_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown role: {}", role_str).into(),
            )
        })?;
        Ok(Turn {
            id: row.get(0)?,
            session_id: row.get(1)?,
            pair_id: row.get(2)?,
            role,
            content: row.get(4)?,
            audio_ref: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}
