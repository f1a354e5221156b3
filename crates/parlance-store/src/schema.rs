//! Database schema SQL for sessions and turns.

/// Core tables: sessions, turns.
///
/// The unique index on `(session_id, pair_id, role)` enforces pairing
/// integrity: at most one user and one assistant turn per pair. The partial
/// index on system turns enforces the one-system-turn-per-session invariant
/// (NULL pair ids would otherwise slip past the composite index).
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    pair_id TEXT,
    role TEXT NOT NULL CHECK (role IN ('system', 'user', 'assistant')),
    content TEXT NOT NULL,
    audio_ref TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_turns_pair_role
    ON turns(session_id, pair_id, role) WHERE pair_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_turns_one_system
    ON turns(session_id) WHERE role = 'system';
CREATE INDEX IF NOT EXISTS idx_turns_session_created
    ON turns(session_id, created_at);
"#;
