//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `sessions`, `members`, `contributions`
//! and `results`. Everything hangs off `sessions` and is removed with it.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    id                   TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    owner_id             TEXT NOT NULL,               -- UUID of the creating user
    name                 TEXT NOT NULL,
    kind                 TEXT NOT NULL,               -- local_temporary | global_temporary | permanent
    status               TEXT NOT NULL,               -- recruiting .. completed | expired
    max_member           INTEGER NOT NULL,
    current_member_count INTEGER NOT NULL DEFAULT 0,
    invitation_token     TEXT NOT NULL UNIQUE,
    finalized_at         TEXT,                        -- RFC-3339
    countdown_started_at TEXT,
    scheduled_capture_at TEXT,
    template_id          TEXT,
    expires_at           TEXT,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,

    CHECK (current_member_count >= 0 AND current_member_count <= max_member)
);

CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions(owner_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

-- ----------------------------------------------------------------
-- Members
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS members (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    session_id TEXT NOT NULL,                 -- FK -> sessions(id)
    user_id    TEXT NOT NULL,
    is_owner   INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    is_ready   INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    ready_at   TEXT,
    joined_at  TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE (session_id, user_id),
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Contributions (one uploaded photo per member per occurrence day)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contributions (
    id             TEXT PRIMARY KEY NOT NULL, -- UUID v4
    session_id     TEXT NOT NULL,             -- FK -> sessions(id)
    contributor_id TEXT NOT NULL,
    day            TEXT NOT NULL,             -- YYYY-MM-DD
    file_ref       TEXT NOT NULL,
    created_at     TEXT NOT NULL,

    UNIQUE (session_id, contributor_id, day),
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_contributions_session_day
    ON contributions(session_id, day);

-- ----------------------------------------------------------------
-- Results (composed collage, one per session)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS results (
    id                 TEXT PRIMARY KEY NOT NULL,
    session_id         TEXT NOT NULL UNIQUE,  -- FK -> sessions(id)
    template_id        TEXT NOT NULL,
    file_ref           TEXT NOT NULL,
    contribution_count INTEGER NOT NULL,
    created_at         TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
