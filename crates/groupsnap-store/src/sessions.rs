//! CRUD operations for [`SessionRecord`] rows.

use chrono::{DateTime, Utc};
use groupsnap_shared::invite::InvitationToken;
use groupsnap_shared::session::SessionRecord;
use groupsnap_shared::types::{SessionId, SessionStatus, UserId};
use rusqlite::params;

use crate::database::{conversion_error, parse_opt_ts, parse_ts, parse_uuid, ts, Database};
use crate::error::{Result, StoreError};

const SESSION_COLUMNS: &str = "id, owner_id, name, kind, status, max_member, current_member_count,
     invitation_token, finalized_at, countdown_started_at, scheduled_capture_at,
     template_id, expires_at, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new session.
    pub fn create_session(&self, session: &SessionRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (id, owner_id, name, kind, status, max_member,
                 current_member_count, invitation_token, finalized_at,
                 countdown_started_at, scheduled_capture_at, template_id,
                 expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                session.id.to_string(),
                session.owner.to_string(),
                session.name,
                session.kind.as_str(),
                session.status.as_str(),
                session.max_member,
                session.current_member_count,
                session.invitation_token.as_str(),
                session.finalized_at.map(ts),
                session.countdown_started_at.map(ts),
                session.scheduled_capture_at.map(ts),
                session.template_id,
                session.expires_at.map(ts),
                ts(session.created_at),
                ts(session.updated_at),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single session by id.
    pub fn get_session(&self, id: SessionId) -> Result<SessionRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id.to_string()],
                row_to_session,
            )
            .map_err(StoreError::from_query)
    }

    /// Fetch a session by its invitation token.
    pub fn get_session_by_token(&self, token: &InvitationToken) -> Result<SessionRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE invitation_token = ?1"),
                params![token.as_str()],
                row_to_session,
            )
            .map_err(StoreError::from_query)
    }

    /// List sessions created by `owner`, newest first.
    pub fn list_sessions_by_owner(&self, owner: UserId, limit: u32, offset: u32) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SESSION_COLUMNS}
             FROM sessions
             WHERE owner_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![owner.to_string(), limit, offset], row_to_session)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// List every session currently in `status`, oldest first.
    pub fn list_sessions_by_status(&self, status: SessionStatus) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SESSION_COLUMNS}
             FROM sessions
             WHERE status = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(params![status.as_str()], row_to_session)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// Non-terminal sessions whose expiry has passed at `now`.
    pub fn list_expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SESSION_COLUMNS}
             FROM sessions
             WHERE status NOT IN ('completed', 'expired')
               AND expires_at IS NOT NULL
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map([], row_to_session)?;

        let mut sessions = Vec::new();
        for row in rows {
            let session = row?;
            if session.is_expired(now) {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    /// Total number of sessions.
    pub fn count_sessions(&self) -> Result<u64> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Persist every mutable column of `session`, but only if the row is
    /// still in `expected` status.
    ///
    /// Returns [`StoreError::Conflict`] when another writer moved the session
    /// on in the meantime and [`StoreError::NotFound`] when it is gone.
    pub fn update_session(&self, session: &SessionRecord, expected: SessionStatus) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE sessions SET
                 name = ?2, kind = ?3, status = ?4, max_member = ?5,
                 current_member_count = ?6, finalized_at = ?7,
                 countdown_started_at = ?8, scheduled_capture_at = ?9,
                 template_id = ?10, expires_at = ?11, updated_at = ?12
             WHERE id = ?1 AND status = ?13",
            params![
                session.id.to_string(),
                session.name,
                session.kind.as_str(),
                session.status.as_str(),
                session.max_member,
                session.current_member_count,
                session.finalized_at.map(ts),
                session.countdown_started_at.map(ts),
                session.scheduled_capture_at.map(ts),
                session.template_id,
                session.expires_at.map(ts),
                ts(session.updated_at),
                expected.as_str(),
            ],
        )?;

        if affected == 0 {
            return Err(self.missing_or_conflict(session.id)?);
        }
        Ok(())
    }

    /// Overwrite only the status column. Returns `false` if no such session.
    pub fn update_session_status(&self, id: SessionId, status: SessionStatus, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE sessions SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status.as_str(), ts(now)],
        )?;
        Ok(affected > 0)
    }

    fn missing_or_conflict(&self, id: SessionId) -> Result<StoreError> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(if exists {
            StoreError::Conflict
        } else {
            StoreError::NotFound
        })
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a session with its members, contributions and result.
    /// Returns `true` if a row was deleted.
    pub fn delete_session(&self, id: SessionId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`SessionRecord`], re-checking its invariants.
fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let id_str: String = row.get(0)?;
    let owner_str: String = row.get(1)?;
    let kind_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let token: String = row.get(7)?;
    let created_str: String = row.get(13)?;
    let updated_str: String = row.get(14)?;

    let session = SessionRecord {
        id: SessionId(parse_uuid(0, &id_str)?),
        owner: UserId(parse_uuid(1, &owner_str)?),
        name: row.get(2)?,
        kind: kind_str.parse().map_err(|e| conversion_error(3, e))?,
        status: status_str.parse().map_err(|e| conversion_error(4, e))?,
        max_member: row.get(5)?,
        current_member_count: row.get(6)?,
        invitation_token: InvitationToken::from_raw(token),
        finalized_at: parse_opt_ts(8, row.get(8)?)?,
        countdown_started_at: parse_opt_ts(9, row.get(9)?)?,
        scheduled_capture_at: parse_opt_ts(10, row.get(10)?)?,
        template_id: row.get(11)?,
        expires_at: parse_opt_ts(12, row.get(12)?)?,
        created_at: parse_ts(13, &created_str)?,
        updated_at: parse_ts(14, &updated_str)?,
    };

    session.validate().map_err(|e| conversion_error(0, e))?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use groupsnap_shared::types::SessionKind;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn session(owner: UserId) -> SessionRecord {
        SessionRecord::new(owner, "picnic", SessionKind::Permanent, None, Utc::now()).unwrap()
    }

    #[test]
    fn create_and_fetch_by_id_and_token() {
        let db = db();
        let s = session(UserId::new());
        db.create_session(&s).unwrap();

        let by_id = db.get_session(s.id).unwrap();
        assert_eq!(by_id.name, "picnic");
        assert_eq!(by_id.status, SessionStatus::Recruiting);
        assert_eq!(by_id.invitation_token, s.invitation_token);

        let by_token = db.get_session_by_token(&s.invitation_token).unwrap();
        assert_eq!(by_token.id, s.id);

        assert!(matches!(db.get_session(SessionId::new()), Err(StoreError::NotFound)));
        assert!(matches!(
            db.get_session_by_token(&InvitationToken::from_raw("nope")),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_by_owner_pages_newest_first() {
        let db = db();
        let owner = UserId::new();
        let start = Utc::now();
        for i in 0..5 {
            let mut s = session(owner);
            s.created_at = start + Duration::seconds(i);
            db.create_session(&s).unwrap();
        }
        db.create_session(&session(UserId::new())).unwrap();

        let page = db.list_sessions_by_owner(owner, 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at > page[1].created_at);
        assert_eq!(db.list_sessions_by_owner(owner, 10, 4).unwrap().len(), 1);
        assert_eq!(db.count_sessions().unwrap(), 6);
    }

    #[test]
    fn optimistic_update_detects_conflicts() {
        let db = db();
        let s = session(UserId::new());
        db.create_session(&s).unwrap();

        let joined = s.join(Utc::now()).unwrap().record;
        db.update_session(&joined, SessionStatus::Recruiting).unwrap();
        assert_eq!(db.get_session(s.id).unwrap().current_member_count, 1);

        let finalized = joined.finalize(Utc::now()).unwrap().record;
        db.update_session(&finalized, SessionStatus::Recruiting).unwrap();

        // a writer still holding the recruiting snapshot loses
        let stale = joined.join(Utc::now()).unwrap().record;
        assert!(matches!(
            db.update_session(&stale, SessionStatus::Recruiting),
            Err(StoreError::Conflict)
        ));

        let ghost = session(UserId::new());
        assert!(matches!(
            db.update_session(&ghost, SessionStatus::Recruiting),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn status_listing_and_expiry_scan() {
        let db = db();
        let now = Utc::now();
        let owner = UserId::new();

        let lapsed = SessionRecord::new(owner, "old", SessionKind::LocalTemporary, Some(now + Duration::seconds(1)), now)
            .unwrap();
        let fresh = SessionRecord::new(owner, "new", SessionKind::LocalTemporary, Some(now + Duration::hours(1)), now)
            .unwrap();
        let forever = session(owner);
        for s in [&lapsed, &fresh, &forever] {
            db.create_session(s).unwrap();
        }

        assert_eq!(db.list_sessions_by_status(SessionStatus::Recruiting).unwrap().len(), 3);

        let later = now + Duration::minutes(1);
        let expired = db.list_expired_sessions(later).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, lapsed.id);

        assert!(db.update_session_status(lapsed.id, SessionStatus::Expired, later).unwrap());
        assert!(db.list_expired_sessions(later).unwrap().is_empty());
        assert_eq!(db.list_sessions_by_status(SessionStatus::Expired).unwrap().len(), 1);
    }

    #[test]
    fn delete_reports_whether_a_row_went() {
        let db = db();
        let s = session(UserId::new());
        db.create_session(&s).unwrap();
        assert!(db.delete_session(s.id).unwrap());
        assert!(!db.delete_session(s.id).unwrap());
    }

    #[test]
    fn corrupt_rows_fail_validation_on_read() {
        let db = db();
        let s = session(UserId::new());
        db.create_session(&s).unwrap();
        db.conn()
            .execute(
                "UPDATE sessions SET kind = 'forever' WHERE id = ?1",
                params![s.id.to_string()],
            )
            .unwrap();
        assert!(matches!(db.get_session(s.id), Err(StoreError::Sqlite(_))));
    }
}
