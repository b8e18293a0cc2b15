//! CRUD operations for [`MemberRecord`] rows.

use groupsnap_shared::member::MemberRecord;
use groupsnap_shared::types::{MemberId, SessionId, UserId};
use rusqlite::params;

use crate::database::{parse_opt_ts, parse_ts, parse_uuid, ts, Database};
use crate::error::{Result, StoreError};

impl Database {
    /// Insert a new member. Fails with a constraint error if the user is
    /// already seated in the session.
    pub fn create_member(&self, member: &MemberRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO members (id, session_id, user_id, is_owner, is_ready, ready_at, joined_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                member.id.to_string(),
                member.session_id.to_string(),
                member.user_id.to_string(),
                member.is_owner,
                member.is_ready,
                member.ready_at.map(ts),
                ts(member.joined_at),
                ts(member.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Fetch the seat `user` holds in `session`.
    pub fn get_member(&self, session: SessionId, user: UserId) -> Result<MemberRecord> {
        self.conn()
            .query_row(
                "SELECT id, session_id, user_id, is_owner, is_ready, ready_at, joined_at, updated_at
                 FROM members
                 WHERE session_id = ?1 AND user_id = ?2",
                params![session.to_string(), user.to_string()],
                row_to_member,
            )
            .map_err(StoreError::from_query)
    }

    /// Members of a session in join order.
    pub fn list_members(&self, session: SessionId) -> Result<Vec<MemberRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, session_id, user_id, is_owner, is_ready, ready_at, joined_at, updated_at
             FROM members
             WHERE session_id = ?1
             ORDER BY joined_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![session.to_string()], row_to_member)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Persist readiness changes of an existing member.
    pub fn update_member(&self, member: &MemberRecord) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE members SET is_ready = ?2, ready_at = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                member.id.to_string(),
                member.is_ready,
                member.ready_at.map(ts),
                ts(member.updated_at),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Remove `user` from `session`. Returns `true` if a row was deleted.
    pub fn delete_member(&self, session: SessionId, user: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM members WHERE session_id = ?1 AND user_id = ?2",
            params![session.to_string(), user.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn count_members(&self, session: SessionId) -> Result<u32> {
        let n: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM members WHERE session_id = ?1",
            params![session.to_string()],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn count_ready_members(&self, session: SessionId) -> Result<u32> {
        let n: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM members WHERE session_id = ?1 AND is_ready = 1",
            params![session.to_string()],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Whether `user` holds the owner seat of `session`.
    pub fn is_owner(&self, session: SessionId, user: UserId) -> Result<bool> {
        let owner: bool = self.conn().query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM members
                 WHERE session_id = ?1 AND user_id = ?2 AND is_owner = 1
             )",
            params![session.to_string(), user.to_string()],
            |row| row.get(0),
        )?;
        Ok(owner)
    }
}

/// Map a `rusqlite::Row` to a [`MemberRecord`].
fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemberRecord> {
    let id_str: String = row.get(0)?;
    let session_str: String = row.get(1)?;
    let user_str: String = row.get(2)?;
    let joined_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;

    Ok(MemberRecord {
        id: MemberId(parse_uuid(0, &id_str)?),
        session_id: SessionId(parse_uuid(1, &session_str)?),
        user_id: UserId(parse_uuid(2, &user_str)?),
        is_owner: row.get(3)?,
        is_ready: row.get(4)?,
        ready_at: parse_opt_ts(5, row.get(5)?)?,
        joined_at: parse_ts(6, &joined_str)?,
        updated_at: parse_ts(7, &updated_str)?,
    })
}
