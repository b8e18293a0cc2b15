//! Contribution storage.
//!
//! This table is the only source for "how many photos has a session
//! received": the composition worker and the status reporter both count
//! through [`Database::count_contributions`].

use chrono::NaiveDate;
use groupsnap_shared::contribution::ContributionRecord;
use groupsnap_shared::types::{ContributionId, SessionId, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::{day_key, parse_day, parse_ts, parse_uuid, ts, Database};
use crate::error::Result;

impl Database {
    /// Store `contribution`, replacing any earlier one for the same
    /// (session, contributor, day). Returns the file reference of the
    /// replaced record so the caller can remove the old file.
    pub fn upsert_contribution(&self, contribution: &ContributionRecord) -> Result<Option<String>> {
        let day = day_key(contribution.day);

        let previous: Option<String> = self
            .conn()
            .query_row(
                "SELECT file_ref FROM contributions
                 WHERE session_id = ?1 AND contributor_id = ?2 AND day = ?3",
                params![
                    contribution.session_id.to_string(),
                    contribution.contributor.to_string(),
                    day,
                ],
                |row| row.get(0),
            )
            .optional()?;

        self.conn().execute(
            "INSERT INTO contributions (id, session_id, contributor_id, day, file_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (session_id, contributor_id, day) DO UPDATE SET
                 id = excluded.id,
                 file_ref = excluded.file_ref,
                 created_at = excluded.created_at",
            params![
                contribution.id.to_string(),
                contribution.session_id.to_string(),
                contribution.contributor.to_string(),
                day,
                contribution.file_ref,
                ts(contribution.created_at),
            ],
        )?;

        Ok(previous.filter(|old| *old != contribution.file_ref))
    }

    /// Contributions of one session occurrence, ordered by when their
    /// contributor joined the session.
    pub fn list_contributions(&self, session: SessionId, day: NaiveDate) -> Result<Vec<ContributionRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.file_ref, c.session_id, c.contributor_id, c.day, c.created_at
             FROM contributions c
             LEFT JOIN members m
                 ON m.session_id = c.session_id AND m.user_id = c.contributor_id
             WHERE c.session_id = ?1 AND c.day = ?2
             ORDER BY m.joined_at IS NULL, m.joined_at ASC, m.rowid ASC, c.created_at ASC",
        )?;

        let rows = stmt.query_map(params![session.to_string(), day_key(day)], row_to_contribution)?;

        let mut contributions = Vec::new();
        for row in rows {
            contributions.push(row?);
        }
        Ok(contributions)
    }

    pub fn count_contributions(&self, session: SessionId, day: NaiveDate) -> Result<u32> {
        let n: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM contributions WHERE session_id = ?1 AND day = ?2",
            params![session.to_string(), day_key(day)],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Clear one session occurrence. Returns the file references of the
    /// removed records.
    pub fn delete_contributions(&self, session: SessionId, day: NaiveDate) -> Result<Vec<String>> {
        let removed: Vec<String> = {
            let mut stmt = self
                .conn()
                .prepare("SELECT file_ref FROM contributions WHERE session_id = ?1 AND day = ?2")?;
            let rows = stmt.query_map(params![session.to_string(), day_key(day)], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        self.conn().execute(
            "DELETE FROM contributions WHERE session_id = ?1 AND day = ?2",
            params![session.to_string(), day_key(day)],
        )?;
        Ok(removed)
    }
}

/// Map a `rusqlite::Row` to a [`ContributionRecord`].
fn row_to_contribution(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContributionRecord> {
    let id_str: String = row.get(0)?;
    let session_str: String = row.get(2)?;
    let contributor_str: String = row.get(3)?;
    let day_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    Ok(ContributionRecord {
        id: ContributionId(parse_uuid(0, &id_str)?),
        file_ref: row.get(1)?,
        session_id: SessionId(parse_uuid(2, &session_str)?),
        contributor: UserId(parse_uuid(3, &contributor_str)?),
        day: parse_day(4, &day_str)?,
        created_at: parse_ts(5, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use groupsnap_shared::member::MemberRecord;
    use groupsnap_shared::session::SessionRecord;
    use groupsnap_shared::types::SessionKind;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 18).unwrap()
    }

    fn seeded(members: usize) -> (Database, SessionId, Vec<UserId>) {
        let db = Database::open_in_memory().unwrap();
        let s = SessionRecord::new(UserId::new(), "beach", SessionKind::Permanent, None, Utc::now()).unwrap();
        db.create_session(&s).unwrap();

        let t0 = Utc::now();
        let mut users = Vec::new();
        for i in 0..members {
            let user = if i == 0 { s.owner } else { UserId::new() };
            db.create_member(&MemberRecord::new(s.id, user, i == 0, t0 + Duration::seconds(i as i64)))
                .unwrap();
            users.push(user);
        }
        (db, s.id, users)
    }

    fn upload(db: &Database, session: SessionId, user: UserId, file: &str) -> Option<String> {
        let c = ContributionRecord::new(file, session, user, day(), Utc::now()).unwrap();
        db.upsert_contribution(&c).unwrap()
    }

    #[test]
    fn later_upload_replaces_earlier_for_same_key() {
        let (db, session, users) = seeded(2);

        assert_eq!(upload(&db, session, users[0], "a1.jpg"), None);
        assert_eq!(upload(&db, session, users[0], "a2.jpg"), Some("a1.jpg".to_string()));
        assert_eq!(db.count_contributions(session, day()).unwrap(), 1);

        let listed = db.list_contributions(session, day()).unwrap();
        assert_eq!(listed[0].file_ref, "a2.jpg");

        // other days are separate occurrences
        let next = ContributionRecord::new("a3.jpg", session, users[0], day().succ_opt().unwrap(), Utc::now())
            .unwrap();
        assert_eq!(db.upsert_contribution(&next).unwrap(), None);
        assert_eq!(db.count_contributions(session, day()).unwrap(), 1);
    }

    #[test]
    fn listing_follows_member_join_order() {
        let (db, session, users) = seeded(3);
        upload(&db, session, users[2], "third.jpg");
        upload(&db, session, users[0], "first.jpg");
        upload(&db, session, users[1], "second.jpg");

        let files: Vec<String> = db
            .list_contributions(session, day())
            .unwrap()
            .into_iter()
            .map(|c| c.file_ref)
            .collect();
        assert_eq!(files, vec!["first.jpg", "second.jpg", "third.jpg"]);
    }

    #[test]
    fn clearing_an_occurrence_returns_its_files() {
        let (db, session, users) = seeded(2);
        upload(&db, session, users[0], "x.png");
        upload(&db, session, users[1], "y.png");

        let mut removed = db.delete_contributions(session, day()).unwrap();
        removed.sort();
        assert_eq!(removed, vec!["x.png", "y.png"]);
        assert_eq!(db.count_contributions(session, day()).unwrap(), 0);
    }
}
