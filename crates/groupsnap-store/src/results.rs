//! Composed collage records.

use groupsnap_shared::collage::ResultRecord;
use groupsnap_shared::types::{ResultId, SessionId};
use rusqlite::params;

use crate::database::{parse_ts, parse_uuid, ts, Database};
use crate::error::{Result, StoreError};

impl Database {
    /// Insert the result of a session. A session has at most one.
    pub fn insert_result(&self, result: &ResultRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO results (id, session_id, template_id, file_ref, contribution_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.id.to_string(),
                result.session_id.to_string(),
                result.template_id,
                result.file_ref,
                result.contribution_count,
                ts(result.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_result_by_session(&self, session: SessionId) -> Result<ResultRecord> {
        self.conn()
            .query_row(
                "SELECT id, session_id, template_id, file_ref, contribution_count, created_at
                 FROM results
                 WHERE session_id = ?1",
                params![session.to_string()],
                row_to_result,
            )
            .map_err(StoreError::from_query)
    }
}

fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResultRecord> {
    let id_str: String = row.get(0)?;
    let session_str: String = row.get(1)?;
    let created_str: String = row.get(5)?;

    Ok(ResultRecord {
        id: ResultId(parse_uuid(0, &id_str)?),
        session_id: SessionId(parse_uuid(1, &session_str)?),
        template_id: row.get(2)?,
        file_ref: row.get(3)?,
        contribution_count: row.get(4)?,
        created_at: parse_ts(5, &created_str)?,
    })
}
