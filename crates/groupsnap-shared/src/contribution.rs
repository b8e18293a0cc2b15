use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_FILE_REF_LEN;
use crate::error::SessionError;
use crate::types::{ContributionId, SessionId, UserId};

/// A member's uploaded photo for one session occurrence.
///
/// At most one record exists per (session, contributor, day); storing a new
/// one for the same key supersedes the old.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributionRecord {
    pub id: ContributionId,
    /// Storage-relative path of the uploaded file.
    pub file_ref: String,
    pub session_id: SessionId,
    pub contributor: UserId,
    pub day: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl ContributionRecord {
    pub fn new(
        file_ref: impl Into<String>,
        session_id: SessionId,
        contributor: UserId,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let file_ref = file_ref.into();
        validate_file_ref(&file_ref)?;
        Ok(Self {
            id: ContributionId::new(),
            file_ref,
            session_id,
            contributor,
            day,
            created_at: now,
        })
    }
}

pub(crate) fn validate_file_ref(file_ref: &str) -> Result<(), SessionError> {
    if file_ref.is_empty() || file_ref.len() > MAX_FILE_REF_LEN {
        return Err(SessionError::InvalidFileRef);
    }
    Ok(())
}
