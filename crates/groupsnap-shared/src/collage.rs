use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contribution::validate_file_ref;
use crate::error::SessionError;
use crate::types::{ResultId, SessionId};

/// The composed image of a completed session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    pub id: ResultId,
    pub session_id: SessionId,
    pub template_id: String,
    /// Storage-relative path of the encoded image.
    pub file_ref: String,
    /// Number of contributions placed into the layout.
    pub contribution_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn new(
        session_id: SessionId,
        template_id: &str,
        file_ref: impl Into<String>,
        contribution_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let file_ref = file_ref.into();
        validate_file_ref(&file_ref)?;
        if contribution_count == 0 {
            return Err(SessionError::InvalidMemberCount);
        }
        Ok(Self {
            id: ResultId::new(),
            session_id,
            template_id: template_id.to_string(),
            file_ref,
            contribution_count,
            created_at: now,
        })
    }
}
