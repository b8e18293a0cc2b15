use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::types::{MemberId, SessionId, UserId};

/// One user's seat in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRecord {
    pub id: MemberId,
    pub session_id: SessionId,
    pub user_id: UserId,
    /// Set at session creation for exactly one member, never transferred.
    pub is_owner: bool,
    pub is_ready: bool,
    pub ready_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberRecord {
    pub fn new(session_id: SessionId, user_id: UserId, is_owner: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: MemberId::new(),
            session_id,
            user_id,
            is_owner,
            is_ready: false,
            ready_at: None,
            joined_at: now,
            updated_at: now,
        }
    }

    /// Next record with the member marked ready.
    pub fn mark_ready(&self, now: DateTime<Utc>) -> Result<Self, SessionError> {
        if self.is_ready {
            return Err(SessionError::AlreadyReady);
        }
        let mut next = self.clone();
        next.is_ready = true;
        next.ready_at = Some(now);
        next.updated_at = now;
        Ok(next)
    }

    /// Next record with readiness withdrawn.
    pub fn cancel_ready(&self, now: DateTime<Utc>) -> Result<Self, SessionError> {
        if !self.is_ready {
            return Err(SessionError::NotReady);
        }
        let mut next = self.clone();
        next.is_ready = false;
        next.ready_at = None;
        next.updated_at = now;
        Ok(next)
    }
}
