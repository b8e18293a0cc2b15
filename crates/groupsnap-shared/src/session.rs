//! Session record and its lifecycle state machine.
//!
//! ```text
//! recruiting -> ready_check -> countdown -> photo_taking -> completed
//!      \______________\_____________\____________\_______-> expired
//! ```
//!
//! Every transition is a pure function of the current record: it returns a
//! [`Transition`] holding the next record and the [`SessionEvent`] that
//! happened, and leaves the input untouched. Invoking a transition from the
//! wrong phase is always an error, never a no-op.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{SESSION_NAME_MAX_CHARS, SYSTEM_MAX_MEMBER};
use crate::error::SessionError;
use crate::invite::InvitationToken;
use crate::types::{SessionId, SessionKind, SessionStatus, UserId};

/// Persisted state of one group photo session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub owner: UserId,
    pub name: String,
    pub kind: SessionKind,
    pub status: SessionStatus,
    /// Capacity. Fixed at [`SYSTEM_MAX_MEMBER`] while recruiting, then
    /// locked to the attendance at finalization.
    pub max_member: u32,
    pub current_member_count: u32,
    pub invitation_token: InvitationToken,
    pub finalized_at: Option<DateTime<Utc>>,
    pub countdown_started_at: Option<DateTime<Utc>>,
    pub scheduled_capture_at: Option<DateTime<Utc>>,
    /// Catalog key of the layout, bound when the countdown starts.
    pub template_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a transition did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    MemberJoined {
        member_count: u32,
    },
    MemberLeft {
        member_count: u32,
    },
    MembersFinalized {
        max_member: u32,
    },
    CountdownStarted {
        template_id: String,
        scheduled_capture_at: DateTime<Utc>,
    },
    PhotoTakingStarted,
    Completed,
    Expired {
        previous: SessionStatus,
    },
}

/// Result of applying a transition: the next record plus the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub record: SessionRecord,
    pub event: SessionEvent,
}

impl SessionRecord {
    /// Build a fresh session in `recruiting` with no members seated yet.
    pub fn new(
        owner: UserId,
        name: &str,
        kind: SessionKind,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        validate_name(name)?;
        if matches!(expires_at, Some(at) if at <= now) {
            return Err(SessionError::Expired);
        }

        Ok(Self {
            id: SessionId::new(),
            owner,
            name: name.to_string(),
            kind,
            status: SessionStatus::Recruiting,
            max_member: SYSTEM_MAX_MEMBER,
            current_member_count: 0,
            invitation_token: InvitationToken::generate(),
            finalized_at: None,
            countdown_started_at: None,
            scheduled_capture_at: None,
            template_id: None,
            expires_at,
            created_at: now,
            updated_at: now,
        })
    }

    /// Re-check the invariants of a record read back from storage.
    pub fn validate(&self) -> Result<(), SessionError> {
        validate_name(&self.name)?;
        if self.max_member < 1 || self.max_member > SYSTEM_MAX_MEMBER {
            return Err(SessionError::InvalidMaxMember);
        }
        if self.current_member_count > self.max_member {
            return Err(SessionError::InvalidMemberCount);
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }

    pub fn is_full(&self) -> bool {
        self.current_member_count >= self.max_member
    }

    /// Day key under which this session's contributions are counted: the
    /// UTC date the countdown started.
    pub fn occurrence_day(&self) -> Option<NaiveDate> {
        self.countdown_started_at.map(|at| at.date_naive())
    }

    /// Whether the countdown has run out and the capture moment is here.
    pub fn capture_due(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Countdown
            && matches!(self.scheduled_capture_at, Some(at) if at <= now)
    }

    /// Whether readiness of `ready_count` members should start the countdown.
    pub fn should_auto_advance(&self, ready_count: u32) -> bool {
        self.status == SessionStatus::ReadyCheck
            && self.current_member_count > 0
            && ready_count == self.current_member_count
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Seat one more member.
    pub fn join(&self, now: DateTime<Utc>) -> Result<Transition, SessionError> {
        if self.is_expired(now) {
            return Err(SessionError::Expired);
        }
        if self.is_full() {
            return Err(SessionError::Full);
        }
        self.expect_phase(SessionStatus::Recruiting)?;

        let mut next = self.touched(now);
        next.current_member_count += 1;
        let member_count = next.current_member_count;
        Ok(next.into_transition(SessionEvent::MemberJoined { member_count }))
    }

    /// Release one seat. Ownership is checked by the caller, which knows
    /// who is leaving.
    pub fn leave(&self, now: DateTime<Utc>) -> Result<Transition, SessionError> {
        self.expect_phase(SessionStatus::Recruiting)?;
        if self.current_member_count == 0 {
            return Err(SessionError::InvalidMemberCount);
        }

        let mut next = self.touched(now);
        next.current_member_count -= 1;
        let member_count = next.current_member_count;
        Ok(next.into_transition(SessionEvent::MemberLeft { member_count }))
    }

    /// Close recruiting and lock the capacity to the current attendance.
    pub fn finalize(&self, now: DateTime<Utc>) -> Result<Transition, SessionError> {
        self.expect_phase(SessionStatus::Recruiting)?;
        if self.current_member_count == 0 {
            return Err(SessionError::NoMembers);
        }

        let mut next = self.touched(now);
        next.status = SessionStatus::ReadyCheck;
        next.max_member = next.current_member_count;
        next.finalized_at = Some(now);
        let max_member = next.max_member;
        Ok(next.into_transition(SessionEvent::MembersFinalized { max_member }))
    }

    /// Start the countdown unconditionally (phase permitting). Callers
    /// normally go through [`SessionRecord::auto_advance`].
    pub fn start_countdown(
        &self,
        template_id: &str,
        countdown: Duration,
        now: DateTime<Utc>,
    ) -> Result<Transition, SessionError> {
        self.expect_phase(SessionStatus::ReadyCheck)?;

        let scheduled = now + countdown;
        let mut next = self.touched(now);
        next.status = SessionStatus::Countdown;
        next.countdown_started_at = Some(now);
        next.scheduled_capture_at = Some(scheduled);
        next.template_id = Some(template_id.to_string());
        Ok(next.into_transition(SessionEvent::CountdownStarted {
            template_id: template_id.to_string(),
            scheduled_capture_at: scheduled,
        }))
    }

    /// Start the countdown iff every member is ready and the session is
    /// still waiting for readiness. `Ok(None)` means the condition does not
    /// hold, including when the countdown already started.
    pub fn auto_advance(
        &self,
        ready_count: u32,
        template_id: &str,
        countdown: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Transition>, SessionError> {
        if !self.should_auto_advance(ready_count) {
            return Ok(None);
        }
        self.start_countdown(template_id, countdown, now).map(Some)
    }

    pub fn start_photo_taking(&self, now: DateTime<Utc>) -> Result<Transition, SessionError> {
        self.expect_phase(SessionStatus::Countdown)?;

        let mut next = self.touched(now);
        next.status = SessionStatus::PhotoTaking;
        Ok(next.into_transition(SessionEvent::PhotoTakingStarted))
    }

    pub fn complete(&self, now: DateTime<Utc>) -> Result<Transition, SessionError> {
        self.expect_phase(SessionStatus::PhotoTaking)?;

        let mut next = self.touched(now);
        next.status = SessionStatus::Completed;
        Ok(next.into_transition(SessionEvent::Completed))
    }

    /// Overwrite the status with `expired`, whatever it was.
    pub fn expire(&self, now: DateTime<Utc>) -> Transition {
        let previous = self.status;
        let mut next = self.touched(now);
        next.status = SessionStatus::Expired;
        next.into_transition(SessionEvent::Expired { previous })
    }

    fn expect_phase(&self, expected: SessionStatus) -> Result<(), SessionError> {
        if self.status != expected {
            return Err(SessionError::WrongPhase {
                expected,
                actual: self.status,
            });
        }
        Ok(())
    }

    fn touched(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.updated_at = now;
        next
    }

    fn into_transition(self, event: SessionEvent) -> Transition {
        Transition {
            record: self,
            event,
        }
    }
}

fn validate_name(name: &str) -> Result<(), SessionError> {
    let len = name.chars().count();
    if len == 0 || len > SESSION_NAME_MAX_CHARS {
        return Err(SessionError::InvalidName);
    }
    Ok(())
}
