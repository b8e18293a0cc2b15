//! Session coordinator.
//!
//! Drives the session state machine against the store. Every operation that
//! writes runs inside one SQLite transaction under the shared connection
//! lock: it reads the current records, applies the pure transition and
//! persists the result with an optimistic status check. No operation
//! retries; guard failures come back as [`SessionError`] wrapped in
//! [`StoreError::Domain`].

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use groupsnap_shared::collage::ResultRecord;
use groupsnap_shared::contribution::ContributionRecord;
use groupsnap_shared::error::SessionError;
use groupsnap_shared::invite::InvitationToken;
use groupsnap_shared::member::MemberRecord;
use groupsnap_shared::session::{SessionEvent, SessionRecord};
use groupsnap_shared::template::TemplateCatalog;
use groupsnap_shared::types::{SessionId, SessionKind, SessionStatus, UserId};
use groupsnap_store::{Database, StoreError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::upload_store::UploadStore;

pub type SharedDb = Arc<Mutex<Database>>;

/// Outcome of a ready signal.
#[derive(Debug, Clone)]
pub struct ReadyOutcome {
    pub session: SessionRecord,
    pub member: MemberRecord,
    /// Whether this signal was the last one and started the countdown.
    pub countdown_started: bool,
}

/// Outcome of an accepted upload.
#[derive(Debug, Clone)]
pub struct ContributionOutcome {
    pub contribution: ContributionRecord,
    /// Whether an earlier upload for the same day was superseded.
    pub replaced: bool,
}

pub struct SessionCoordinator {
    db: SharedDb,
    catalog: Arc<TemplateCatalog>,
    uploads: Arc<UploadStore>,
    countdown: chrono::Duration,
}

impl SessionCoordinator {
    pub fn new(
        db: SharedDb,
        catalog: Arc<TemplateCatalog>,
        uploads: Arc<UploadStore>,
        countdown: std::time::Duration,
    ) -> Self {
        let countdown = chrono::Duration::from_std(countdown).unwrap_or(chrono::Duration::seconds(10));
        Self {
            db,
            catalog,
            uploads,
            countdown,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a session with `owner` seated as its first member.
    pub async fn create_session(
        &self,
        owner: UserId,
        name: &str,
        kind: SessionKind,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SessionRecord, StoreError> {
        let now = Utc::now();
        let session = SessionRecord::new(owner, name, kind, expires_at, now)?;

        let db = self.db.lock().await;
        let created = db.in_transaction(|db| {
            db.create_session(&session)?;
            db.create_member(&MemberRecord::new(session.id, owner, true, now))?;
            let seated = session.join(now)?;
            db.update_session(&seated.record, SessionStatus::Recruiting)?;
            Ok::<_, StoreError>(seated.record)
        })?;

        info!(session = %created.id, owner = %owner, kind = %created.kind, "Session created");
        Ok(created)
    }

    /// Seat `user` in the session behind `token`.
    pub async fn join_session(
        &self,
        token: &InvitationToken,
        user: UserId,
    ) -> Result<(SessionRecord, MemberRecord), StoreError> {
        let now = Utc::now();

        let db = self.db.lock().await;
        let (session, member, event) = db.in_transaction(|db| {
            let session = db.get_session_by_token(token).map_err(missing(SessionError::SessionNotFound))?;
            let joined = session.join(now)?;
            if db.get_member(session.id, user).is_ok() {
                return Err(SessionError::MemberAlreadyExists.into());
            }

            let member = MemberRecord::new(session.id, user, false, now);
            db.create_member(&member)?;
            db.update_session(&joined.record, SessionStatus::Recruiting)?;
            Ok::<_, StoreError>((joined.record, member, joined.event))
        })?;

        info!(session = %session.id, user = %user, ?event, "Member joined");
        Ok((session, member))
    }

    /// Close recruiting. Owner only.
    pub async fn finalize_members(&self, session_id: SessionId, user: UserId) -> Result<SessionRecord, StoreError> {
        let now = Utc::now();

        let db = self.db.lock().await;
        let session = db.in_transaction(|db| {
            let session = load_session(db, session_id)?;
            if !db.is_owner(session_id, user)? {
                return Err(SessionError::NotOwner.into());
            }

            let finalized = session.finalize(now)?;
            db.update_session(&finalized.record, SessionStatus::Recruiting)?;
            info!(session = %session_id, event = ?finalized.event, "Members finalized");

            // members who signalled while recruiting may already be ready
            Ok::<_, StoreError>(self.advance_if_all_ready(db, finalized.record, now)?.0)
        })?;

        Ok(session)
    }

    /// Record `user` as ready and start the countdown if they were the last.
    pub async fn mark_ready(&self, session_id: SessionId, user: UserId) -> Result<ReadyOutcome, StoreError> {
        let now = Utc::now();

        let db = self.db.lock().await;
        let outcome = db.in_transaction(|db| {
            let session = load_session(db, session_id)?;
            let member = load_member(db, session_id, user)?;
            if session.status.is_terminal() {
                return Err(SessionError::WrongPhase {
                    expected: SessionStatus::ReadyCheck,
                    actual: session.status,
                }
                .into());
            }

            let member = member.mark_ready(now)?;
            db.update_member(&member)?;
            debug!(session = %session_id, user = %user, "Member ready");

            let (session, countdown_started) = self.advance_if_all_ready(db, session, now)?;
            Ok::<_, StoreError>(ReadyOutcome {
                session,
                member,
                countdown_started,
            })
        })?;

        Ok(outcome)
    }

    /// Withdraw readiness while the session still waits for everyone.
    pub async fn cancel_ready(&self, session_id: SessionId, user: UserId) -> Result<MemberRecord, StoreError> {
        let now = Utc::now();

        let db = self.db.lock().await;
        db.in_transaction(|db| {
            let session = load_session(db, session_id)?;
            let member = load_member(db, session_id, user)?;
            if session.status != SessionStatus::ReadyCheck {
                return Err(SessionError::WrongPhase {
                    expected: SessionStatus::ReadyCheck,
                    actual: session.status,
                }
                .into());
            }

            let member = member.cancel_ready(now)?;
            db.update_member(&member)?;
            debug!(session = %session_id, user = %user, "Member no longer ready");
            Ok(member)
        })
    }

    /// Give up a seat while recruiting. The owner cannot leave.
    pub async fn leave_session(&self, session_id: SessionId, user: UserId) -> Result<SessionRecord, StoreError> {
        let now = Utc::now();

        let db = self.db.lock().await;
        let session = db.in_transaction(|db| {
            let session = load_session(db, session_id)?;
            if session.status != SessionStatus::Recruiting {
                return Err(SessionError::WrongPhase {
                    expected: SessionStatus::Recruiting,
                    actual: session.status,
                }
                .into());
            }
            if db.is_owner(session_id, user)? {
                return Err(SessionError::OwnerCannotLeave.into());
            }
            if !db.delete_member(session_id, user)? {
                return Err(SessionError::MemberNotFound.into());
            }

            let left = session.leave(now)?;
            db.update_session(&left.record, SessionStatus::Recruiting)?;
            Ok::<_, StoreError>(left.record)
        })?;

        info!(session = %session_id, user = %user, members = session.current_member_count, "Member left");
        Ok(session)
    }

    /// Delete a session with everything that belongs to it. Owner only.
    pub async fn delete_session(&self, session_id: SessionId, user: UserId) -> Result<(), ServerError> {
        {
            let db = self.db.lock().await;
            db.in_transaction(|db| {
                load_session(db, session_id)?;
                if !db.is_owner(session_id, user)? {
                    return Err(SessionError::NotOwner.into());
                }
                db.delete_session(session_id)?;
                Ok::<_, StoreError>(())
            })?;
        }

        if let Err(e) = self.uploads.remove_session(session_id).await {
            warn!(session = %session_id, error = %e, "Session deleted but its files remain");
        }
        info!(session = %session_id, "Session deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Contributions
    // ------------------------------------------------------------------

    /// Store `user`'s photo for the current occurrence of the session.
    ///
    /// The file is written outside the connection lock and removed again
    /// if the record cannot be stored. A superseded file is removed after
    /// the new record commits.
    pub async fn submit_contribution(
        &self,
        session_id: SessionId,
        user: UserId,
        data: &[u8],
    ) -> Result<ContributionOutcome, ServerError> {
        self.uploads.validate_photo(data)?;
        let day = {
            let db = self.db.lock().await;
            contribution_day(&db, session_id, user)?
        };

        let file_ref = self.uploads.store_contribution(session_id, user, day, data).await?;

        let stored = {
            let db = self.db.lock().await;
            db.in_transaction(|db| {
                // the session may have moved on while the file was written
                let current_day = contribution_day(db, session_id, user)?;
                let record = ContributionRecord::new(file_ref.clone(), session_id, user, current_day, Utc::now())?;
                let replaced = db.upsert_contribution(&record)?;
                Ok::<_, StoreError>((record, replaced))
            })
        };

        let (contribution, replaced) = match stored {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(cleanup) = self.uploads.remove(&file_ref).await {
                    warn!(file = %file_ref, error = %cleanup, "Failed to remove orphaned upload");
                }
                return Err(e.into());
            }
        };

        if let Some(old) = &replaced {
            if let Err(e) = self.uploads.remove(old).await {
                warn!(file = %old, error = %e, "Failed to remove superseded upload");
            }
        }

        info!(
            session = %session_id,
            user = %user,
            day = %contribution.day,
            replaced = replaced.is_some(),
            "Contribution stored"
        );
        Ok(ContributionOutcome {
            contribution,
            replaced: replaced.is_some(),
        })
    }

    /// Delete every contribution of one occurrence. Owner only. Returns the
    /// number of removed contributions.
    pub async fn clear_occurrence(
        &self,
        session_id: SessionId,
        user: UserId,
        day: Option<NaiveDate>,
    ) -> Result<usize, ServerError> {
        let removed = {
            let db = self.db.lock().await;
            db.in_transaction(|db| {
                let session = load_session(db, session_id)?;
                if !db.is_owner(session_id, user)? {
                    return Err(ServerError::from(SessionError::NotOwner));
                }
                let day = day
                    .or_else(|| session.occurrence_day())
                    .ok_or_else(|| ServerError::BadRequest("Session has no occurrence yet".into()))?;
                Ok(db.delete_contributions(session_id, day)?)
            })?
        };

        for file_ref in &removed {
            if let Err(e) = self.uploads.remove(file_ref).await {
                warn!(file = %file_ref, error = %e, "Failed to remove cleared upload");
            }
        }
        info!(session = %session_id, removed = removed.len(), "Occurrence cleared");
        Ok(removed.len())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_session(&self, session_id: SessionId) -> Result<SessionRecord, StoreError> {
        let db = self.db.lock().await;
        load_session(&db, session_id)
    }

    pub async fn get_session_by_token(&self, token: &InvitationToken) -> Result<SessionRecord, StoreError> {
        let db = self.db.lock().await;
        db.get_session_by_token(token)
            .map_err(missing(SessionError::SessionNotFound))
    }

    pub async fn list_sessions_by_owner(
        &self,
        owner: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let db = self.db.lock().await;
        db.list_sessions_by_owner(owner, limit, offset)
    }

    pub async fn list_members(&self, session_id: SessionId) -> Result<Vec<MemberRecord>, StoreError> {
        let db = self.db.lock().await;
        load_session(&db, session_id)?;
        db.list_members(session_id)
    }

    pub async fn get_result(&self, session_id: SessionId) -> Result<ResultRecord, StoreError> {
        let db = self.db.lock().await;
        load_session(&db, session_id)?;
        db.get_result_by_session(session_id)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Start the countdown if every member of a `ready_check` session is
    /// ready, binding the first template laid out for the member count or a
    /// generated grid when the catalog has none.
    fn advance_if_all_ready(
        &self,
        db: &Database,
        session: SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<(SessionRecord, bool), StoreError> {
        let ready = db.count_ready_members(session.id)?;
        if !session.should_auto_advance(ready) {
            return Ok((session, false));
        }

        let template = self.catalog.layout_for_count(session.current_member_count);

        let Some(advanced) = session.auto_advance(ready, &template.id, self.countdown, now)? else {
            return Ok((session, false));
        };
        db.update_session(&advanced.record, SessionStatus::ReadyCheck)?;

        if let SessionEvent::CountdownStarted {
            template_id,
            scheduled_capture_at,
        } = &advanced.event
        {
            info!(
                session = %session.id,
                template = %template_id,
                capture_at = %scheduled_capture_at,
                "Everyone ready, countdown started"
            );
        }
        Ok((advanced.record, true))
    }
}

/// Day under which `user` may contribute to the session right now.
fn contribution_day(db: &Database, session_id: SessionId, user: UserId) -> Result<NaiveDate, StoreError> {
    let session = load_session(db, session_id)?;
    load_member(db, session_id, user)?;
    if !session.status.accepts_contributions() {
        return Err(SessionError::WrongPhase {
            expected: SessionStatus::Countdown,
            actual: session.status,
        }
        .into());
    }
    session.occurrence_day().ok_or_else(|| {
        SessionError::WrongPhase {
            expected: SessionStatus::Countdown,
            actual: session.status,
        }
        .into()
    })
}

fn load_session(db: &Database, id: SessionId) -> Result<SessionRecord, StoreError> {
    db.get_session(id).map_err(missing(SessionError::SessionNotFound))
}

fn load_member(db: &Database, session: SessionId, user: UserId) -> Result<MemberRecord, StoreError> {
    db.get_member(session, user).map_err(missing(SessionError::MemberNotFound))
}

/// Turn a bare `NotFound` into the named domain error.
fn missing(named: SessionError) -> impl FnOnce(StoreError) -> StoreError {
    move |e| match e {
        StoreError::NotFound => StoreError::Domain(named),
        other => other,
    }
}
