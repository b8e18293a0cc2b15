//! Background composition worker.
//!
//! Polls the store on a fixed interval. Each tick expires overdue sessions,
//! moves sessions whose countdown ran out into `photo_taking`, and composes
//! the collage for every session whose members have all contributed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use groupsnap_media::{compose, encode_jpeg, ComposeError};
use groupsnap_shared::collage::ResultRecord;
use groupsnap_shared::error::SessionError;
use groupsnap_shared::session::SessionRecord;
use groupsnap_shared::template::TemplateCatalog;
use groupsnap_shared::types::SessionStatus;
use groupsnap_store::StoreError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::SharedDb;
use crate::error::ServerError;
use crate::upload_store::UploadStore;

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub expired: usize,
    pub captured: usize,
    pub completed: usize,
    /// Sessions still short of contributions.
    pub waiting: usize,
    /// Sessions left for a later tick after a problem.
    pub skipped: usize,
}

impl TickReport {
    fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Completed,
    Waiting { uploaded: u32, expected: u32 },
    Skipped,
}

pub struct CompositionWorker {
    db: SharedDb,
    catalog: Arc<TemplateCatalog>,
    uploads: Arc<UploadStore>,
    poll_interval: Duration,
    jpeg_quality: u8,
}

impl CompositionWorker {
    pub fn new(
        db: SharedDb,
        catalog: Arc<TemplateCatalog>,
        uploads: Arc<UploadStore>,
        poll_interval: Duration,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            db,
            catalog,
            uploads,
            poll_interval,
            jpeg_quality,
        }
    }

    /// Tick until `cancel` fires. A tick in progress finishes its current
    /// session before the loop exits.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.poll_interval, "Starting composition worker");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let report = self.tick(Utc::now(), &cancel).await;
            if !report.is_idle() {
                debug!(?report, "Worker tick");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("Composition worker shutting down");
    }

    /// One pass over the store at time `now`.
    pub async fn tick(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> TickReport {
        let mut report = TickReport::default();

        match self.sweep_expired(now).await {
            Ok(n) => report.expired = n,
            Err(e) => warn!(error = %e, "Expiry sweep failed"),
        }
        match self.sweep_captures(now).await {
            Ok(n) => report.captured = n,
            Err(e) => warn!(error = %e, "Capture sweep failed"),
        }

        let candidates = {
            let db = self.db.lock().await;
            let mut sessions = match db.list_sessions_by_status(SessionStatus::Countdown) {
                Ok(sessions) => sessions,
                Err(e) => {
                    warn!(error = %e, "Failed to list sessions in countdown");
                    return report;
                }
            };
            match db.list_sessions_by_status(SessionStatus::PhotoTaking) {
                Ok(more) => sessions.extend(more),
                Err(e) => warn!(error = %e, "Failed to list sessions taking photos"),
            }
            sessions
        };

        for session in &candidates {
            if cancel.is_cancelled() {
                debug!("Cancellation requested, leaving remaining sessions");
                break;
            }
            match self.try_complete(session, now).await {
                Ok(Completion::Completed) => report.completed += 1,
                Ok(Completion::Waiting { uploaded, expected }) => {
                    debug!(session = %session.id, uploaded, expected, "Waiting for contributions");
                    report.waiting += 1;
                }
                Ok(Completion::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(session = %session.id, error = %e, "Composition failed, retrying next tick");
                    report.skipped += 1;
                }
            }
        }

        report
    }

    // ------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let db = self.db.lock().await;
        let mut expired = 0;
        for session in db.list_expired_sessions(now)? {
            let t = session.expire(now);
            match db.update_session(&t.record, session.status) {
                Ok(()) => {
                    info!(session = %session.id, previous = %session.status.as_str(), "Session expired");
                    expired += 1;
                }
                Err(e) => warn!(session = %session.id, error = %e, "Failed to expire session"),
            }
        }
        Ok(expired)
    }

    async fn sweep_captures(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let db = self.db.lock().await;
        let mut captured = 0;
        for session in db.list_sessions_by_status(SessionStatus::Countdown)? {
            if !session.capture_due(now) {
                continue;
            }
            let t = session.start_photo_taking(now)?;
            match db.update_session(&t.record, SessionStatus::Countdown) {
                Ok(()) => {
                    info!(session = %session.id, "Capture time reached");
                    captured += 1;
                }
                Err(e) => warn!(session = %session.id, error = %e, "Failed to start photo taking"),
            }
        }
        Ok(captured)
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    async fn try_complete(&self, session: &SessionRecord, now: DateTime<Utc>) -> Result<Completion, ServerError> {
        let Some(day) = session.occurrence_day() else {
            warn!(session = %session.id, "Session has no countdown start");
            return Ok(Completion::Skipped);
        };

        let contributions = {
            let db = self.db.lock().await;
            db.list_contributions(session.id, day)?
        };
        let expected = session.current_member_count;
        let uploaded = contributions.len() as u32;
        if uploaded < expected {
            return Ok(Completion::Waiting { uploaded, expected });
        }

        let bound = session.template_id.as_deref().unwrap_or_default();
        let template = self
            .catalog
            .resolve(bound)
            .ok_or_else(|| SessionError::TemplateNotFound(bound.to_string()))?;
        if uploaded > template.photo_count {
            warn!(
                session = %session.id,
                template = %template.id,
                uploaded,
                capacity = template.photo_count,
                "More contributions than the template holds"
            );
            return Ok(Completion::Skipped);
        }

        let mut sources = Vec::with_capacity(contributions.len());
        for contribution in &contributions {
            sources.push(self.uploads.read(&contribution.file_ref).await?);
        }

        let template_id = template.id.clone();
        let layout = template.into_owned();
        let quality = self.jpeg_quality;
        let jpeg = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ComposeError> {
            let canvas = compose(&layout, &sources)?;
            encode_jpeg(&canvas, quality)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("Composition task failed: {e}")))??;

        let file_ref = self.uploads.store_result(session.id, &jpeg).await?;

        let finished = {
            let db = self.db.lock().await;
            db.in_transaction(|db| {
                let current = db.get_session(session.id)?;
                let taking = match current.status {
                    SessionStatus::Countdown => current.start_photo_taking(now)?.record,
                    _ => current.clone(),
                };
                let done = taking.complete(now)?;
                let result = ResultRecord::new(session.id, &template_id, file_ref.clone(), uploaded, now)?;
                db.insert_result(&result)?;
                db.update_session(&done.record, current.status)?;
                Ok::<_, StoreError>(result)
            })
        };

        match finished {
            Ok(result) => {
                info!(
                    session = %session.id,
                    template = %template_id,
                    contributions = uploaded,
                    file = %result.file_ref,
                    "Session completed"
                );
                Ok(Completion::Completed)
            }
            Err(e) => {
                if let Err(cleanup) = self.uploads.remove(&file_ref).await {
                    error!(file = %file_ref, error = %cleanup, "Failed to remove unrecorded collage");
                }
                Err(e.into())
            }
        }
    }
}
