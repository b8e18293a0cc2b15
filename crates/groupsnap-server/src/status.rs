//! Upload progress of a session, pulled on request or pushed over a
//! WebSocket.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use groupsnap_shared::error::SessionError;
use groupsnap_shared::types::{SessionId, SessionStatus};
use groupsnap_store::StoreError;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::coordinator::SharedDb;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadStatus {
    pub session_id: SessionId,
    pub session_status: SessionStatus,
    /// Members expected to contribute.
    pub expected: u32,
    /// Contributions stored for the current occurrence.
    pub uploaded: u32,
    pub phase: UploadPhase,
}

/// Frames sent on the push channel.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusMessage {
    Status(UploadStatus),
    Completed { message: String },
    Expired,
}

#[derive(Debug, Clone, Copy)]
pub struct PushIntervals {
    pub status: Duration,
    pub keepalive: Duration,
}

/// Why a push loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEnd {
    Completed,
    Expired,
    SessionGone,
    ClientClosed,
    SocketError,
    Cancelled,
}

#[derive(Clone)]
pub struct StatusReporter {
    db: SharedDb,
}

impl StatusReporter {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Current upload progress of a session.
    pub async fn check(&self, session_id: SessionId) -> Result<UploadStatus, StoreError> {
        let db = self.db.lock().await;
        let session = db.get_session(session_id).map_err(|e| match e {
            StoreError::NotFound => StoreError::Domain(SessionError::SessionNotFound),
            other => other,
        })?;

        let expected = session.current_member_count;
        let uploaded = match session.occurrence_day() {
            Some(day) => db.count_contributions(session_id, day)?,
            None => 0,
        };
        let phase = if session.status == SessionStatus::Completed || (expected > 0 && uploaded >= expected) {
            UploadPhase::Completed
        } else {
            UploadPhase::InProgress
        };

        Ok(UploadStatus {
            session_id,
            session_status: session.status,
            expected,
            uploaded,
            phase,
        })
    }

    /// Push the status of `session_id` into `sink` until uploads complete,
    /// the session expires, the client goes away or `cancel` fires.
    ///
    /// `incoming` is drained for close frames and errors only.
    pub async fn push<S, R, E>(
        &self,
        session_id: SessionId,
        mut sink: S,
        mut incoming: R,
        intervals: PushIntervals,
        cancel: CancellationToken,
    ) -> PushEnd
    where
        S: Sink<Message> + Unpin,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let mut status_tick = tokio::time::interval(intervals.status);
        let mut keepalive = tokio::time::interval(intervals.keepalive);
        // the first keepalive tick completes immediately
        keepalive.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return PushEnd::Cancelled;
                }
                _ = status_tick.tick() => {
                    let status = match self.check(session_id).await {
                        Ok(status) => status,
                        Err(StoreError::Domain(SessionError::SessionNotFound)) => {
                            let _ = sink.send(Message::Close(None)).await;
                            return PushEnd::SessionGone;
                        }
                        Err(e) => {
                            warn!(session = %session_id, error = %e, "Failed to check upload status");
                            continue;
                        }
                    };

                    let finished = match (status.session_status, status.phase) {
                        (SessionStatus::Expired, _) => Some((StatusMessage::Expired, PushEnd::Expired)),
                        (session_status, UploadPhase::Completed) => Some((
                            StatusMessage::Completed { message: completion_notice(session_status).to_string() },
                            PushEnd::Completed,
                        )),
                        _ => None,
                    };

                    if send_json(&mut sink, &StatusMessage::Status(status)).await.is_err() {
                        return PushEnd::SocketError;
                    }
                    if let Some((notice, end)) = finished {
                        debug!(session = %session_id, ?end, "Status push finished");
                        let _ = send_json(&mut sink, &notice).await;
                        let _ = sink.send(Message::Close(None)).await;
                        return end;
                    }
                }
                _ = keepalive.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        return PushEnd::SocketError;
                    }
                }
                frame = incoming.next() => match frame {
                    None | Some(Ok(Message::Close(_))) => return PushEnd::ClientClosed,
                    Some(Err(e)) => {
                        debug!(session = %session_id, error = %e, "Status socket error");
                        return PushEnd::SocketError;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}

fn completion_notice(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Completed => "Collage ready",
        _ => "All photos uploaded, composing collage",
    }
}

async fn send_json<S>(sink: &mut S, message: &StatusMessage) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let json = serde_json::to_string(message).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::{countdown, fixture, png, ready_check};
    use crate::worker::CompositionWorker;
    use chrono::Utc;
    use futures::channel::mpsc;
    use std::sync::Arc;

    fn fast() -> PushIntervals {
        PushIntervals {
            status: Duration::from_millis(10),
            keepalive: Duration::from_secs(30),
        }
    }

    fn texts(frames: &[Message]) -> Vec<serde_json::Value> {
        frames
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => Some(serde_json::from_str(t).unwrap()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn check_counts_current_occurrence() {
        let f = fixture().await;
        let (s, _) = ready_check(&f, 2).await;
        let reporter = StatusReporter::new(f.db.clone());

        let status = reporter.check(s.id).await.unwrap();
        assert_eq!(status.expected, 2);
        assert_eq!(status.uploaded, 0);
        assert_eq!(status.phase, UploadPhase::InProgress);

        let err = reporter.check(SessionId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(SessionError::SessionNotFound)));
    }

    #[tokio::test]
    async fn check_reports_completion_when_everyone_uploaded() {
        let f = fixture().await;
        let (s, users) = countdown(&f, 2).await;
        let reporter = StatusReporter::new(f.db.clone());

        f.coordinator.submit_contribution(s.id, users[0], &png([1, 0, 0])).await.unwrap();
        let status = reporter.check(s.id).await.unwrap();
        assert_eq!((status.uploaded, status.phase), (1, UploadPhase::InProgress));

        f.coordinator.submit_contribution(s.id, users[1], &png([0, 1, 0])).await.unwrap();
        let status = reporter.check(s.id).await.unwrap();
        assert_eq!((status.uploaded, status.phase), (2, UploadPhase::Completed));
    }

    #[test]
    fn messages_are_tagged() {
        let status = UploadStatus {
            session_id: SessionId::new(),
            session_status: SessionStatus::Countdown,
            expected: 3,
            uploaded: 1,
            phase: UploadPhase::InProgress,
        };
        let json = serde_json::to_value(StatusMessage::Status(status)).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["session_status"], "countdown");
        assert_eq!(json["phase"], "in_progress");

        let json = serde_json::to_value(StatusMessage::Expired).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "expired" }));
    }

    #[tokio::test]
    async fn push_ends_with_completed_notice() {
        let f = fixture().await;
        let (s, users) = countdown(&f, 1).await;
        f.coordinator.submit_contribution(s.id, users[0], &png([3, 3, 3])).await.unwrap();

        let worker = CompositionWorker::new(
            f.db.clone(),
            Arc::new(crate::coordinator::tests::catalog()),
            f.uploads.clone(),
            Duration::from_secs(10),
            90,
        );
        worker.tick(Utc::now(), &CancellationToken::new()).await;

        let (tx, rx) = mpsc::unbounded::<Message>();
        let reporter = StatusReporter::new(f.db.clone());
        let end = reporter
            .push(
                s.id,
                tx,
                futures::stream::pending::<Result<Message, std::io::Error>>(),
                fast(),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(end, PushEnd::Completed);

        let frames: Vec<Message> = rx.collect().await;
        let json = texts(&frames);
        assert_eq!(json.len(), 2);
        assert_eq!(json[0]["type"], "status");
        assert_eq!(json[0]["session_status"], "completed");
        assert_eq!(json[1]["type"], "completed");
        assert_eq!(json[1]["message"], "Collage ready");
        assert!(matches!(frames.last(), Some(Message::Close(None))));
    }

    #[test]
    fn completion_notice_follows_session_status() {
        assert_eq!(completion_notice(SessionStatus::Completed), "Collage ready");
        assert_eq!(
            completion_notice(SessionStatus::Countdown),
            "All photos uploaded, composing collage"
        );
        assert_eq!(
            completion_notice(SessionStatus::PhotoTaking),
            "All photos uploaded, composing collage"
        );
    }

    #[tokio::test]
    async fn push_sends_keepalive_pings() {
        let f = fixture().await;
        let (s, _) = ready_check(&f, 2).await;
        let reporter = StatusReporter::new(f.db.clone());

        let (tx, rx) = mpsc::unbounded::<Message>();
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            stopper.cancel();
        });

        let intervals = PushIntervals {
            status: Duration::from_secs(3600),
            keepalive: Duration::from_millis(10),
        };
        let end = reporter
            .push(
                s.id,
                tx,
                futures::stream::pending::<Result<Message, std::io::Error>>(),
                intervals,
                cancel,
            )
            .await;
        assert_eq!(end, PushEnd::Cancelled);

        let frames: Vec<Message> = rx.collect().await;
        let pings = frames.iter().filter(|m| matches!(m, Message::Ping(_))).count();
        assert!(pings >= 2, "expected repeated pings, got {pings}");
        // only the immediate first status tick fires within the window
        assert_eq!(texts(&frames).len(), 1);
    }

    #[tokio::test]
    async fn failed_ping_ends_the_push() {
        let f = fixture().await;
        let (s, _) = ready_check(&f, 2).await;
        let reporter = StatusReporter::new(f.db.clone());

        let (tx, rx) = mpsc::unbounded::<Message>();
        let sink = Box::pin(futures::sink::unfold(
            tx,
            |tx: mpsc::UnboundedSender<Message>, msg: Message| async move {
                if matches!(msg, Message::Ping(_)) {
                    return Err("ping refused");
                }
                tx.unbounded_send(msg).map_err(|_| "receiver gone")?;
                Ok(tx)
            },
        ));

        let intervals = PushIntervals {
            status: Duration::from_secs(3600),
            keepalive: Duration::from_millis(10),
        };
        let end = tokio::time::timeout(
            Duration::from_secs(2),
            reporter.push(
                s.id,
                sink,
                futures::stream::pending::<Result<Message, std::io::Error>>(),
                intervals,
                CancellationToken::new(),
            ),
        )
        .await
        .unwrap();
        assert_eq!(end, PushEnd::SocketError);

        let frames: Vec<Message> = rx.collect().await;
        assert_eq!(texts(&frames).len(), 1);
    }

    #[tokio::test]
    async fn push_reports_progress_until_cancelled() {
        let f = fixture().await;
        let (s, _) = countdown(&f, 2).await;
        let reporter = StatusReporter::new(f.db.clone());

        let (tx, rx) = mpsc::unbounded::<Message>();
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            stopper.cancel();
        });

        let end = reporter
            .push(
                s.id,
                tx,
                futures::stream::pending::<Result<Message, std::io::Error>>(),
                fast(),
                cancel,
            )
            .await;
        assert_eq!(end, PushEnd::Cancelled);

        let frames: Vec<Message> = rx.collect().await;
        let json = texts(&frames);
        assert!(!json.is_empty());
        assert!(json.iter().all(|m| m["type"] == "status" && m["uploaded"] == 0));
    }

    #[tokio::test]
    async fn push_stops_when_client_closes() {
        let f = fixture().await;
        let (s, _) = ready_check(&f, 2).await;
        let reporter = StatusReporter::new(f.db.clone());

        let (tx, _rx) = mpsc::unbounded::<Message>();
        let incoming = futures::stream::iter(vec![Ok::<_, std::io::Error>(Message::Close(None))]);
        let end = reporter
            .push(s.id, tx, incoming, fast(), CancellationToken::new())
            .await;
        assert_eq!(end, PushEnd::ClientClosed);
    }

    #[tokio::test]
    async fn push_sends_expired_notice() {
        let f = fixture().await;
        let (s, _) = ready_check(&f, 2).await;
        f.db
            .lock()
            .await
            .update_session_status(s.id, SessionStatus::Expired, Utc::now())
            .unwrap();

        let (tx, rx) = mpsc::unbounded::<Message>();
        let end = StatusReporter::new(f.db.clone())
            .push(
                s.id,
                tx,
                futures::stream::pending::<Result<Message, std::io::Error>>(),
                fast(),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(end, PushEnd::Expired);
        let json = texts(&rx.collect::<Vec<_>>().await);
        assert_eq!(json.last().unwrap()["type"], "expired");
    }
}
