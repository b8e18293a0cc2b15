//! REST and WebSocket surface of the session server.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use futures::StreamExt;
use groupsnap_shared::contribution::ContributionRecord;
use groupsnap_shared::invite::InvitationToken;
use groupsnap_shared::member::MemberRecord;
use groupsnap_shared::session::SessionRecord;
use groupsnap_shared::template::{Template, TemplateCatalog};
use groupsnap_shared::types::{SessionId, SessionKind, UserId};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::coordinator::SessionCoordinator;
use crate::error::ServerError;
use crate::status::{PushIntervals, StatusReporter, UploadStatus};
use crate::upload_store::UploadStore;

/// Header carrying the acting user's id.
pub const USER_HEADER: &str = "x-user-id";

/// Room for multipart framing on top of the photo itself.
const MULTIPART_SLACK: usize = 64 * 1024;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    pub status: StatusReporter,
    pub catalog: Arc<TemplateCatalog>,
    pub uploads: Arc<UploadStore>,
    pub config: Arc<ServerConfig>,
    /// Fires on server shutdown; push connections hang child tokens off it.
    pub shutdown: CancellationToken,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let body_limit = state.uploads.max_size() + MULTIPART_SLACK;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/templates", get(list_templates))
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/by-token/:token", get(get_session_by_token))
        .route("/api/sessions/join/:token", post(join_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/finalize", post(finalize_members))
        .route("/api/sessions/:id/ready", post(mark_ready).delete(cancel_ready))
        .route("/api/sessions/:id/leave", post(leave_session))
        .route("/api/sessions/:id/members", get(list_members))
        .route(
            "/api/sessions/:id/contributions",
            post(upload_contribution).delete(clear_contributions),
        )
        .route("/api/sessions/:id/status", get(upload_status))
        .route("/api/sessions/:id/status/ws", get(status_socket))
        .route("/api/sessions/:id/result", get(download_result))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Identity of the caller, taken from [`USER_HEADER`].
fn acting_user(headers: &HeaderMap) -> Result<UserId, ServerError> {
    let raw = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::BadRequest("Missing X-User-Id header".into()))?;
    UserId::parse(raw.trim()).map_err(|_| ServerError::BadRequest("Invalid X-User-Id header".into()))
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct TemplateQuery {
    photo_count: Option<u32>,
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    name: String,
    kind: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ListQuery {
    owner: Option<Uuid>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
struct ClearQuery {
    day: Option<NaiveDate>,
}

#[derive(Serialize)]
struct JoinResponse {
    session: SessionRecord,
    member: MemberRecord,
}

#[derive(Serialize)]
struct ReadyResponse {
    session: SessionRecord,
    member: MemberRecord,
    countdown_started: bool,
}

#[derive(Serialize)]
struct ContributionResponse {
    contribution: ContributionRecord,
    replaced: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
) -> Json<Vec<Template>> {
    let templates = match query.photo_count {
        Some(n) => state.catalog.with_photo_count(n).into_iter().cloned().collect(),
        None => state.catalog.list().to_vec(),
    };
    Json(templates)
}

async fn create_session(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionRecord>), ServerError> {
    let owner = acting_user(&headers)?;
    let kind = match req.kind.as_deref() {
        Some(raw) => raw.parse::<SessionKind>()?,
        None => SessionKind::default(),
    };

    let session = state
        .coordinator
        .create_session(owner, &req.name, kind, req.expires_at)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SessionRecord>>, ServerError> {
    let owner = match query.owner {
        Some(id) => UserId(id),
        None => acting_user(&headers)?,
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let sessions = state
        .coordinator
        .list_sessions_by_owner(owner, limit, offset)
        .await?;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionRecord>, ServerError> {
    Ok(Json(state.coordinator.get_session(SessionId(id)).await?))
}

async fn get_session_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SessionRecord>, ServerError> {
    let token = InvitationToken::from_raw(token);
    Ok(Json(state.coordinator.get_session_by_token(&token).await?))
}

async fn delete_session(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let user = acting_user(&headers)?;
    state.coordinator.delete_session(SessionId(id), user).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn join_session(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<JoinResponse>, ServerError> {
    let user = acting_user(&headers)?;
    let token = InvitationToken::from_raw(token);
    let (session, member) = state.coordinator.join_session(&token, user).await?;
    Ok(Json(JoinResponse { session, member }))
}

async fn finalize_members(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionRecord>, ServerError> {
    let user = acting_user(&headers)?;
    Ok(Json(state.coordinator.finalize_members(SessionId(id), user).await?))
}

async fn mark_ready(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReadyResponse>, ServerError> {
    let user = acting_user(&headers)?;
    let outcome = state.coordinator.mark_ready(SessionId(id), user).await?;
    Ok(Json(ReadyResponse {
        session: outcome.session,
        member: outcome.member,
        countdown_started: outcome.countdown_started,
    }))
}

async fn cancel_ready(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MemberRecord>, ServerError> {
    let user = acting_user(&headers)?;
    Ok(Json(state.coordinator.cancel_ready(SessionId(id), user).await?))
}

async fn leave_session(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionRecord>, ServerError> {
    let user = acting_user(&headers)?;
    Ok(Json(state.coordinator.leave_session(SessionId(id), user).await?))
}

async fn list_members(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MemberRecord>>, ServerError> {
    Ok(Json(state.coordinator.list_members(SessionId(id)).await?))
}

async fn upload_contribution(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ContributionResponse>), ServerError> {
    let user = acting_user(&headers)?;
    let max = state.uploads.max_size();

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, max))? {
        if field.name() != Some("file") {
            continue;
        }
        let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;

        let outcome = state
            .coordinator
            .submit_contribution(SessionId(id), user, &data)
            .await?;
        return Ok((
            StatusCode::CREATED,
            Json(ContributionResponse {
                contribution: outcome.contribution,
                replaced: outcome.replaced,
            }),
        ));
    }

    Err(ServerError::BadRequest(
        "Missing 'file' field in multipart form".to_string(),
    ))
}

fn multipart_error(e: axum::extract::multipart::MultipartError, max: usize) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::UploadTooLarge {
            size: max + MULTIPART_SLACK,
            max,
        }
    } else {
        ServerError::BadRequest(format!("Multipart error: {}", e.body_text()))
    }
}

async fn clear_contributions(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let user = acting_user(&headers)?;
    let removed = state
        .coordinator
        .clear_occurrence(SessionId(id), user, query.day)
        .await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

async fn upload_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UploadStatus>, ServerError> {
    Ok(Json(state.status.check(SessionId(id)).await?))
}

async fn status_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServerError> {
    let session_id = SessionId(id);
    // unknown sessions are refused before the upgrade
    state.coordinator.get_session(session_id).await?;

    Ok(ws.on_upgrade(move |socket| push_status(socket, state, session_id)))
}

async fn push_status(socket: WebSocket, state: AppState, session_id: SessionId) {
    let (sink, stream) = socket.split();
    let intervals = PushIntervals {
        status: state.config.status_push_interval,
        keepalive: state.config.keepalive_interval,
    };

    info!(session = %session_id, "Status push connected");
    let end = state
        .status
        .push(session_id, sink, stream, intervals, state.shutdown.child_token())
        .await;
    debug!(session = %session_id, ?end, "Status push closed");
}

async fn download_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServerError> {
    let result = state.coordinator.get_result(SessionId(id)).await?;
    let data = state.uploads.read(&result.file_ref).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], data).into_response())
}

pub async fn serve(
    state: AppState,
    addr: std::net::SocketAddr,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("HTTP API server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::{catalog, png};
    use crate::coordinator::SharedDb;
    use crate::worker::CompositionWorker;
    use axum::body::Body;
    use axum::http::Request;
    use groupsnap_store::Database;
    use tempfile::TempDir;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        db: SharedDb,
        uploads: Arc<UploadStore>,
        _dir: TempDir,
    }

    async fn app() -> TestApp {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            max_upload_size: 256 * 1024,
            ..ServerConfig::default()
        };
        let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let catalog = Arc::new(catalog());
        let uploads = Arc::new(
            UploadStore::new(dir.path().join("uploads"), config.max_upload_size)
                .await
                .unwrap(),
        );
        let coordinator = Arc::new(SessionCoordinator::new(
            db.clone(),
            catalog.clone(),
            uploads.clone(),
            config.countdown,
        ));
        let state = AppState {
            coordinator,
            status: StatusReporter::new(db.clone()),
            catalog,
            uploads: uploads.clone(),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        };
        TestApp {
            router: build_router(state),
            db,
            uploads,
            _dir: dir,
        }
    }

    async fn call(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn call_json(app: &TestApp, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = call(app, request).await;
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn request(method: &str, uri: &str, user: Option<UserId>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match user {
            Some(user) => builder.header(USER_HEADER, user.to_string()),
            None => builder,
        }
    }

    fn empty(method: &str, uri: &str, user: UserId) -> Request<Body> {
        request(method, uri, Some(user)).body(Body::empty()).unwrap()
    }

    fn json_body(method: &str, uri: &str, user: Option<UserId>, body: serde_json::Value) -> Request<Body> {
        request(method, uri, user)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload(uri: &str, user: UserId, data: &[u8]) -> Request<Body> {
        let boundary = "groupsnap-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        request("POST", uri, Some(user))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn create(app: &TestApp, owner: UserId, name: &str) -> serde_json::Value {
        let (status, json) = call_json(
            app,
            json_body("POST", "/api/sessions", Some(owner), serde_json::json!({ "name": name })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json
    }

    #[tokio::test]
    async fn health() {
        let app = app().await;
        let (status, json) = call_json(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn templates_filter_by_photo_count() {
        let app = app().await;
        let (_, all) = call_json(&app, Request::get("/api/templates").body(Body::empty()).unwrap()).await;
        assert_eq!(all.as_array().unwrap().len(), 4);

        let (_, trios) = call_json(
            &app,
            Request::get("/api/templates?photo_count=3").body(Body::empty()).unwrap(),
        )
        .await;
        let ids: Vec<&str> = trios
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["trio", "trio-alt"]);
    }

    #[tokio::test]
    async fn create_requires_identity_and_valid_input() {
        let app = app().await;
        let (status, json) = call_json(
            &app,
            json_body("POST", "/api/sessions", None, serde_json::json!({ "name": "trip" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("X-User-Id"));

        let (status, _) = call_json(
            &app,
            json_body(
                "POST",
                "/api/sessions",
                Some(UserId::new()),
                serde_json::json!({ "name": "trip", "kind": "forever" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call_json(
            &app,
            json_body(
                "POST",
                "/api/sessions",
                Some(UserId::new()),
                serde_json::json!({ "name": "" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let app = app().await;
        let uri = format!("/api/sessions/{}", Uuid::new_v4());
        let (status, json) = call_json(&app, empty("GET", &uri, UserId::new())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Session not found");

        let (status, _) = call_json(&app, empty("GET", "/api/sessions/by-token/nope", UserId::new())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn only_the_owner_finalizes_and_deletes() {
        let app = app().await;
        let owner = UserId::new();
        let guest = UserId::new();
        let session = create(&app, owner, "trip").await;
        let id = session["id"].as_str().unwrap();
        let token = session["invitation_token"].as_str().unwrap();

        let (status, json) = call_json(&app, empty("POST", &format!("/api/sessions/join/{token}"), guest)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["session"]["current_member_count"], 2);

        let (status, _) = call_json(&app, empty("POST", &format!("/api/sessions/{id}/finalize"), guest)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call_json(&app, empty("DELETE", &format!("/api/sessions/{id}"), guest)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call_json(&app, empty("POST", &format!("/api/sessions/{id}/leave"), owner)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = call_json(&app, empty("DELETE", &format!("/api/sessions/{id}"), owner)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["deleted"], true);
    }

    #[tokio::test]
    async fn listing_by_owner() {
        let app = app().await;
        let owner = UserId::new();
        create(&app, owner, "one").await;
        create(&app, owner, "two").await;
        create(&app, UserId::new(), "other").await;

        let (status, json) = call_json(&app, empty("GET", "/api/sessions", owner)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 2);

        let uri = format!("/api/sessions?owner={}&limit=1", owner);
        let (_, json) = call_json(&app, empty("GET", &uri, UserId::new())).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upload_rules() {
        let app = app().await;
        let owner = UserId::new();
        let session = create(&app, owner, "solo").await;
        let id = session["id"].as_str().unwrap();
        let uri = format!("/api/sessions/{id}/contributions");

        // still recruiting
        let (status, _) = call_json(&app, upload(&uri, owner, &png([1, 2, 3]))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        call_json(&app, empty("POST", &format!("/api/sessions/{id}/finalize"), owner)).await;
        let (_, ready) = call_json(&app, empty("POST", &format!("/api/sessions/{id}/ready"), owner)).await;
        assert_eq!(ready["countdown_started"], true);

        let (status, _) = call_json(&app, upload(&uri, owner, b"not an image")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call_json(&app, upload(&uri, UserId::new(), &png([1, 2, 3]))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = call_json(&app, upload(&uri, owner, &png([1, 2, 3]))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["replaced"], false);
    }

    #[tokio::test]
    async fn full_session_flow_produces_a_collage() {
        let app = app().await;
        let owner = UserId::new();
        let guest = UserId::new();
        let session = create(&app, owner, "dinner").await;
        let id = session["id"].as_str().unwrap().to_string();
        let token = session["invitation_token"].as_str().unwrap();

        call_json(&app, empty("POST", &format!("/api/sessions/join/{token}"), guest)).await;
        let (status, json) = call_json(&app, empty("POST", &format!("/api/sessions/{id}/finalize"), owner)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ready_check");

        let (_, json) = call_json(&app, empty("POST", &format!("/api/sessions/{id}/ready"), owner)).await;
        assert_eq!(json["countdown_started"], false);
        let (_, json) = call_json(&app, empty("POST", &format!("/api/sessions/{id}/ready"), guest)).await;
        assert_eq!(json["countdown_started"], true);
        assert_eq!(json["session"]["template_id"], "duo");

        let (status, members) = call_json(&app, empty("GET", &format!("/api/sessions/{id}/members"), guest)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(members[0]["is_owner"], true);

        let uri = format!("/api/sessions/{id}/contributions");
        call_json(&app, upload(&uri, owner, &png([255, 0, 0]))).await;

        let (_, status_json) = call_json(&app, empty("GET", &format!("/api/sessions/{id}/status"), guest)).await;
        assert_eq!(status_json["uploaded"], 1);
        assert_eq!(status_json["expected"], 2);
        assert_eq!(status_json["phase"], "in_progress");

        call_json(&app, upload(&uri, guest, &png([0, 0, 255]))).await;
        let (_, status_json) = call_json(&app, empty("GET", &format!("/api/sessions/{id}/status"), guest)).await;
        assert_eq!(status_json["phase"], "completed");

        let (status, _) = call(&app, empty("GET", &format!("/api/sessions/{id}/result"), guest)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        CompositionWorker::new(
            app.db.clone(),
            Arc::new(catalog()),
            app.uploads.clone(),
            std::time::Duration::from_secs(10),
            90,
        )
        .tick(Utc::now(), &CancellationToken::new())
        .await;

        let response = app
            .router
            .clone()
            .oneshot(empty("GET", &format!("/api/sessions/{id}/result"), guest))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let collage = image::load_from_memory(&body).unwrap();
        assert_eq!((collage.width(), collage.height()), (40, 20));

        let (_, json) = call_json(&app, empty("GET", &format!("/api/sessions/{id}"), guest)).await;
        assert_eq!(json["status"], "completed");
    }

    #[tokio::test]
    async fn owner_clears_an_occurrence() {
        let app = app().await;
        let owner = UserId::new();
        let session = create(&app, owner, "solo").await;
        let id = session["id"].as_str().unwrap();

        call_json(&app, empty("POST", &format!("/api/sessions/{id}/finalize"), owner)).await;
        call_json(&app, empty("POST", &format!("/api/sessions/{id}/ready"), owner)).await;
        let uri = format!("/api/sessions/{id}/contributions");
        call_json(&app, upload(&uri, owner, &png([1, 1, 1]))).await;

        let (status, json) = call_json(&app, empty("DELETE", &uri, owner)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["removed"], 1);
    }
}
