use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use groupsnap_media::ComposeError;
use groupsnap_shared::error::SessionError;
use groupsnap_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Upload too large: {size} bytes (max {max})")]
    UploadTooLarge { size: usize, max: usize },

    #[error("Photos must be PNG or JPEG")]
    UnsupportedMedia,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Composition failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Domain(e) => ServerError::Session(e),
            StoreError::NotFound => ServerError::NotFound("Record not found".into()),
            other => ServerError::Store(other),
        }
    }
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Session(e) => session_status(e),
            ServerError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
            ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::UnsupportedMedia | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Storage(_) | ServerError::Compose(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn session_status(e: &SessionError) -> StatusCode {
    use SessionError::*;
    match e {
        InvalidName | InvalidKind(_) | InvalidStatus(_) | InvalidMaxMember | InvalidMemberCount
        | InvalidFileRef => StatusCode::BAD_REQUEST,
        SessionNotFound | MemberNotFound | TemplateNotFound(_) => StatusCode::NOT_FOUND,
        NotOwner | OwnerCannotLeave => StatusCode::FORBIDDEN,
        WrongPhase { .. } | AlreadyReady | NotReady | Full | Expired | NoMembers
        | MemberAlreadyExists => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
