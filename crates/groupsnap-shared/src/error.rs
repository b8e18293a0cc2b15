use thiserror::Error;

use crate::types::SessionStatus;

/// Guard and validation failures of the session lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session name must be 1-15 characters")]
    InvalidName,

    #[error("Invalid session kind: {0}")]
    InvalidKind(String),

    #[error("Invalid session status: {0}")]
    InvalidStatus(String),

    #[error("Member capacity must be between 1 and 100")]
    InvalidMaxMember,

    #[error("Invalid member count")]
    InvalidMemberCount,

    #[error("Invalid file reference")]
    InvalidFileRef,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Session is {actual}, expected {expected}")]
    WrongPhase {
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("Member is already ready")]
    AlreadyReady,

    #[error("Member is not ready")]
    NotReady,

    #[error("Session is full")]
    Full,

    #[error("Session has expired")]
    Expired,

    #[error("Session has no members")]
    NoMembers,

    #[error("Only the session owner can do this")]
    NotOwner,

    #[error("The session owner cannot leave")]
    OwnerCannotLeave,

    #[error("User is already a member of this session")]
    MemberAlreadyExists,
}

/// Problems loading the template catalog.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Template {id} is invalid: {reason}")]
    Invalid { id: String, reason: String },

    #[error("Duplicate template id: {0}")]
    Duplicate(String),
}
