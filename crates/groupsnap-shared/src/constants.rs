/// Application name
pub const APP_NAME: &str = "groupsnap";

/// Capacity every session starts with, before finalization locks it in
pub const SYSTEM_MAX_MEMBER: u32 = 100;

/// Session display names are limited by character count, not bytes
pub const SESSION_NAME_MAX_CHARS: usize = 15;

/// Maximum length of a stored contribution / result file reference
pub const MAX_FILE_REF_LEN: usize = 500;

/// Random bytes behind an invitation token
pub const INVITATION_TOKEN_BYTES: usize = 18;

/// Composition worker poll interval in seconds
pub const DEFAULT_WORKER_POLL_SECS: u64 = 10;

/// Delay between the last ready signal and the scheduled capture, in seconds
pub const DEFAULT_COUNTDOWN_SECS: u64 = 10;

/// Status push interval for WebSocket clients, in seconds
pub const DEFAULT_STATUS_PUSH_SECS: u64 = 2;

/// WebSocket keepalive ping interval, in seconds
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;

/// Maximum contribution upload size in bytes (20 MiB)
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 20 * 1024 * 1024;

/// JPEG quality of composed results
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
