/// Data Transfer Objects (DTOs) for REST API endpoints
use serde::{Deserialize, Serialize};

use crate::app_state::{SessionStatus, TerminalSession};

/// Request DTO for creating a new terminal session
///
/// Sizes are signed so that out of range values reach validation instead of
/// failing deserialization.
#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// User ID associated with this session
    #[serde(default)]
    pub user_id: String,

    /// Optional title for the session
    pub title: Option<String>,

    /// Optional working directory for the terminal
    pub working_directory: Option<String>,

    /// Optional shell type to use
    pub shell_type: Option<String>,

    /// Optional terminal columns
    pub columns: Option<i64>,

    /// Optional terminal rows
    pub rows: Option<i64>,
}

/// Request DTO for resizing a terminal session
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ResizeTerminalRequest {
    /// New terminal columns
    pub columns: Option<i64>,

    /// New terminal rows
    pub rows: Option<i64>,
}

/// Query string of the session list endpoint
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionListQuery {
    pub user_id: Option<String>,
}

/// Response DTO for a terminal session
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub status: SessionStatus,
    pub columns: u16,
    pub rows: u16,
    pub working_directory: String,
    pub shell_type: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub last_active_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<u64>,
}

impl From<&TerminalSession> for SessionResponse {
    fn from(session: &TerminalSession) -> Self {
        Self {
            id: session.id().to_string(),
            user_id: session.user_id().to_string(),
            title: session.title().map(str::to_string),
            status: session.status(),
            columns: session.terminal_size().columns(),
            rows: session.terminal_size().rows(),
            working_directory: session.working_directory().to_string(),
            shell_type: session.shell_type().to_string(),
            created_at: session.created_at(),
            updated_at: session.updated_at(),
            last_active_time: session.last_active_time(),
            expired_at: session.expired_at(),
        }
    }
}

/// Response DTO for terminal resize operation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResizeResponse {
    pub session_id: String,
    pub columns: u16,
    pub rows: u16,
    pub status: String,
}

/// Response DTO for terminal termination operation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalTerminateResponse {
    pub session_id: String,
    pub status: String,
    pub reason: String,
}

/// Error body shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub message: String,
    pub code: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub sessions: usize,
    pub processes: usize,
}
