/// REST API handlers for terminal session management
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use tracing::info;

use crate::{
    api::dto::{
        CreateSessionRequest, HealthResponse, ResizeTerminalRequest, SessionListQuery, SessionResponse,
        TerminalResizeResponse, TerminalTerminateResponse,
    },
    app_state::AppState,
    config::TerminalSize,
    service::{CreateSessionParams, ServiceError},
};

/// Both dimensions or neither
fn requested_size(columns: Option<i64>, rows: Option<i64>) -> Result<Option<TerminalSize>, ServiceError> {
    match (columns, rows) {
        (None, None) => Ok(None),
        (Some(columns), Some(rows)) => TerminalSize::from_dimensions(columns, rows)
            .map(Some)
            .map_err(|e| ServiceError::InvalidParameter(e.to_string())),
        _ => Err(ServiceError::InvalidParameter(
            "columns and rows must be given together".to_string(),
        )),
    }
}

/// Create a new terminal session
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ServiceError> {
    info!("Creating new terminal session for user: {}", req.user_id);

    let params = CreateSessionParams {
        terminal_size: requested_size(req.columns, req.rows)?,
        user_id: req.user_id,
        title: req.title,
        working_directory: req.working_directory,
        shell_type: req.shell_type,
    };
    let session = state.session_service.create_session(params).await?;

    Ok((StatusCode::CREATED, Json(SessionResponse::from(&session))))
}

/// List non-expired sessions, optionally for one user
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> Json<Vec<SessionResponse>> {
    let sessions = match query.user_id.as_deref() {
        Some(user_id) => state.session_service.list_by_user(user_id).await,
        None => state.session_service.list_all().await,
    };
    Json(sessions.iter().map(SessionResponse::from).collect())
}

/// Get a specific terminal session by ID
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let session = state.session_service.get_session_by_id(&session_id).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Resize a terminal session
pub async fn resize_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ResizeTerminalRequest>,
) -> Result<Json<TerminalResizeResponse>, ServiceError> {
    let (Some(columns), Some(rows)) = (req.columns, req.rows) else {
        return Err(ServiceError::InvalidParameter(
            "columns and rows are required".to_string(),
        ));
    };
    info!("Resizing terminal session: {} to {}x{}", session_id, columns, rows);

    let session = state
        .session_service
        .resize_terminal(&session_id, columns, rows)
        .await?;
    Ok(Json(TerminalResizeResponse {
        session_id: session.id().to_string(),
        columns: session.terminal_size().columns(),
        rows: session.terminal_size().rows(),
        status: session.status().as_str().to_string(),
    }))
}

/// Terminate a terminal session and its process
pub async fn terminate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TerminalTerminateResponse>, ServiceError> {
    info!("Terminating terminal session: {}", session_id);

    let session = state.session_service.terminate_session(&session_id).await?;
    state.process_manager.terminate_process(&session_id).await;

    Ok(Json(TerminalTerminateResponse {
        session_id: session.id().to_string(),
        status: session.status().as_str().to_string(),
        reason: "Session terminated by API request".to_string(),
    }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Health check passed".to_string(),
        sessions: state.session_service.session_count().await,
        processes: state.process_manager.process_count().await,
    })
}
