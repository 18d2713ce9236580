use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::session::{
        CreateSessionRequest, CreateSessionResponse, JoinSessionRequest, JoinSessionResponse,
        LeaveRequest, PredictRequest, PredictResponse,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes handling the session lifecycle (create, join, predict, leave).
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{code}/join", post(join_session))
        .route("/sessions/{code}/predict", post(submit_prediction))
        .route("/sessions/{code}/leave", post(leave_session))
}

/// Open a new prediction session and return its shareable code.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "session",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse)
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let response = session_service::create_session(&state, payload).await?;
    Ok(Json(response))
}

/// Join a session as a predictor while a slot is free, else as a spectator.
#[utoipa::path(
    post,
    path = "/sessions/{code}/join",
    tag = "session",
    params(("code" = String, Path, description = "Session code, case-insensitive")),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Participant admitted", body = JoinSessionResponse),
        (status = 404, description = "Unknown session code"),
        (status = 409, description = "Session full and spectators disabled")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<JoinSessionResponse>, AppError> {
    let response = session_service::join_session(&state, &code, payload).await?;
    Ok(Json(response))
}

/// Submit a prediction for the calling handle.
#[utoipa::path(
    post,
    path = "/sessions/{code}/predict",
    tag = "session",
    params(("code" = String, Path, description = "Session code, case-insensitive")),
    request_body = PredictRequest,
    responses(
        (status = 200, description = "Prediction recorded", body = PredictResponse),
        (status = 403, description = "Handle is not an active predictor"),
        (status = 409, description = "Prediction already submitted")
    )
)]
pub async fn submit_prediction(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<PredictRequest>>,
) -> Result<Json<PredictResponse>, AppError> {
    let response = session_service::submit_prediction(&state, &code, payload).await?;
    Ok(Json(response))
}

/// Leave a session explicitly. Unsubmitted predictors free their slot;
/// submitted answers are retained.
#[utoipa::path(
    post,
    path = "/sessions/{code}/leave",
    tag = "session",
    params(("code" = String, Path, description = "Session code, case-insensitive")),
    request_body = LeaveRequest,
    responses(
        (status = 200, description = "Departure processed"),
        (status = 404, description = "Unknown session code")
    )
)]
pub async fn leave_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<LeaveRequest>,
) -> Result<(), AppError> {
    session_service::leave_session(&state, &code, payload.handle).await?;
    Ok(())
}
