use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    dto::validation::normalize_session_code,
    error::AppError,
    services::{
        session_service,
        sse_service::{self, StreamKind},
    },
    state::SharedState,
};

/// Query parameters accepted by the session event stream.
#[derive(Debug, Deserialize, IntoParams)]
pub struct EventStreamParams {
    /// Participant handle to attach; when present, dropping the stream is
    /// treated as that participant disconnecting.
    pub handle: Option<Uuid>,
}

/// Stream realtime session events (predictor counts, submission counts, the
/// reveal) to a connected client.
#[utoipa::path(
    get,
    path = "/sessions/{code}/events",
    tag = "sse",
    params(
        ("code" = String, Path, description = "Session code, case-insensitive"),
        EventStreamParams,
    ),
    responses(
        (status = 200, description = "Session event stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session code")
    )
)]
pub async fn session_events(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Query(params): Query<EventStreamParams>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let code = normalize_session_code(&code);

    // Reject unknown codes up front instead of holding a stream that can
    // never receive anything.
    session_service::resolve_session(&state, &code).await?;

    let receiver = sse_service::subscribe(&state, &code);
    info!(%code, "new session event stream");

    let kind = match params.handle {
        Some(handle) => StreamKind::Participant {
            connection_id: sse_service::register_connection(&state, code, handle),
            state: state.clone(),
        },
        None => StreamKind::Anonymous,
    };

    Ok(sse_service::to_sse_stream(receiver, kind))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{code}/events", get(session_events))
}
