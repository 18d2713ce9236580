use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Predict Party Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::session::join_session,
        crate::routes::session::submit_prediction,
        crate::routes::session::leave_session,
        crate::routes::sse::session_events,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::CreateSessionResponse,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::JoinSessionResponse,
            crate::dto::session::PredictRequest,
            crate::dto::session::PredictResponse,
            crate::dto::session::LeaveRequest,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::RevealEntry,
            crate::dto::session::RoleDto,
            crate::dto::sse::PredictorUpdateEvent,
            crate::dto::sse::PredictionUpdateEvent,
            crate::dto::sse::RevealEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Session lifecycle operations"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
