/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Inactivity sweep evicting predictors who never submitted.
pub mod reaper;
/// Core session lifecycle operations.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
