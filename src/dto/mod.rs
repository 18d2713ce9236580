use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health endpoint payloads.
pub mod health;
/// Session request/response payloads.
pub mod session;
/// Server-sent event payloads.
pub mod sse;
/// Validation helpers for DTOs.
pub mod validation;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
