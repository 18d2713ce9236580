use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::session::RevealEntry;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name, if any.
    pub event: Option<String>,
    /// Serialized JSON data field.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the number of occupied predictor slots changes.
pub struct PredictorUpdateEvent {
    /// Occupied slots.
    pub count: usize,
    /// Total slots.
    pub total: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever a prediction is recorded.
pub struct PredictionUpdateEvent {
    /// Predictions recorded so far.
    pub count: usize,
    /// Predictions required for the reveal.
    pub total: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast exactly once when the collected predictions are revealed.
pub struct RevealEvent {
    /// Frozen reveal payload, ordered by submission time.
    pub predictions: Vec<RevealEntry>,
}
