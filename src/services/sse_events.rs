use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        session::RevealEntry,
        sse::{PredictionUpdateEvent, PredictorUpdateEvent, RevealEvent, ServerEvent},
    },
    state::SharedState,
};

const EVENT_PREDICTOR_UPDATE: &str = "predictor_update";
const EVENT_PREDICTION_UPDATE: &str = "prediction_update";
const EVENT_REVEAL: &str = "all_predictions_revealed";

/// Broadcast the current predictor slot occupancy to a session's room.
pub fn broadcast_predictor_update(state: &SharedState, code: &str, count: usize, total: usize) {
    let payload = PredictorUpdateEvent { count, total };
    send_room_event(state, code, EVENT_PREDICTOR_UPDATE, &payload);
}

/// Broadcast the current submission count to a session's room.
pub fn broadcast_prediction_update(state: &SharedState, code: &str, count: usize, total: usize) {
    let payload = PredictionUpdateEvent { count, total };
    send_room_event(state, code, EVENT_PREDICTION_UPDATE, &payload);
}

/// Broadcast the frozen reveal payload. The caller guarantees this happens at
/// most once per session; delivery itself is best effort.
pub fn broadcast_reveal(state: &SharedState, code: &str, predictions: Vec<RevealEntry>) {
    let payload = RevealEvent { predictions };
    send_room_event(state, code, EVENT_REVEAL, &payload);
}

fn send_room_event(state: &SharedState, code: &str, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.rooms().publish(code, event),
        Err(err) => warn!(%code, event, error = %err, "failed to serialize SSE payload"),
    }
}
