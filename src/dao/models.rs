use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role stored for a participant. Decided once at join time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleEntity {
    /// Holds one of the limited prediction slots.
    Predictor,
    /// Read-only viewer, not counted against capacity.
    Spectator,
}

/// Representation of a participant stored in persistence and shared across layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Display name chosen by the participant.
    pub display_name: String,
    /// Color tag derived from join order.
    pub avatar_tag: String,
    /// Admission timestamp.
    pub joined_at: SystemTime,
    /// Immutable role assigned at admission.
    pub role: RoleEntity,
}

/// A recorded prediction as stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictionEntity {
    /// Non-empty answer text.
    pub content: String,
    /// Submission timestamp.
    pub submitted_at: SystemTime,
}

/// Aggregate session entity persisted by the storage layer.
///
/// The in-memory session is authoritative; this document is a write-behind
/// mirror used for recovery, never for concurrency decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Short shareable code, uppercase alphanumeric, primary key.
    pub code: String,
    /// Question posed at creation.
    pub question: String,
    /// Maximum number of concurrent predictors.
    pub capacity: usize,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Participants keyed by handle, iteration order = join order.
    pub participants: IndexMap<Uuid, ParticipantEntity>,
    /// Predictions keyed by handle, iteration order = submission order.
    pub predictions: IndexMap<Uuid, PredictionEntity>,
    /// Whether the reveal has fired. Monotonic.
    pub revealed: bool,
    /// Running count of spectators ever admitted, feeds avatar tags.
    pub spectators_admitted: usize,
}
