use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::format_system_time,
    state::session::{Participant, Prediction, RevealRow, Role, Session},
};

/// Payload used to open a brand-new prediction session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Question the participants will answer.
    #[validate(length(min = 1, max = 500))]
    pub question: String,
    /// Optional predictor slot count; the configured default applies when
    /// omitted.
    #[serde(default)]
    #[validate(range(min = 1, max = 32))]
    pub capacity: Option<usize>,
}

/// Response returned once a session has been created.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    /// Shareable session code.
    pub code: String,
}

/// Payload used to join an existing session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    /// Name shown to the other participants.
    #[validate(length(min = 1, max = 60))]
    pub display_name: String,
}

/// Public projection of a participant role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoleDto {
    /// Holds a prediction slot.
    Predictor,
    /// Read-only viewer.
    Spectator,
}

impl From<Role> for RoleDto {
    fn from(value: Role) -> Self {
        match value {
            Role::Predictor => RoleDto::Predictor,
            Role::Spectator => RoleDto::Spectator,
        }
    }
}

/// Snapshot of a session as seen by a joining participant.
///
/// `predictions` is populated only once the session has revealed, so a late
/// spectator sees the results in the same response that admits them.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSnapshot {
    /// Session code.
    pub code: String,
    /// Question being predicted.
    pub question: String,
    /// Current number of predictors.
    pub predictor_count: usize,
    /// Maximum number of predictors.
    pub capacity: usize,
    /// Whether the reveal already happened.
    pub revealed: bool,
    /// Frozen reveal payload, present once revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<RevealEntry>>,
}

/// Response returned once a participant has been admitted.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinSessionResponse {
    /// Opaque participant handle; presented on predict/leave calls.
    pub handle: Uuid,
    /// Role assigned at admission, immutable.
    pub role: RoleDto,
    /// Avatar tag derived from join order.
    pub avatar_tag: String,
    /// Session state at admission time.
    pub session: SessionSnapshot,
}

/// Payload used to submit a prediction.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PredictRequest {
    /// Handle returned by the join call.
    pub handle: Uuid,
    /// Free-form answer text.
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

/// Response returned once a prediction has been recorded.
#[derive(Debug, Serialize, ToSchema)]
pub struct PredictResponse {
    /// Number of predictions recorded so far.
    pub count: usize,
    /// Number of predictions required for the reveal.
    pub total: usize,
    /// Whether this submission completed the set.
    pub all_submitted: bool,
}

/// Payload used to leave a session explicitly.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LeaveRequest {
    /// Handle returned by the join call.
    pub handle: Uuid,
}

/// Participant half of a reveal entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RevealParticipant {
    /// Participant handle.
    pub handle: Uuid,
    /// Display name.
    pub display_name: String,
    /// Avatar tag.
    pub avatar_tag: String,
}

/// Prediction half of a reveal entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RevealPrediction {
    /// Submitted answer text.
    pub content: String,
    /// RFC 3339 submission timestamp.
    pub submitted_at: String,
}

/// One entry of the reveal payload, ordered by submission time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RevealEntry {
    /// Who submitted.
    pub participant: RevealParticipant,
    /// What they submitted.
    pub prediction: RevealPrediction,
}

impl From<RevealRow> for RevealEntry {
    fn from(row: RevealRow) -> Self {
        let RevealRow {
            handle,
            participant: Participant {
                display_name,
                avatar_tag,
                ..
            },
            prediction: Prediction {
                content,
                submitted_at,
            },
        } = row;

        Self {
            participant: RevealParticipant {
                handle,
                display_name,
                avatar_tag,
            },
            prediction: RevealPrediction {
                content,
                submitted_at: format_system_time(submitted_at),
            },
        }
    }
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        let predictions = session
            .is_revealed()
            .then(|| session.reveal_rows().into_iter().map(Into::into).collect());

        Self {
            code: session.code.clone(),
            question: session.question.clone(),
            predictor_count: session.predictor_count(),
            capacity: session.capacity,
            revealed: session.is_revealed(),
            predictions,
        }
    }
}
