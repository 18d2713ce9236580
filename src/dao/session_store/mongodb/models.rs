use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{ParticipantEntity, PredictionEntity, RoleEntity, SessionEntity};

/// BSON projection of a session. Participants and predictions are stored as
/// ordered arrays because BSON map keys must be strings; the array order
/// carries the join/submission ordering the entity's maps encode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    code: String,
    question: String,
    capacity: usize,
    created_at: DateTime,
    participants: Vec<MongoParticipantDocument>,
    predictions: Vec<MongoPredictionDocument>,
    revealed: bool,
    #[serde(default)]
    spectators_admitted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoParticipantDocument {
    handle: Uuid,
    display_name: String,
    avatar_tag: String,
    joined_at: DateTime,
    role: RoleEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoPredictionDocument {
    handle: Uuid,
    content: String,
    submitted_at: DateTime,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            code: value.code,
            question: value.question,
            capacity: value.capacity,
            created_at: DateTime::from_system_time(value.created_at),
            participants: value
                .participants
                .into_iter()
                .map(|(handle, p)| MongoParticipantDocument {
                    handle,
                    display_name: p.display_name,
                    avatar_tag: p.avatar_tag,
                    joined_at: DateTime::from_system_time(p.joined_at),
                    role: p.role,
                })
                .collect(),
            predictions: value
                .predictions
                .into_iter()
                .map(|(handle, p)| MongoPredictionDocument {
                    handle,
                    content: p.content,
                    submitted_at: DateTime::from_system_time(p.submitted_at),
                })
                .collect(),
            revealed: value.revealed,
            spectators_admitted: value.spectators_admitted,
        }
    }
}

impl From<MongoSessionDocument> for SessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            code: value.code,
            question: value.question,
            capacity: value.capacity,
            created_at: value.created_at.to_system_time(),
            participants: value
                .participants
                .into_iter()
                .map(|p| {
                    (
                        p.handle,
                        ParticipantEntity {
                            display_name: p.display_name,
                            avatar_tag: p.avatar_tag,
                            joined_at: p.joined_at.to_system_time(),
                            role: p.role,
                        },
                    )
                })
                .collect(),
            predictions: value
                .predictions
                .into_iter()
                .map(|p| {
                    (
                        p.handle,
                        PredictionEntity {
                            content: p.content,
                            submitted_at: p.submitted_at.to_system_time(),
                        },
                    )
                })
                .collect(),
            revealed: value.revealed,
            spectators_admitted: value.spectators_admitted,
        }
    }
}

pub fn doc_code(code: &str) -> Document {
    doc! {"_id": code}
}
