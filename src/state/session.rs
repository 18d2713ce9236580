use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{ParticipantEntity, PredictionEntity, RoleEntity, SessionEntity};

/// Role assigned to a participant exactly once at join time.
///
/// A predictor occupies one of the limited slots and may submit a single
/// prediction. A spectator is read-only and never counted against capacity.
/// Roles never change after admission; a predictor that disconnects is
/// removed entirely rather than demoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Occupies a slot and may submit one prediction.
    Predictor,
    /// Read-only viewer admitted once the slots are full.
    Spectator,
}

/// Participant tracked inside a session, keyed by an opaque handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Display name chosen by the participant.
    pub display_name: String,
    /// Color tag derived from join order, stable across reconnects.
    pub avatar_tag: String,
    /// Admission timestamp, used by the inactivity reaper.
    pub joined_at: SystemTime,
    /// Immutable role decided at join time.
    pub role: Role,
}

/// A submitted prediction. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Free-form answer text, guaranteed non-empty after trimming.
    pub content: String,
    /// Submission timestamp, defines the reveal ordering.
    pub submitted_at: SystemTime,
}

/// One row of the frozen reveal payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealRow {
    /// Handle of the predictor this row belongs to.
    pub handle: Uuid,
    /// Participant info at reveal time.
    pub participant: Participant,
    /// The prediction they submitted.
    pub prediction: Prediction,
}

/// Outcome of admitting a participant into a session.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Freshly allocated opaque handle, never reused within the session.
    pub handle: Uuid,
    /// Role the participant was admitted with.
    pub role: Role,
    /// Avatar tag assigned at admission.
    pub avatar_tag: String,
}

/// Outcome of recording a prediction.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Number of predictions recorded so far.
    pub count: usize,
    /// Whether every slot has now submitted.
    pub all_submitted: bool,
    /// Present exactly once: on the submission that completed the set.
    pub reveal: Option<Vec<RevealRow>>,
}

/// How a departing handle was accounted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// Handle was unknown; nothing to do.
    NotPresent,
    /// A spectator left; no capacity accounting, no broadcast.
    SpectatorLeft,
    /// A predictor without a prediction was removed; the slot reopened.
    SlotFreed {
        /// Predictor count after the removal.
        remaining: usize,
    },
    /// A predictor who already submitted stays; their answer outlives the
    /// connection.
    PredictionRetained,
}

/// Rejection reasons for `admit`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmitError {
    /// All slots are taken and the spectator fallback is disabled.
    #[error("session is full")]
    SessionFull,
}

/// Rejection reasons for `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Handle is unknown, was removed, or belongs to a spectator.
    #[error("handle is not an active predictor")]
    NotAPredictor,
    /// The handle already has a recorded prediction.
    #[error("prediction already submitted")]
    AlreadySubmitted,
    /// Content trims to the empty string.
    #[error("prediction content is empty")]
    EmptyContent,
}

/// State for one prediction session. All mutation goes through the registry,
/// which serializes access per code, so methods here can assume exclusive
/// ownership for the duration of a call.
#[derive(Debug, Clone)]
pub struct Session {
    /// Short shareable identifier, uppercase alphanumeric.
    pub code: String,
    /// Question posed by the host, immutable after creation.
    pub question: String,
    /// Maximum number of concurrent predictors.
    pub capacity: usize,
    /// Creation timestamp for auditing and reaper candidate queries.
    pub created_at: SystemTime,
    participants: IndexMap<Uuid, Participant>,
    predictions: IndexMap<Uuid, Prediction>,
    revealed: bool,
    spectators_admitted: usize,
}

impl Session {
    /// Build an empty open session.
    pub fn new(code: String, question: String, capacity: usize) -> Self {
        Self {
            code,
            question,
            capacity,
            created_at: SystemTime::now(),
            participants: IndexMap::new(),
            predictions: IndexMap::new(),
            revealed: false,
            spectators_admitted: 0,
        }
    }

    /// Number of participants currently holding a predictor slot.
    pub fn predictor_count(&self) -> usize {
        self.participants
            .values()
            .filter(|p| p.role == Role::Predictor)
            .count()
    }

    /// Number of predictions recorded so far.
    pub fn prediction_count(&self) -> usize {
        self.predictions.len()
    }

    /// Whether the reveal has fired for this session.
    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    /// Look up a participant by handle.
    pub fn participant(&self, handle: &Uuid) -> Option<&Participant> {
        self.participants.get(handle)
    }

    /// Admit a new participant. Allocates a predictor slot while one is free,
    /// otherwise falls back to spectator (unless the policy disables it).
    ///
    /// The avatar tag is a cyclic palette index over the per-role admission
    /// ordinal, so it is a pure function of join order.
    pub fn admit(
        &mut self,
        display_name: String,
        palette: &[String],
        allow_spectators: bool,
    ) -> Result<Admission, AdmitError> {
        let predictor_count = self.predictor_count();
        let (role, ordinal) = if predictor_count < self.capacity {
            (Role::Predictor, predictor_count)
        } else if allow_spectators {
            (Role::Spectator, self.spectators_admitted)
        } else {
            return Err(AdmitError::SessionFull);
        };

        let avatar_tag = palette
            .get(ordinal % palette.len().max(1))
            .cloned()
            .unwrap_or_default();

        let handle = Uuid::new_v4();
        self.participants.insert(
            handle,
            Participant {
                display_name,
                avatar_tag: avatar_tag.clone(),
                joined_at: SystemTime::now(),
                role,
            },
        );

        if role == Role::Spectator {
            self.spectators_admitted += 1;
        }

        Ok(Admission {
            handle,
            role,
            avatar_tag,
        })
    }

    /// Record a prediction for `handle` and evaluate the reveal condition.
    ///
    /// The returned `Submission` carries the reveal payload exactly when this
    /// call was the one that completed the set; the flip is monotonic and can
    /// never happen twice.
    pub fn submit(&mut self, handle: Uuid, content: &str) -> Result<Submission, SubmitError> {
        match self.participants.get(&handle) {
            Some(p) if p.role == Role::Predictor => {}
            _ => return Err(SubmitError::NotAPredictor),
        }

        if self.revealed || self.predictions.contains_key(&handle) {
            return Err(SubmitError::AlreadySubmitted);
        }

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(SubmitError::EmptyContent);
        }

        self.predictions.insert(
            handle,
            Prediction {
                content: trimmed.to_owned(),
                submitted_at: SystemTime::now(),
            },
        );

        let count = self.predictions.len();
        let all_submitted = count == self.capacity;
        let reveal = if all_submitted { self.try_reveal() } else { None };

        Ok(Submission {
            count,
            all_submitted,
            reveal,
        })
    }

    /// Flip to revealed if the completion condition holds and the session is
    /// still open. Returns the frozen payload only on the call that flipped.
    fn try_reveal(&mut self) -> Option<Vec<RevealRow>> {
        if self.revealed || self.predictions.len() != self.capacity {
            return None;
        }
        self.revealed = true;
        Some(self.reveal_rows())
    }

    /// Snapshot of the collected predictions in submission order.
    ///
    /// Only meaningful once revealed; used both for the reveal broadcast and
    /// for spectators who join after the fact.
    pub fn reveal_rows(&self) -> Vec<RevealRow> {
        self.predictions
            .iter()
            .filter_map(|(handle, prediction)| {
                let participant = self.participants.get(handle)?;
                Some(RevealRow {
                    handle: *handle,
                    participant: participant.clone(),
                    prediction: prediction.clone(),
                })
            })
            .collect()
    }

    /// Remove `handle` from the session if doing so cannot lose a submitted
    /// answer. Spectators leave silently; an unsubmitted predictor frees a
    /// slot; a submitted predictor is retained.
    pub fn depart(&mut self, handle: Uuid) -> Departure {
        let Some(participant) = self.participants.get(&handle) else {
            return Departure::NotPresent;
        };

        match participant.role {
            Role::Spectator => {
                self.participants.shift_remove(&handle);
                Departure::SpectatorLeft
            }
            Role::Predictor if self.predictions.contains_key(&handle) => {
                Departure::PredictionRetained
            }
            Role::Predictor => {
                self.participants.shift_remove(&handle);
                Departure::SlotFreed {
                    remaining: self.predictor_count(),
                }
            }
        }
    }

    /// Evict predictors who joined more than `ttl` ago and never submitted.
    /// Returns how many were removed. Predictors with a recorded prediction
    /// are never reaped regardless of age.
    pub fn reap_inactive(&mut self, now: SystemTime, ttl: Duration) -> usize {
        let stale: Vec<Uuid> = self
            .participants
            .iter()
            .filter(|(handle, p)| {
                p.role == Role::Predictor
                    && !self.predictions.contains_key(*handle)
                    && now
                        .duration_since(p.joined_at)
                        .map(|age| age > ttl)
                        .unwrap_or(false)
            })
            .map(|(handle, _)| *handle)
            .collect();

        for handle in &stale {
            self.participants.shift_remove(handle);
        }
        stale.len()
    }
}

impl From<&Session> for SessionEntity {
    fn from(session: &Session) -> Self {
        Self {
            code: session.code.clone(),
            question: session.question.clone(),
            capacity: session.capacity,
            created_at: session.created_at,
            participants: session
                .participants
                .iter()
                .map(|(handle, p)| (*handle, p.clone().into()))
                .collect(),
            predictions: session
                .predictions
                .iter()
                .map(|(handle, p)| (*handle, p.clone().into()))
                .collect(),
            revealed: session.revealed,
            spectators_admitted: session.spectators_admitted,
        }
    }
}

impl From<SessionEntity> for Session {
    fn from(entity: SessionEntity) -> Self {
        Self {
            code: entity.code,
            question: entity.question,
            capacity: entity.capacity,
            created_at: entity.created_at,
            participants: entity
                .participants
                .into_iter()
                .map(|(handle, p)| (handle, p.into()))
                .collect(),
            predictions: entity
                .predictions
                .into_iter()
                .map(|(handle, p)| (handle, p.into()))
                .collect(),
            revealed: entity.revealed,
            spectators_admitted: entity.spectators_admitted,
        }
    }
}

impl From<Participant> for ParticipantEntity {
    fn from(value: Participant) -> Self {
        Self {
            display_name: value.display_name,
            avatar_tag: value.avatar_tag,
            joined_at: value.joined_at,
            role: value.role.into(),
        }
    }
}

impl From<ParticipantEntity> for Participant {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            display_name: value.display_name,
            avatar_tag: value.avatar_tag,
            joined_at: value.joined_at,
            role: value.role.into(),
        }
    }
}

impl From<Prediction> for PredictionEntity {
    fn from(value: Prediction) -> Self {
        Self {
            content: value.content,
            submitted_at: value.submitted_at,
        }
    }
}

impl From<PredictionEntity> for Prediction {
    fn from(value: PredictionEntity) -> Self {
        Self {
            content: value.content,
            submitted_at: value.submitted_at,
        }
    }
}

impl From<Role> for RoleEntity {
    fn from(value: Role) -> Self {
        match value {
            Role::Predictor => RoleEntity::Predictor,
            Role::Spectator => RoleEntity::Spectator,
        }
    }
}

impl From<RoleEntity> for Role {
    fn from(value: RoleEntity) -> Self {
        match value {
            RoleEntity::Predictor => Role::Predictor,
            RoleEntity::Spectator => Role::Spectator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> Vec<String> {
        vec!["#007bff".into(), "#28a745".into(), "#dc3545".into()]
    }

    fn session(capacity: usize) -> Session {
        Session::new("AB12CD".into(), "what is it?".into(), capacity)
    }

    fn admit(session: &mut Session, name: &str) -> Admission {
        session.admit(name.into(), &palette(), true).unwrap()
    }

    #[test]
    fn predictor_count_never_exceeds_capacity() {
        let mut s = session(2);
        for i in 0..10 {
            admit(&mut s, &format!("player-{i}"));
        }
        assert_eq!(s.predictor_count(), 2);
        assert_eq!(s.participants.len(), 10);
    }

    #[test]
    fn overflow_joiners_become_spectators() {
        let mut s = session(1);
        let first = admit(&mut s, "a");
        let second = admit(&mut s, "b");
        assert_eq!(first.role, Role::Predictor);
        assert_eq!(second.role, Role::Spectator);
    }

    #[test]
    fn session_full_when_spectators_disallowed() {
        let mut s = session(1);
        admit(&mut s, "a");
        let err = s.admit("b".into(), &palette(), false).unwrap_err();
        assert_eq!(err, AdmitError::SessionFull);
        assert_eq!(s.participants.len(), 1);
    }

    #[test]
    fn avatar_tags_cycle_by_join_order() {
        let mut s = session(5);
        let tags: Vec<String> = (0..5).map(|i| admit(&mut s, &format!("p{i}")).avatar_tag).collect();
        assert_eq!(tags, ["#007bff", "#28a745", "#dc3545", "#007bff", "#28a745"]);
    }

    #[test]
    fn unknown_handle_is_not_a_predictor() {
        let mut s = session(2);
        let err = s.submit(Uuid::new_v4(), "cat").unwrap_err();
        assert_eq!(err, SubmitError::NotAPredictor);
    }

    #[test]
    fn spectator_cannot_submit() {
        let mut s = session(1);
        admit(&mut s, "a");
        let spectator = admit(&mut s, "b");
        let err = s.submit(spectator.handle, "dog").unwrap_err();
        assert_eq!(err, SubmitError::NotAPredictor);
    }

    #[test]
    fn second_submit_rejected_without_overwrite() {
        let mut s = session(2);
        let a = admit(&mut s, "a");
        s.submit(a.handle, "cat").unwrap();

        let err = s.submit(a.handle, "dog").unwrap_err();
        assert_eq!(err, SubmitError::AlreadySubmitted);
        assert_eq!(s.predictions.get(&a.handle).unwrap().content, "cat");
    }

    #[test]
    fn whitespace_content_rejected() {
        let mut s = session(2);
        let a = admit(&mut s, "a");
        assert_eq!(s.submit(a.handle, "   ").unwrap_err(), SubmitError::EmptyContent);
        assert_eq!(s.prediction_count(), 0);
    }

    #[test]
    fn content_is_trimmed_on_record() {
        let mut s = session(1);
        let a = admit(&mut s, "a");
        let outcome = s.submit(a.handle, "  cat  ").unwrap();
        assert!(outcome.all_submitted);
        assert_eq!(s.predictions.get(&a.handle).unwrap().content, "cat");
    }

    #[test]
    fn reveal_fires_exactly_once_at_capacity() {
        let mut s = session(2);
        let a = admit(&mut s, "a");
        let b = admit(&mut s, "b");

        let first = s.submit(a.handle, "cat").unwrap();
        assert_eq!(first.count, 1);
        assert!(!first.all_submitted);
        assert!(first.reveal.is_none());
        assert!(!s.is_revealed());

        let second = s.submit(b.handle, "dog").unwrap();
        assert!(second.all_submitted);
        let rows = second.reveal.expect("completing submission reveals");
        assert!(s.is_revealed());

        // Ordered by submission time, full payload.
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].handle, a.handle);
        assert_eq!(rows[0].prediction.content, "cat");
        assert_eq!(rows[1].handle, b.handle);
        assert_eq!(rows[1].prediction.content, "dog");
    }

    #[test]
    fn spectator_admission_after_reveal_sees_frozen_rows() {
        let mut s = session(1);
        let a = admit(&mut s, "a");
        s.submit(a.handle, "cat").unwrap();
        assert!(s.is_revealed());

        let late = admit(&mut s, "late");
        assert_eq!(late.role, Role::Spectator);
        let rows = s.reveal_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].participant.display_name, "a");
    }

    #[test]
    fn departure_before_submitting_frees_the_slot() {
        let mut s = session(3);
        let a = admit(&mut s, "a");
        admit(&mut s, "b");

        assert_eq!(s.depart(a.handle), Departure::SlotFreed { remaining: 1 });

        // The reopened slot admits a fresh predictor.
        let d = admit(&mut s, "d");
        assert_eq!(d.role, Role::Predictor);
        assert_eq!(s.predictor_count(), 2);
    }

    #[test]
    fn departure_after_submitting_keeps_the_prediction() {
        let mut s = session(2);
        let a = admit(&mut s, "a");
        s.submit(a.handle, "cat").unwrap();

        assert_eq!(s.depart(a.handle), Departure::PredictionRetained);
        assert!(s.participant(&a.handle).is_some());
        assert_eq!(s.prediction_count(), 1);
    }

    #[test]
    fn departure_of_unknown_handle_is_noop() {
        let mut s = session(2);
        assert_eq!(s.depart(Uuid::new_v4()), Departure::NotPresent);
    }

    #[test]
    fn session_stays_open_when_all_predictors_leave() {
        let mut s = session(2);
        let a = admit(&mut s, "a");
        let b = admit(&mut s, "b");
        s.submit(a.handle, "cat").unwrap();
        s.depart(b.handle);

        // One prediction recorded, capacity 2: reveal must not fire even
        // though no unsubmitted predictor remains.
        assert!(!s.is_revealed());
        assert_eq!(s.prediction_count(), 1);
    }

    #[test]
    fn reap_removes_only_stale_unsubmitted_predictors() {
        let mut s = session(3);
        let a = admit(&mut s, "a");
        let b = admit(&mut s, "b");
        s.submit(b.handle, "dog").unwrap();

        let ttl = Duration::from_secs(120);
        let later = SystemTime::now() + Duration::from_secs(130);

        assert_eq!(s.reap_inactive(later, ttl), 1);
        assert!(s.participant(&a.handle).is_none());
        assert!(s.participant(&b.handle).is_some());

        // Second sweep with nothing stale removes nothing.
        assert_eq!(s.reap_inactive(later, ttl), 0);
    }

    #[test]
    fn reap_spares_recent_joiners() {
        let mut s = session(2);
        admit(&mut s, "a");
        let removed = s.reap_inactive(SystemTime::now(), Duration::from_secs(120));
        assert_eq!(removed, 0);
        assert_eq!(s.predictor_count(), 1);
    }

    #[test]
    fn entity_round_trip_preserves_state() {
        let mut s = session(2);
        let a = admit(&mut s, "a");
        admit(&mut s, "b");
        s.submit(a.handle, "cat").unwrap();

        let entity: SessionEntity = (&s).into();
        let restored: Session = entity.into();

        assert_eq!(restored.code, s.code);
        assert_eq!(restored.predictor_count(), 2);
        assert_eq!(restored.prediction_count(), 1);
        assert!(!restored.is_revealed());
        assert_eq!(
            restored.participant(&a.handle).unwrap().display_name,
            "a"
        );
    }
}
