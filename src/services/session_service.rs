use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::SessionEntity,
    dto::{
        session::{
            CreateSessionRequest, CreateSessionResponse, JoinSessionRequest, JoinSessionResponse,
            PredictRequest, PredictResponse, SessionSnapshot,
        },
        validation::{normalize_session_code, validate_session_code},
    },
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        registry::{SessionCell, generate_code},
        session::{Departure, Role, Session},
    },
};

const MAX_CODE_ATTEMPTS: usize = 16;

/// Open a new session with a fresh collision-checked code.
///
/// Collisions are retried internally; callers only ever see a usable code or
/// an allocation failure after the attempt budget is spent.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<CreateSessionResponse, ServiceError> {
    let question = request.question.trim().to_owned();
    if question.is_empty() {
        return Err(ServiceError::InvalidInput(
            "question must not be empty".into(),
        ));
    }

    let capacity = request
        .capacity
        .unwrap_or(state.config().default_capacity);

    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_code();

        if state.registry().contains(&code) {
            continue;
        }

        // A dormant session in the store also claims its code.
        if let Some(store) = state.session_store().await {
            match store.find_session(code.clone()).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(err) => {
                    // The in-memory registry stays authoritative; a store
                    // outage must not block session creation.
                    warn!(%code, error = %err, "skipping store collision check");
                }
            }
        }

        let session = Session::new(code.clone(), question.clone(), capacity);
        let Ok(cell) = state.registry().insert_new(session) else {
            continue;
        };

        let entity: SessionEntity = {
            let session = cell.lock().await;
            (&*session).into()
        };
        persist_session(state, entity);

        return Ok(CreateSessionResponse { code });
    }

    Err(ServiceError::CodeAllocation)
}

/// Admit a participant into the session identified by `code`.
///
/// The role decision runs against the authoritative in-memory state under the
/// session lock, so concurrent joins can never both claim the last slot.
pub async fn join_session(
    state: &SharedState,
    code: &str,
    request: JoinSessionRequest,
) -> Result<JoinSessionResponse, ServiceError> {
    let display_name = request.display_name.trim().to_owned();
    if display_name.is_empty() {
        return Err(ServiceError::InvalidInput(
            "display name must not be empty".into(),
        ));
    }

    let code = checked_code(code)?;
    let cell = resolve_session(state, &code).await?;
    let config = state.config();

    let (admission, snapshot, predictor_count, capacity, entity) = {
        let mut session = cell.lock().await;
        let admission = session.admit(
            display_name,
            &config.avatar_palette,
            config.allow_spectators,
        )?;
        let snapshot: SessionSnapshot = (&*session).into();
        let entity: SessionEntity = (&*session).into();
        (
            admission,
            snapshot,
            session.predictor_count(),
            session.capacity,
            entity,
        )
    };

    persist_session(state, entity);

    // Spectator admissions are invisible to the room; only slot changes are.
    if admission.role == Role::Predictor {
        sse_events::broadcast_predictor_update(state, &code, predictor_count, capacity);
    }

    Ok(JoinSessionResponse {
        handle: admission.handle,
        role: admission.role.into(),
        avatar_tag: admission.avatar_tag,
        session: snapshot,
    })
}

/// Record a prediction and fire the reveal when it completes the set.
pub async fn submit_prediction(
    state: &SharedState,
    code: &str,
    request: PredictRequest,
) -> Result<PredictResponse, ServiceError> {
    let code = checked_code(code)?;
    let cell = resolve_session(state, &code).await?;

    let (outcome, capacity, entity) = {
        let mut session = cell.lock().await;
        let outcome = session.submit(request.handle, &request.content)?;
        let entity: SessionEntity = (&*session).into();
        (outcome, session.capacity, entity)
    };

    // Side effects go out only after the in-memory transition committed.
    persist_session(state, entity);
    sse_events::broadcast_prediction_update(state, &code, outcome.count, capacity);

    if let Some(rows) = outcome.reveal {
        sse_events::broadcast_reveal(state, &code, rows.into_iter().map(Into::into).collect());
    }

    Ok(PredictResponse {
        count: outcome.count,
        total: capacity,
        all_submitted: outcome.all_submitted,
    })
}

/// Detach `handle` from the session, freeing its slot when no prediction was
/// recorded. Submitted answers are never discarded by a departure.
pub async fn leave_session(
    state: &SharedState,
    code: &str,
    handle: Uuid,
) -> Result<(), ServiceError> {
    let code = checked_code(code)?;
    let cell = resolve_session(state, &code).await?;

    let (departure, capacity, entity) = {
        let mut session = cell.lock().await;
        let departure = session.depart(handle);
        let entity: SessionEntity = (&*session).into();
        (departure, session.capacity, entity)
    };

    match departure {
        Departure::SlotFreed { remaining } => {
            persist_session(state, entity);
            sse_events::broadcast_predictor_update(state, &code, remaining, capacity);
        }
        Departure::SpectatorLeft => persist_session(state, entity),
        Departure::NotPresent | Departure::PredictionRetained => {}
    }

    Ok(())
}

/// Evict unsubmitted predictors older than `ttl`; broadcasts at most once per
/// call and only when something was removed. Returns the eviction count.
pub async fn reap_session(
    state: &SharedState,
    code: &str,
    now: SystemTime,
    ttl: Duration,
) -> Result<usize, ServiceError> {
    let code = checked_code(code)?;
    let cell = resolve_session(state, &code).await?;

    let (removed, predictor_count, capacity, entity) = {
        let mut session = cell.lock().await;
        let removed = session.reap_inactive(now, ttl);
        let entity: SessionEntity = (&*session).into();
        (
            removed,
            session.predictor_count(),
            session.capacity,
            entity,
        )
    };

    if removed > 0 {
        persist_session(state, entity);
        sse_events::broadcast_predictor_update(state, &code, predictor_count, capacity);
    }

    Ok(removed)
}

/// Resolve the live cell for `code`, falling back to the store for sessions
/// that survived a restart. Exactly one cell per code exists afterwards.
pub async fn resolve_session(
    state: &SharedState,
    code: &str,
) -> Result<SessionCell, ServiceError> {
    if let Some(cell) = state.registry().get(code) {
        return Ok(cell);
    }

    let Some(store) = state.session_store().await else {
        return Err(ServiceError::NotFound(code.to_owned()));
    };

    match store.find_session(code.to_owned()).await {
        Ok(Some(entity)) => Ok(state.registry().adopt(entity)),
        Ok(None) => Err(ServiceError::NotFound(code.to_owned())),
        Err(err) => Err(err.into()),
    }
}

fn checked_code(code: &str) -> Result<String, ServiceError> {
    let normalized = normalize_session_code(code);
    validate_session_code(&normalized)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    Ok(normalized)
}

/// Mirror the committed state into the store without blocking the caller.
/// A failed write degrades durability only; the in-memory decision stands.
fn persist_session(state: &SharedState, entity: SessionEntity) {
    let state = state.clone();
    tokio::spawn(async move {
        let Some(store) = state.session_store().await else {
            debug!(code = %entity.code, "no store installed; session kept in memory only");
            return;
        };

        let code = entity.code.clone();
        if let Err(err) = store.save_session(entity).await {
            warn!(%code, error = %err, "session save failed; durability degraded");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dto::session::RoleDto,
        state::AppState,
    };

    fn test_state(default_capacity: usize) -> SharedState {
        let config = AppConfig {
            default_capacity,
            ..AppConfig::default()
        };
        AppState::new(config)
    }

    async fn create(state: &SharedState, capacity: Option<usize>) -> String {
        create_session(
            state,
            CreateSessionRequest {
                question: "will it rain?".into(),
                capacity,
            },
        )
        .await
        .unwrap()
        .code
    }

    async fn join(state: &SharedState, code: &str, name: &str) -> JoinSessionResponse {
        join_session(
            state,
            code,
            JoinSessionRequest {
                display_name: name.into(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_assigns_a_wellformed_code() {
        let state = test_state(5);
        let code = create(&state, None).await;
        assert!(validate_session_code(&code).is_ok());
        assert!(state.registry().contains(&code));
    }

    #[tokio::test]
    async fn join_unknown_code_is_not_found() {
        let state = test_state(5);
        let err = join_session(
            &state,
            "ZZZZZZ",
            JoinSessionRequest {
                display_name: "a".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn join_is_case_insensitive_on_codes() {
        let state = test_state(5);
        let code = create(&state, None).await;
        let joined = join(&state, &code.to_ascii_lowercase(), "a").await;
        assert_eq!(joined.session.code, code);
    }

    #[tokio::test]
    async fn full_round_reveals_to_the_room() {
        let state = test_state(2);
        let code = create(&state, None).await;

        // Subscribe before anyone acts so every broadcast is captured.
        let mut events = state.rooms().subscribe(&code);

        let a = join(&state, &code, "a").await;
        let b = join(&state, &code, "b").await;
        let c = join(&state, &code, "c").await;
        assert_eq!(a.role, RoleDto::Predictor);
        assert_eq!(b.role, RoleDto::Predictor);
        assert_eq!(c.role, RoleDto::Spectator);

        submit_prediction(
            &state,
            &code,
            PredictRequest {
                handle: a.handle,
                content: "cat".into(),
            },
        )
        .await
        .unwrap();

        let done = submit_prediction(
            &state,
            &code,
            PredictRequest {
                handle: b.handle,
                content: "dog".into(),
            },
        )
        .await
        .unwrap();
        assert!(done.all_submitted);
        assert_eq!(done.count, 2);

        // Two predictor updates, two prediction updates, then the reveal.
        let mut names = Vec::new();
        for _ in 0..5 {
            names.push(events.recv().await.unwrap().event.unwrap());
        }
        assert_eq!(
            names,
            [
                "predictor_update",
                "predictor_update",
                "prediction_update",
                "prediction_update",
                "all_predictions_revealed",
            ]
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn spectator_joining_after_reveal_gets_the_payload_inline() {
        let state = test_state(1);
        let code = create(&state, None).await;

        let a = join(&state, &code, "a").await;
        submit_prediction(
            &state,
            &code,
            PredictRequest {
                handle: a.handle,
                content: "cat".into(),
            },
        )
        .await
        .unwrap();

        let late = join(&state, &code, "late").await;
        assert_eq!(late.role, RoleDto::Spectator);
        assert!(late.session.revealed);
        let predictions = late.session.predictions.expect("frozen payload inline");
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].prediction.content, "cat");
        assert_eq!(predictions[0].participant.display_name, "a");
    }

    #[tokio::test]
    async fn second_submit_is_rejected_without_corruption() {
        let state = test_state(2);
        let code = create(&state, None).await;
        let a = join(&state, &code, "a").await;

        submit_prediction(
            &state,
            &code,
            PredictRequest {
                handle: a.handle,
                content: "cat".into(),
            },
        )
        .await
        .unwrap();

        let err = submit_prediction(
            &state,
            &code,
            PredictRequest {
                handle: a.handle,
                content: "dog".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadySubmitted));
    }

    #[tokio::test]
    async fn spectator_submit_is_forbidden() {
        let state = test_state(1);
        let code = create(&state, None).await;
        join(&state, &code, "a").await;
        let spectator = join(&state, &code, "b").await;

        let err = submit_prediction(
            &state,
            &code,
            PredictRequest {
                handle: spectator.handle,
                content: "dog".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotAPredictor));
    }

    #[tokio::test]
    async fn leave_reopens_the_slot_for_a_new_predictor() {
        let state = test_state(3);
        let code = create(&state, None).await;

        let a = join(&state, &code, "a").await;
        join(&state, &code, "b").await;

        leave_session(&state, &code, a.handle).await.unwrap();

        let d = join(&state, &code, "d").await;
        assert_eq!(d.role, RoleDto::Predictor);
        assert_eq!(d.session.predictor_count, 2);
    }

    #[tokio::test]
    async fn leave_after_submit_keeps_the_prediction() {
        let state = test_state(2);
        let code = create(&state, None).await;

        let a = join(&state, &code, "a").await;
        submit_prediction(
            &state,
            &code,
            PredictRequest {
                handle: a.handle,
                content: "cat".into(),
            },
        )
        .await
        .unwrap();

        leave_session(&state, &code, a.handle).await.unwrap();

        let b = join(&state, &code, "b").await;
        let done = submit_prediction(
            &state,
            &code,
            PredictRequest {
                handle: b.handle,
                content: "dog".into(),
            },
        )
        .await
        .unwrap();

        // A's answer survived the disconnect and completes the reveal.
        assert!(done.all_submitted);
    }

    #[tokio::test]
    async fn leave_of_unknown_handle_is_a_noop() {
        let state = test_state(2);
        let code = create(&state, None).await;
        join(&state, &code, "a").await;
        leave_session(&state, &code, Uuid::new_v4()).await.unwrap();

        let snapshot = join(&state, &code, "b").await;
        assert_eq!(snapshot.session.predictor_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_joins_through_the_service_respect_capacity() {
        const CAPACITY: usize = 4;
        let state = test_state(CAPACITY);
        let code = create(&state, None).await;

        let mut tasks = Vec::new();
        for i in 0..24 {
            let state = state.clone();
            let code = code.clone();
            tasks.push(tokio::spawn(async move {
                join_session(
                    &state,
                    &code,
                    JoinSessionRequest {
                        display_name: format!("p{i}"),
                    },
                )
                .await
                .unwrap()
                .role
            }));
        }

        let mut predictors = 0;
        for task in tasks {
            if task.await.unwrap() == RoleDto::Predictor {
                predictors += 1;
            }
        }
        assert_eq!(predictors, CAPACITY);
    }

    #[tokio::test]
    async fn explicit_capacity_overrides_the_default() {
        let state = test_state(5);
        let code = create(&state, Some(1)).await;
        join(&state, &code, "a").await;
        let b = join(&state, &code, "b").await;
        assert_eq!(b.role, RoleDto::Spectator);
    }
}
