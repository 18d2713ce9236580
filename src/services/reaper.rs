use std::time::{Duration, SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{services::session_service, state::SharedState};

/// Periodically evict predictors who joined long ago and never submitted.
///
/// The sweep visits a snapshot of session codes and takes each session's lock
/// one at a time, so it never stalls join/predict traffic on other codes.
/// Missing a cycle under load is harmless; reaping is idempotent.
pub async fn run(state: SharedState) {
    let period = state.config().reaper_interval;
    let ttl = state.config().inactivity_ttl;

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        sweep(&state, SystemTime::now(), ttl).await;
    }
}

/// One reaper pass over every live session plus store-side candidates.
pub async fn sweep(state: &SharedState, now: SystemTime, ttl: Duration) {
    let mut codes = state.registry().codes();

    // Sessions persisted before a restart are not in memory yet; the store
    // narrows them down so the sweep does not scan the whole collection.
    if let Some(store) = state.session_store().await {
        let cutoff = now - ttl;
        match store.find_expired_candidates(cutoff).await {
            Ok(candidates) => {
                for candidate in candidates {
                    if !codes.contains(&candidate.code) {
                        codes.push(candidate.code);
                    }
                }
            }
            Err(err) => debug!(error = %err, "skipping store candidates this sweep"),
        }
    }

    for code in codes {
        match session_service::reap_session(state, &code, now, ttl).await {
            Ok(0) => {}
            Ok(removed) => info!(%code, removed, "reaped inactive predictors"),
            Err(err) => warn!(%code, error = %err, "reap failed for session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dto::session::{CreateSessionRequest, JoinSessionRequest, PredictRequest},
        state::{AppState, SharedState},
    };

    const TTL: Duration = Duration::from_secs(120);

    async fn setup(capacity: usize) -> (SharedState, String) {
        let state = AppState::new(AppConfig {
            default_capacity: capacity,
            ..AppConfig::default()
        });
        let code = session_service::create_session(
            &state,
            CreateSessionRequest {
                question: "q".into(),
                capacity: None,
            },
        )
        .await
        .unwrap()
        .code;
        (state, code)
    }

    async fn join(state: &SharedState, code: &str, name: &str) -> uuid::Uuid {
        session_service::join_session(
            state,
            code,
            JoinSessionRequest {
                display_name: name.into(),
            },
        )
        .await
        .unwrap()
        .handle
    }

    #[tokio::test]
    async fn sweep_removes_stale_unsubmitted_predictors() {
        let (state, code) = setup(3).await;
        join(&state, &code, "a").await;

        let mut events = state.rooms().subscribe(&code);
        let later = SystemTime::now() + Duration::from_secs(130);
        sweep(&state, later, TTL).await;

        let cell = state.registry().get(&code).unwrap();
        assert_eq!(cell.lock().await.predictor_count(), 0);

        // One predictor-count broadcast for the affected session.
        let event = events.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("predictor_update"));

        // A quiet second sweep emits nothing.
        sweep(&state, later, TTL).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn sweep_spares_submitted_predictors() {
        let (state, code) = setup(3).await;
        let a = join(&state, &code, "a").await;
        session_service::submit_prediction(
            &state,
            &code,
            PredictRequest {
                handle: a,
                content: "cat".into(),
            },
        )
        .await
        .unwrap();

        let later = SystemTime::now() + Duration::from_secs(3600);
        sweep(&state, later, TTL).await;

        let cell = state.registry().get(&code).unwrap();
        let session = cell.lock().await;
        assert_eq!(session.predictor_count(), 1);
        assert_eq!(session.prediction_count(), 1);
    }

    #[tokio::test]
    async fn sweep_before_ttl_removes_nobody() {
        let (state, code) = setup(2).await;
        join(&state, &code, "a").await;

        sweep(&state, SystemTime::now(), TTL).await;

        let cell = state.registry().get(&code).unwrap();
        assert_eq!(cell.lock().await.predictor_count(), 1);
    }
}
