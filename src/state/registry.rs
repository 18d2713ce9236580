use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use tokio::sync::Mutex;

use crate::{dao::models::SessionEntity, state::session::Session};

/// Alphabet used for shareable session codes. Uppercase only; lookups
/// normalize their input so comparison is case-insensitive.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Fixed length of a session code.
pub const CODE_LENGTH: usize = 6;

/// A live session behind its per-code lock.
///
/// Holding the lock is what serializes join/predict/leave/reap for one code;
/// sessions under different codes never contend.
pub type SessionCell = Arc<Mutex<Session>>;

/// In-memory authority over all live sessions.
///
/// Exactly one cell exists per code at any time within the process: insertion
/// goes through the map's entry API, so two tasks racing to materialize the
/// same code converge on a single cell and neither can mutate state the other
/// cannot see.
#[derive(Default)]
pub struct SessionRegistry {
    cells: DashMap<String, SessionCell>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the live cell for `code`.
    pub fn get(&self, code: &str) -> Option<SessionCell> {
        self.cells.get(code).map(|cell| cell.value().clone())
    }

    /// Whether a live session exists for `code`.
    pub fn contains(&self, code: &str) -> bool {
        self.cells.contains_key(code)
    }

    /// Register a freshly created session. Fails when the code is already
    /// taken so the caller can regenerate; the collision is never surfaced to
    /// the end user.
    pub fn insert_new(&self, session: Session) -> Result<SessionCell, CodeTaken> {
        match self.cells.entry(session.code.clone()) {
            Entry::Occupied(_) => Err(CodeTaken),
            Entry::Vacant(slot) => {
                let cell: SessionCell = Arc::new(Mutex::new(session));
                slot.insert(cell.clone());
                Ok(cell)
            }
        }
    }

    /// Materialize a cell for a session recovered from the store.
    ///
    /// When two loads race, the entry API makes one of them the authority and
    /// the loser's document is dropped, preserving the one-cell-per-code
    /// guarantee.
    pub fn adopt(&self, entity: SessionEntity) -> SessionCell {
        self.cells
            .entry(entity.code.clone())
            .or_insert_with(|| Arc::new(Mutex::new(entity.into())))
            .clone()
    }

    /// Snapshot of the live session codes. Used by the reaper so the sweep
    /// never holds a map-wide lock while visiting sessions.
    pub fn codes(&self) -> Vec<String> {
        self.cells.iter().map(|cell| cell.key().clone()).collect()
    }
}

/// The generated code already names a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeTaken;

/// Draw a random session code from [`CODE_ALPHABET`].
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::session::Role;

    fn fresh(code: &str, capacity: usize) -> Session {
        Session::new(code.into(), "q".into(), capacity)
    }

    fn palette() -> Vec<String> {
        vec!["#007bff".into(), "#28a745".into()]
    }

    #[test]
    fn generated_codes_use_the_alphabet() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let registry = SessionRegistry::new();
        registry.insert_new(fresh("AAAAAA", 2)).unwrap();
        assert!(registry.insert_new(fresh("AAAAAA", 2)).is_err());
    }

    #[test]
    fn adopt_races_converge_on_one_cell() {
        let registry = SessionRegistry::new();
        let first = registry.adopt((&fresh("BBBBBB", 2)).into());
        let second = registry.adopt((&fresh("BBBBBB", 5)).into());
        // The second adopt must observe the first cell, not replace it.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_joins_never_exceed_capacity() {
        const CAPACITY: usize = 5;
        const JOINERS: usize = 40;

        let registry = Arc::new(SessionRegistry::new());
        let cell = registry.insert_new(fresh("CCCCCC", CAPACITY)).unwrap();

        let mut handles = Vec::new();
        for i in 0..JOINERS {
            let cell = cell.clone();
            handles.push(tokio::spawn(async move {
                let mut session = cell.lock().await;
                session
                    .admit(format!("p{i}"), &palette(), true)
                    .unwrap()
                    .role
            }));
        }

        let mut predictors = 0;
        for handle in handles {
            if handle.await.unwrap() == Role::Predictor {
                predictors += 1;
            }
        }

        assert_eq!(predictors, CAPACITY);
        let session = cell.lock().await;
        assert_eq!(session.predictor_count(), CAPACITY);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_submits_reveal_exactly_once() {
        const CAPACITY: usize = 8;

        let registry = SessionRegistry::new();
        let cell = registry.insert_new(fresh("DDDDDD", CAPACITY)).unwrap();

        let handles: Vec<_> = {
            let mut session = cell.lock().await;
            (0..CAPACITY)
                .map(|i| {
                    session
                        .admit(format!("p{i}"), &palette(), true)
                        .unwrap()
                        .handle
                })
                .collect()
        };

        let mut tasks = Vec::new();
        for handle in handles {
            let cell = cell.clone();
            tasks.push(tokio::spawn(async move {
                let mut session = cell.lock().await;
                session.submit(handle, "answer").unwrap().reveal.is_some()
            }));
        }

        let mut reveals = 0;
        for task in tasks {
            if task.await.unwrap() {
                reveals += 1;
            }
        }

        assert_eq!(reveals, 1);
        assert!(cell.lock().await.is_revealed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_duplicate_submits_record_one_entry() {
        let registry = SessionRegistry::new();
        let cell = registry.insert_new(fresh("EEEEEE", 4)).unwrap();

        let handle = {
            let mut session = cell.lock().await;
            session.admit("a".into(), &palette(), true).unwrap().handle
        };

        let mut tasks = Vec::new();
        for i in 0..16 {
            let cell = cell.clone();
            tasks.push(tokio::spawn(async move {
                let mut session = cell.lock().await;
                session.submit(handle, &format!("attempt-{i}")).is_ok()
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(cell.lock().await.prediction_count(), 1);
    }
}
