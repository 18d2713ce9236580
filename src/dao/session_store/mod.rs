#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;

use crate::dao::models::SessionEntity;
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for session documents.
///
/// Implementations are a durability mirror only: the in-memory registry makes
/// every concurrency decision, so none of these methods participate in
/// read-modify-write cycles.
pub trait SessionStore: Send + Sync {
    /// Upsert a session document keyed by its code.
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a session document by code, if present.
    fn find_session(&self, code: String)
    -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// List unrevealed sessions created before `cutoff`, for the reaper.
    fn find_expired_candidates(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    /// Cheap connectivity probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the underlying connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
