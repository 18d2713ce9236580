use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoSessionDocument, doc_code},
};
use crate::dao::{models::SessionEntity, session_store::SessionStore, storage::StorageResult};

const SESSION_COLLECTION_NAME: &str = "sessions";

/// MongoDB-backed [`SessionStore`]. Cheap to clone; all clones share the
/// underlying connection state.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        // The reaper queries unrevealed sessions by age.
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"revealed": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_expiry_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "revealed,created_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn save_session(&self, session: SessionEntity) -> MongoResult<()> {
        let code = session.code.clone();
        let document: MongoSessionDocument = session.into();
        let collection = self.collection().await;
        collection
            .replace_one(doc_code(&code), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSession { code, source })?;

        Ok(())
    }

    async fn find_session(&self, code: String) -> MongoResult<Option<SessionEntity>> {
        let collection = self.collection().await;

        let document = collection
            .find_one(doc_code(&code))
            .await
            .map_err(|source| MongoDaoError::LoadSession { code, source })?;

        Ok(document.map(Into::into))
    }

    async fn find_expired_candidates(
        &self,
        cutoff: SystemTime,
    ) -> MongoResult<Vec<SessionEntity>> {
        let collection = self.collection().await;

        let documents: Vec<MongoSessionDocument> = collection
            .find(doc! {
                "revealed": false,
                "created_at": { "$lt": DateTime::from_system_time(cutoff) },
            })
            .await
            .map_err(|source| MongoDaoError::ListExpired { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListExpired { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }
}

impl SessionStore for MongoSessionStore {
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_session(session).await.map_err(Into::into) })
    }

    fn find_session(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(code).await.map_err(Into::into) })
    }

    fn find_expired_candidates(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_expired_candidates(cutoff)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
