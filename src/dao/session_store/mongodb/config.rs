use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

/// Parsed connection settings for the MongoDB backend.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the connection URI.
    pub options: ClientOptions,
    /// Database that holds the sessions collection.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse a connection URI, defaulting the database name when not given.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or("predict_party").to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
        })
    }

    /// Build the configuration from `MONGO_URI` / `MONGO_DB`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, db.as_deref()).await
    }
}
