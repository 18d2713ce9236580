use thiserror::Error;

/// Result alias for MongoDB DAO operations.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures raised by the MongoDB session store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection URI could not be parsed.
    #[error("invalid MongoDB uri `{uri}`")]
    InvalidUri {
        /// The offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A required environment variable is missing.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the missing variable.
        var: &'static str,
    },
    /// The driver client could not be constructed.
    #[error("failed to construct MongoDB client")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// The database never answered the initial ping.
    #[error("MongoDB did not answer ping after {attempts} attempts")]
    InitialPing {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A health-check ping failed.
    #[error("MongoDB health ping failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// Creating an index failed.
    #[error("failed to ensure index `{index}` on `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index key description.
        index: &'static str,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// Upserting a session document failed.
    #[error("failed to save session `{code}`")]
    SaveSession {
        /// Code of the session being saved.
        code: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// Loading a session document failed.
    #[error("failed to load session `{code}`")]
    LoadSession {
        /// Code of the session being loaded.
        code: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// Querying expired candidates failed.
    #[error("failed to list expired session candidates")]
    ListExpired {
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
}
