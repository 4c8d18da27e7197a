use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to insert session `{code}`")]
    InsertSession {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load session `{code}`")]
    LoadSession {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to replace session `{code}`")]
    ReplaceSession {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete session `{code}`")]
    DeleteSession {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save player `{player_id}` in session `{code}`")]
    SavePlayer {
        code: String,
        player_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load players of session `{code}`")]
    LoadPlayers {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update the score of player `{player_id}` in session `{code}`")]
    ScorePlayer {
        code: String,
        player_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to reset scores of session `{code}`")]
    ResetScores {
        code: String,
        #[source]
        source: MongoError,
    },
}
