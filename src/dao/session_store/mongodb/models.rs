use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::{
    models::{PlayerEntity, SessionEntity, SessionStatus},
    storage::StorageError,
};

/// Session document: the entity nested under `state`, with the revision used for compare-and-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    pub code: String,
    pub revision: String,
    pub status: SessionStatus,
    pub updated_at: DateTime,
    pub state: SessionEntity,
}

impl MongoSessionDocument {
    /// Wrap `session` with a fresh revision, keyed by its code.
    pub fn new(session: SessionEntity) -> Self {
        Self {
            code: session.code.clone(),
            revision: Uuid::new_v4().to_string(),
            status: session.status,
            updated_at: DateTime::from_system_time(session.updated_at),
            state: session,
        }
    }
}

/// Player document, one per `(session, player)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub session: String,
    pub player_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_image: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub epoch: i64,
    #[serde(default)]
    pub awarded_round: i64,
    pub joined_at: DateTime,
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = StorageError;

    fn try_from(value: MongoPlayerDocument) -> Result<Self, Self::Error> {
        let corrupt = |reason: &str| StorageError::Corrupt {
            key: value.id.clone(),
            reason: reason.to_owned(),
        };
        let id = Uuid::parse_str(&value.player_id).map_err(|_| corrupt("invalid player id"))?;
        let score = u32::try_from(value.score).map_err(|_| corrupt("score out of range"))?;
        let epoch = u64::try_from(value.epoch).map_err(|_| corrupt("epoch out of range"))?;
        let awarded_round =
            u32::try_from(value.awarded_round).map_err(|_| corrupt("round out of range"))?;

        Ok(Self {
            id,
            display_name: value.display_name,
            avatar_image: value.avatar_image,
            score,
            epoch,
            awarded_round,
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

/// `_id` of a player document: the session code and the player id.
pub fn player_doc_id(code: &str, player_id: Uuid) -> String {
    format!("{code}:{player_id}")
}

pub fn code_filter(code: &str) -> Document {
    doc! { "_id": code }
}

pub fn player_filter(code: &str, player_id: Uuid) -> Document {
    doc! { "_id": player_doc_id(code, player_id) }
}

/// Mongo has no unsigned integers; epochs never get close to `i64::MAX`.
pub fn epoch_value(epoch: u64) -> i64 {
    i64::try_from(epoch).unwrap_or(i64::MAX)
}
