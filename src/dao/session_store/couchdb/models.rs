use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{PlayerEntity, SessionEntity};

pub const SESSION_PREFIX: &str = "session::";
pub const PLAYER_PREFIX: &str = "player::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Acknowledgement returned by document writes.
#[derive(Debug, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub rev: Option<String>,
}

/// Session document: the entity nested under `state` next to CouchDB metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub state: SessionEntity,
}

impl CouchSessionDocument {
    /// Session document; `rev` is `None` for a document that does not exist yet.
    pub fn new(session: SessionEntity, rev: Option<String>) -> Self {
        Self {
            id: session_doc_id(&session.code),
            rev,
            state: session,
        }
    }
}

/// Player document, one per `(session, player)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPlayerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub session: String,
    pub player: PlayerEntity,
}

impl CouchPlayerDocument {
    /// New player document for session `code`, without a revision.
    pub fn new(code: &str, player: PlayerEntity) -> Self {
        Self {
            id: player_doc_id(code, player.id),
            rev: None,
            session: code.to_owned(),
            player,
        }
    }
}

/// Tombstone written through `_bulk_docs` when a session is deleted.
#[derive(Debug, Serialize)]
pub struct DeletedDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub rev: String,
    #[serde(rename = "_deleted")]
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest {
    pub docs: Vec<DeletedDocument>,
}

/// `_id` of the session document for `code`.
pub fn session_doc_id(code: &str) -> String {
    format!("{SESSION_PREFIX}{code}")
}

/// Common `_id` prefix of every player document of `code`.
pub fn player_prefix(code: &str) -> String {
    format!("{PLAYER_PREFIX}{code}:")
}

/// `_id` of one player document.
pub fn player_doc_id(code: &str, player_id: Uuid) -> String {
    format!("{}{player_id}", player_prefix(code))
}
