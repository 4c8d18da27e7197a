#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    CasOutcome, PlayerEntity, Revision, ScoreAward, SessionEntity, Versioned,
};
use crate::dao::storage::StorageResult;

pub use memory::MemorySessionStore;

/// Abstraction over the document store holding sessions and their players.
///
/// Sessions are written with compare-and-set on an opaque [`Revision`]; player records live in a
/// child collection keyed by `(code, player id)` and are only mutated through the narrow
/// operations below.
pub trait SessionStore: Send + Sync {
    /// Create `session` unless its code is already taken. Returns whether it was created.
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>>;
    /// Point read of a session together with its current revision.
    fn load_session(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<SessionEntity>>>>;
    /// Overwrite the session only if it is still at `expected`.
    fn replace_session(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<CasOutcome>>;
    /// Remove a session, then every player record attached to it.
    fn delete_session(&self, code: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Insert a player, or refresh the name and avatar of an existing one while keeping its score.
    fn upsert_player(
        &self,
        code: &str,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop a single player record; a missing record is not an error.
    fn remove_player(&self, code: &str, player_id: Uuid)
    -> BoxFuture<'static, StorageResult<()>>;
    /// All players of a session, in join order where the backend preserves it.
    fn list_players(&self, code: &str) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Single player lookup.
    fn find_player(
        &self,
        code: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    /// Atomically credit `award` to a player; see [`PlayerEntity::apply_award`].
    fn increment_score(
        &self,
        code: &str,
        player_id: Uuid,
        award: ScoreAward,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Zero every player still tagged with an epoch older than `epoch`.
    fn reset_scores(&self, code: &str, epoch: u64) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap connectivity check used by the supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the underlying connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
