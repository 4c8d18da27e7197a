use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoPlayerDocument, MongoSessionDocument, code_filter, epoch_value, player_doc_id,
        player_filter,
    },
};
use crate::dao::{
    models::{CasOutcome, PlayerEntity, Revision, ScoreAward, SessionEntity, Versioned},
    session_store::SessionStore,
    storage::StorageResult,
};

const SESSION_COLLECTION_NAME: &str = "sessions";
const PLAYER_COLLECTION_NAME: &str = "players";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Session store backed by the `sessions` and `players` collections of one database.
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

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
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
        let players = self.players().await;
        let index = IndexModel::builder()
            .keys(doc! { "session": 1, "joined_at": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("player_session_idx".to_owned()))
                    .build(),
            )
            .build();

        players
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "session,joined_at",
                source,
            })?;

        Ok(())
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME)
    }

    async fn insert_session(&self, session: SessionEntity) -> MongoResult<bool> {
        let code = session.code.clone();
        let document = MongoSessionDocument::new(session);
        match self.sessions().await.insert_one(&document).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::InsertSession { code, source }),
        }
    }

    async fn load_session(&self, code: String) -> MongoResult<Option<Versioned<SessionEntity>>> {
        let document = self
            .sessions()
            .await
            .find_one(code_filter(&code))
            .await
            .map_err(|source| MongoDaoError::LoadSession { code, source })?;

        Ok(document.map(|document| Versioned {
            revision: Revision(document.revision),
            value: document.state,
        }))
    }

    async fn replace_session(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> MongoResult<CasOutcome> {
        let code = session.code.clone();
        let document = MongoSessionDocument::new(session);
        let result = self
            .sessions()
            .await
            .replace_one(doc! { "_id": code.as_str(), "revision": expected.0 }, &document)
            .await
            .map_err(|source| MongoDaoError::ReplaceSession { code, source })?;

        Ok(if result.matched_count == 0 {
            CasOutcome::Conflict
        } else {
            CasOutcome::Applied
        })
    }

    /// The session goes first so a concurrent join fails its roster update and cleans up after
    /// itself instead of leaving a player behind.
    async fn delete_session(&self, code: String) -> MongoResult<bool> {
        let result = self
            .sessions()
            .await
            .delete_one(code_filter(&code))
            .await
            .map_err(|source| MongoDaoError::DeleteSession {
                code: code.clone(),
                source,
            })?;
        self.players()
            .await
            .delete_many(doc! { "session": code.as_str() })
            .await
            .map_err(|source| MongoDaoError::DeleteSession { code, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn upsert_player(&self, code: String, player: PlayerEntity) -> MongoResult<()> {
        let update = doc! {
            "$set": {
                "display_name": player.display_name.as_str(),
                "avatar_image": player.avatar_image.as_deref(),
            },
            "$setOnInsert": {
                "session": code.as_str(),
                "player_id": player.id.to_string(),
                "score": i64::from(player.score),
                "epoch": epoch_value(player.epoch),
                "awarded_round": i64::from(player.awarded_round),
                "joined_at": DateTime::from_system_time(player.joined_at),
            },
        };
        self.players()
            .await
            .update_one(player_filter(&code, player.id), update)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SavePlayer {
                code,
                player_id: player.id,
                source,
            })?;
        Ok(())
    }

    async fn remove_player(&self, code: String, player_id: Uuid) -> MongoResult<()> {
        self.players()
            .await
            .delete_one(player_filter(&code, player_id))
            .await
            .map_err(|source| MongoDaoError::SavePlayer {
                code,
                player_id,
                source,
            })?;
        Ok(())
    }

    async fn list_players(&self, code: String) -> MongoResult<Vec<MongoPlayerDocument>> {
        let cursor = self
            .players()
            .await
            .find(doc! { "session": code.as_str() })
            .sort(doc! { "joined_at": 1 })
            .await
            .map_err(|source| MongoDaoError::LoadPlayers {
                code: code.clone(),
                source,
            })?;
        cursor
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadPlayers { code, source })
    }

    async fn find_player(
        &self,
        code: String,
        player_id: Uuid,
    ) -> MongoResult<Option<MongoPlayerDocument>> {
        self.players()
            .await
            .find_one(player_filter(&code, player_id))
            .await
            .map_err(|source| MongoDaoError::LoadPlayers { code, source })
    }

    /// Two single-document updates, each atomic on its own: first move a stale player to the
    /// award's epoch, then credit the round only if it has not been credited yet.
    async fn increment_score(
        &self,
        code: String,
        player_id: Uuid,
        award: ScoreAward,
    ) -> MongoResult<bool> {
        let players = self.players().await;
        let id = player_doc_id(&code, player_id);
        let epoch = epoch_value(award.epoch);
        let map_err = |source: MongoError| MongoDaoError::ScorePlayer {
            code: code.clone(),
            player_id,
            source,
        };

        players
            .update_one(
                doc! { "_id": id.as_str(), "epoch": { "$lt": epoch } },
                doc! { "$set": { "epoch": epoch, "score": 0_i64, "awarded_round": 0_i64 } },
            )
            .await
            .map_err(map_err)?;

        let result = players
            .update_one(
                doc! {
                    "_id": id.as_str(),
                    "epoch": epoch,
                    "awarded_round": { "$lt": i64::from(award.round) },
                },
                doc! {
                    "$inc": { "score": i64::from(award.points) },
                    "$set": { "awarded_round": i64::from(award.round) },
                },
            )
            .await
            .map_err(map_err)?;

        Ok(result.modified_count > 0)
    }

    async fn reset_scores(&self, code: String, epoch: u64) -> MongoResult<()> {
        let epoch = epoch_value(epoch);
        self.players()
            .await
            .update_many(
                doc! { "session": code.as_str(), "epoch": { "$lt": epoch } },
                doc! { "$set": { "epoch": epoch, "score": 0_i64, "awarded_round": 0_i64 } },
            )
            .await
            .map_err(|source| MongoDaoError::ResetScores { code, source })?;
        Ok(())
    }
}

impl SessionStore for MongoSessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn load_session(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<SessionEntity>>>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.load_session(code).await.map_err(Into::into) })
    }

    fn replace_session(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<CasOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_session(expected, session)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_session(&self, code: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.delete_session(code).await.map_err(Into::into) })
    }

    fn upsert_player(
        &self,
        code: &str,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.upsert_player(code, player).await.map_err(Into::into) })
    }

    fn remove_player(
        &self,
        code: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move {
            store
                .remove_player(code, player_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_players(&self, code: &str) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move {
            store
                .list_players(code)
                .await?
                .into_iter()
                .map(PlayerEntity::try_from)
                .collect()
        })
    }

    fn find_player(
        &self,
        code: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move {
            store
                .find_player(code, player_id)
                .await?
                .map(PlayerEntity::try_from)
                .transpose()
        })
    }

    fn increment_score(
        &self,
        code: &str,
        player_id: Uuid,
        award: ScoreAward,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move {
            store
                .increment_score(code, player_id, award)
                .await
                .map_err(Into::into)
        })
    }

    fn reset_scores(&self, code: &str, epoch: u64) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.reset_scores(code, epoch).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.reconnect().await?;
            store.ensure_indexes().await.map_err(Into::into)
        })
    }
}
