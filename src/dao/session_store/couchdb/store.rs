use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use tracing::debug;
use uuid::Uuid;

use super::{
    config::{CouchConfig, CouchCredentials},
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, BulkDocsRequest, CouchPlayerDocument, CouchSessionDocument,
        DeletedDocument, END_SUFFIX, WriteResponse, player_doc_id, player_prefix, session_doc_id,
    },
};
use crate::dao::{
    models::{CasOutcome, PlayerEntity, Revision, ScoreAward, SessionEntity, Versioned},
    session_store::SessionStore,
    storage::StorageResult,
};

const MAX_CONFLICT_RETRIES: u32 = 8;

/// Result of a conditional document write.
enum WriteOutcome {
    Written,
    Conflict,
}

/// Session store over one CouchDB database holding session and player documents.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    credentials: Option<Arc<CouchCredentials>>,
}

impl CouchSessionStore {
    /// Build the HTTP client and make sure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            base_url: Arc::from(config.base_url),
            database: Arc::from(config.database),
            credentials: config.credentials.map(Arc::new),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials.as_deref() {
            Some(credentials) => {
                builder.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    async fn database_status(&self) -> CouchResult<StatusCode> {
        let url = format!("{}/{}", self.base_url, self.database);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: self.database.to_string(),
                source,
            })?;
        Ok(response.status())
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        match self.database_status().await? {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let url = format!("{}/{}", self.base_url, self.database);
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it first.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn ping(&self) -> CouchResult<()> {
        match self.database_status().await? {
            StatusCode::OK => Ok(()),
            status => Err(CouchDaoError::DatabaseStatus {
                database: self.database.to_string(),
                status,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_owned(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_owned(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_owned(),
                status: other,
            }),
        }
    }

    /// PUT a document; CouchDB answers 409 when `_rev` is missing or stale.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<WriteOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_owned(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(WriteOutcome::Conflict),
            status if status.is_success() => {
                let ack = response.json::<WriteResponse>().await.map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_owned(),
                        source,
                    }
                })?;
                debug!(doc_id, rev = ?ack.rev, "couch document written");
                Ok(WriteOutcome::Written)
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_owned(),
                status: other,
            }),
        }
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<WriteOutcome> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_owned(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT | StatusCode::NOT_FOUND => Ok(WriteOutcome::Conflict),
            status if status.is_success() => Ok(WriteOutcome::Written),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_owned(),
                status: other,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_owned()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_owned(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_owned(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_owned(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc.map(|doc| (row.id, doc)))
            .map(|(id, doc)| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue { path: id, source })
            })
            .collect()
    }

    async fn bulk_delete(&self, docs: Vec<DeletedDocument>) -> CouchResult<()> {
        const BULK_DOCS: &str = "_bulk_docs";
        if docs.is_empty() {
            return Ok(());
        }
        let response = self
            .request(Method::POST, BULK_DOCS)
            .json(&BulkDocsRequest { docs })
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: BULK_DOCS.to_owned(),
                source,
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: BULK_DOCS.to_owned(),
                status: response.status(),
            })
        }
    }

    /// Read-modify-write of one player document, retried on revision conflicts.
    ///
    /// `apply` returns `None` to leave the document untouched; the result tells whether a write
    /// happened.
    async fn modify_player<F>(&self, code: &str, player_id: Uuid, mut apply: F) -> CouchResult<bool>
    where
        F: FnMut(Option<PlayerEntity>) -> Option<PlayerEntity> + Send,
    {
        let doc_id = player_doc_id(code, player_id);
        for _ in 0..MAX_CONFLICT_RETRIES {
            let existing = self.get_document::<CouchPlayerDocument>(&doc_id).await?;
            let rev = existing.as_ref().and_then(|document| document.rev.clone());
            let Some(player) = apply(existing.map(|document| document.player)) else {
                return Ok(false);
            };
            let mut document = CouchPlayerDocument::new(code, player);
            document.rev = rev;
            if let WriteOutcome::Written = self.put_document(&doc_id, &document).await? {
                return Ok(true);
            }
        }
        Err(CouchDaoError::PersistentConflict {
            doc_id,
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    async fn load_session(&self, code: &str) -> CouchResult<Option<Versioned<SessionEntity>>> {
        let doc_id = session_doc_id(code);
        let Some(document) = self.get_document::<CouchSessionDocument>(&doc_id).await? else {
            return Ok(None);
        };
        let rev = document.rev.ok_or(CouchDaoError::InvalidDocId {
            doc_id,
            kind: "missing _rev",
        })?;
        Ok(Some(Versioned {
            revision: Revision(rev),
            value: document.state,
        }))
    }

    async fn delete_session(&self, code: &str) -> CouchResult<bool> {
        let doc_id = session_doc_id(code);
        let mut deleted = false;
        for _ in 0..MAX_CONFLICT_RETRIES {
            let Some(document) = self.get_document::<CouchSessionDocument>(&doc_id).await? else {
                break;
            };
            let Some(rev) = document.rev else {
                break;
            };
            if let WriteOutcome::Written = self.delete_document(&doc_id, &rev).await? {
                deleted = true;
                break;
            }
        }

        let tombstones = self
            .list_documents::<CouchPlayerDocument>(&player_prefix(code))
            .await?
            .into_iter()
            .filter_map(|document| {
                document.rev.map(|rev| DeletedDocument {
                    id: document.id,
                    rev,
                    deleted: true,
                })
            })
            .collect();
        self.bulk_delete(tombstones).await?;
        Ok(deleted)
    }

    async fn remove_player(&self, code: &str, player_id: Uuid) -> CouchResult<()> {
        let doc_id = player_doc_id(code, player_id);
        for _ in 0..MAX_CONFLICT_RETRIES {
            let Some(document) = self.get_document::<CouchPlayerDocument>(&doc_id).await? else {
                return Ok(());
            };
            let Some(rev) = document.rev else {
                return Ok(());
            };
            if let WriteOutcome::Written = self.delete_document(&doc_id, &rev).await? {
                return Ok(());
            }
        }
        Err(CouchDaoError::PersistentConflict {
            doc_id,
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    async fn list_players(&self, code: &str) -> CouchResult<Vec<PlayerEntity>> {
        let mut players = self
            .list_documents::<CouchPlayerDocument>(&player_prefix(code))
            .await?
            .into_iter()
            .map(|document| {
                if document.id == player_doc_id(code, document.player.id) {
                    Ok(document.player)
                } else {
                    Err(CouchDaoError::InvalidDocId {
                        doc_id: document.id,
                        kind: "player id does not match document id",
                    })
                }
            })
            .collect::<CouchResult<Vec<_>>>()?;
        players.sort_by_key(|player| player.joined_at);
        Ok(players)
    }

    async fn reset_scores(&self, code: &str, epoch: u64) -> CouchResult<()> {
        let stale = self
            .list_players(code)
            .await?
            .into_iter()
            .filter(|player| player.epoch < epoch);
        for player in stale {
            self.modify_player(code, player.id, |existing| {
                existing.and_then(|mut player| player.normalize_epoch(epoch).then_some(player))
            })
            .await?;
        }
        Ok(())
    }
}

impl SessionStore for CouchSessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let document = CouchSessionDocument::new(session, None);
            let outcome = store.put_document(&document.id, &document).await?;
            Ok(matches!(outcome, WriteOutcome::Written))
        })
    }

    fn load_session(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<SessionEntity>>>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.load_session(&code).await.map_err(Into::into) })
    }

    fn replace_session(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<CasOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let document = CouchSessionDocument::new(session, Some(expected.0));
            Ok(match store.put_document(&document.id, &document).await? {
                WriteOutcome::Written => CasOutcome::Applied,
                WriteOutcome::Conflict => CasOutcome::Conflict,
            })
        })
    }

    fn delete_session(&self, code: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.delete_session(&code).await.map_err(Into::into) })
    }

    fn upsert_player(
        &self,
        code: &str,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move {
            let player_id = player.id;
            store
                .modify_player(&code, player_id, |existing| {
                    Some(match existing {
                        Some(mut current) => {
                            current.display_name = player.display_name.clone();
                            current.avatar_image = player.avatar_image.clone();
                            current
                        }
                        None => player.clone(),
                    })
                })
                .await?;
            Ok(())
        })
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
                .remove_player(&code, player_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_players(&self, code: &str) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.list_players(&code).await.map_err(Into::into) })
    }

    fn find_player(
        &self,
        code: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        let doc_id = player_doc_id(code, player_id);
        Box::pin(async move {
            let document = store.get_document::<CouchPlayerDocument>(&doc_id).await?;
            Ok(document.map(|document| document.player))
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
                .modify_player(&code, player_id, |existing| {
                    existing.and_then(|mut player| player.apply_award(&award).then_some(player))
                })
                .await
                .map_err(Into::into)
        })
    }

    fn reset_scores(&self, code: &str, epoch: u64) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { store.reset_scores(&code, epoch).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
