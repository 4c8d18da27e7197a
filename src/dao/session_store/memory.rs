//! In-process backend used by tests and by `STORE_BACKEND=memory`.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use uuid::Uuid;

use super::SessionStore;
use crate::dao::{
    models::{CasOutcome, PlayerEntity, Revision, ScoreAward, SessionEntity, Versioned},
    storage::StorageResult,
};

/// Sessions and players held in process memory; everything is lost on restart.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<String, StoredSession>,
    players: DashMap<String, IndexMap<Uuid, PlayerEntity>>,
    revisions: AtomicU64,
}

struct StoredSession {
    revision: u64,
    session: SessionEntity,
}

impl MemoryInner {
    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl MemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let revision = inner.next_revision();
            match inner.sessions.entry(session.code.clone()) {
                Entry::Occupied(_) => Ok(false),
                Entry::Vacant(slot) => {
                    inner.players.entry(session.code.clone()).or_default();
                    slot.insert(StoredSession { revision, session });
                    Ok(true)
                }
            }
        })
    }

    fn load_session(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<SessionEntity>>>> {
        let inner = self.inner.clone();
        let code = code.to_owned();
        Box::pin(async move {
            Ok(inner.sessions.get(&code).map(|stored| Versioned {
                revision: Revision(stored.revision.to_string()),
                value: stored.session.clone(),
            }))
        })
    }

    fn replace_session(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<CasOutcome>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let revision = inner.next_revision();
            let Some(mut stored) = inner.sessions.get_mut(&session.code) else {
                return Ok(CasOutcome::Conflict);
            };
            if stored.revision.to_string() != expected.0 {
                return Ok(CasOutcome::Conflict);
            }
            stored.revision = revision;
            stored.session = session;
            Ok(CasOutcome::Applied)
        })
    }

    fn delete_session(&self, code: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        let code = code.to_owned();
        Box::pin(async move {
            let removed = inner.sessions.remove(&code).is_some();
            inner.players.remove(&code);
            Ok(removed)
        })
    }

    fn upsert_player(
        &self,
        code: &str,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let code = code.to_owned();
        Box::pin(async move {
            // The player map only exists while its session does.
            let Some(mut players) = inner.players.get_mut(&code) else {
                return Ok(());
            };
            match players.get_mut(&player.id) {
                Some(existing) => {
                    existing.display_name = player.display_name;
                    existing.avatar_image = player.avatar_image;
                }
                None => {
                    players.insert(player.id, player);
                }
            }
            Ok(())
        })
    }

    fn remove_player(
        &self,
        code: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let code = code.to_owned();
        Box::pin(async move {
            if let Some(mut players) = inner.players.get_mut(&code) {
                players.shift_remove(&player_id);
            }
            Ok(())
        })
    }

    fn list_players(&self, code: &str) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let inner = self.inner.clone();
        let code = code.to_owned();
        Box::pin(async move {
            Ok(inner
                .players
                .get(&code)
                .map(|players| players.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn find_player(
        &self,
        code: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let inner = self.inner.clone();
        let code = code.to_owned();
        Box::pin(async move {
            Ok(inner
                .players
                .get(&code)
                .and_then(|players| players.get(&player_id).cloned()))
        })
    }

    fn increment_score(
        &self,
        code: &str,
        player_id: Uuid,
        award: ScoreAward,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        let code = code.to_owned();
        Box::pin(async move {
            let Some(mut players) = inner.players.get_mut(&code) else {
                return Ok(false);
            };
            Ok(players
                .get_mut(&player_id)
                .is_some_and(|player| player.apply_award(&award)))
        })
    }

    fn reset_scores(&self, code: &str, epoch: u64) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let code = code.to_owned();
        Box::pin(async move {
            if let Some(mut players) = inner.players.get_mut(&code) {
                for player in players.values_mut() {
                    player.normalize_epoch(epoch);
                }
            }
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
