#![allow(dead_code)]

use std::{collections::HashSet, sync::Arc, time::Duration};

use cinescore_back::{
    catalog::Catalog,
    config::{AppConfig, IdentitySettings, Timings},
    dao::{
        models::{MediaKind, SessionEntity, TriviaItemEntity},
        session_store::{MemorySessionStore, SessionStore},
    },
    dto::identity::IdentityResponse,
    judging::{JudgingProvider, JudgingResult},
    media::{MediaResolver, ResolvedMedia},
    services::{identity, session_service},
    state::{AppState, SharedState},
};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Value, json};
use uuid::Uuid;

pub const CATEGORY: &str = "scores";
/// Signing secret shared by every app built in a test, like replicas of one deployment.
pub const IDENTITY_SECRET: &str = "test-identity-secret";

/// Awards full marks when the guess matches the answer ignoring case, zero otherwise.
pub struct ExactMatchJudge {
    delay: Duration,
}

impl JudgingProvider for ExactMatchJudge {
    fn judge(&self, guess: &str, answer: &str) -> BoxFuture<'static, JudgingResult<Value>> {
        let correct = guess.trim().eq_ignore_ascii_case(answer.trim());
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(if correct {
                json!({"score": 100, "reason": "exact match"})
            } else {
                json!({"score": 0, "reason": "not it"})
            })
        })
    }

    fn name(&self) -> &str {
        "exact-match"
    }
}

/// Resolves every item except the ones listed in `unplayable`.
pub struct StaticMedia {
    unplayable: HashSet<String>,
}

impl MediaResolver for StaticMedia {
    fn resolve(&self, item: &TriviaItemEntity) -> BoxFuture<'static, Option<ResolvedMedia>> {
        let resolved = (!self.unplayable.contains(&item.id)).then(|| ResolvedMedia {
            preview_audio_url: format!("https://audio.test/{}.m4a", item.id),
            cover_image_url: None,
        });
        Box::pin(async move { resolved })
    }
}

pub fn item(id: &str, work: &str) -> TriviaItemEntity {
    TriviaItemEntity {
        id: id.to_owned(),
        title: format!("{work} Theme"),
        artist: "Studio Orchestra".to_owned(),
        work: work.to_owned(),
        year: Some(1999),
        media_kind: MediaKind::Movie,
    }
}

/// Timings short enough for tests, with the reveal dwell long enough to never fire by default.
pub fn quick_timings() -> Timings {
    Timings {
        reveal_dwell: Duration::from_secs(600),
        answer_window: Duration::from_secs(600),
        feedback_clear: Duration::from_millis(50),
        judge_timeout: Duration::from_secs(2),
        media_timeout: Duration::from_secs(2),
    }
}

pub struct TestApp {
    pub state: SharedState,
    pub store: Arc<dyn SessionStore>,
}

pub struct Builder {
    items: Vec<TriviaItemEntity>,
    unplayable: HashSet<String>,
    timings: Timings,
    judge_delay: Duration,
    with_store: bool,
    store: Option<Arc<dyn SessionStore>>,
}

impl Builder {
    pub fn items(mut self, items: Vec<TriviaItemEntity>) -> Self {
        self.items = items;
        self
    }

    pub fn unplayable(mut self, ids: &[&str]) -> Self {
        self.unplayable = ids.iter().map(|id| (*id).to_owned()).collect();
        self
    }

    /// Hold every verdict back for `delay`.
    pub fn judge_delay(mut self, delay: Duration) -> Self {
        self.judge_delay = delay;
        self
    }

    /// Leave the application in degraded mode, as if the store never connected.
    pub fn without_store(mut self) -> Self {
        self.with_store = false;
        self
    }

    /// Run against an existing store instead of a fresh in-memory one.
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub async fn build(self) -> TestApp {
        let mut categories = IndexMap::new();
        categories.insert(CATEGORY.to_owned(), self.items);
        let state = AppState::new(
            AppConfig {
                timings: self.timings,
                identity: IdentitySettings {
                    secret: IDENTITY_SECRET.to_owned(),
                    ttl: Duration::from_secs(3600),
                },
            },
            Catalog::from_categories(categories),
            Arc::new(ExactMatchJudge {
                delay: self.judge_delay,
            }),
            Arc::new(StaticMedia {
                unplayable: self.unplayable,
            }),
        );
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()) as Arc<dyn SessionStore>);
        if self.with_store {
            state.install_session_store(store.clone()).await;
        }
        TestApp { state, store }
    }
}

impl TestApp {
    pub fn builder() -> Builder {
        Builder {
            items: (1..=6)
                .map(|n| item(&format!("item-{n}"), &format!("Film {n}")))
                .collect(),
            unplayable: HashSet::new(),
            timings: quick_timings(),
            judge_delay: Duration::ZERO,
            with_store: true,
            store: None,
        }
    }

    pub async fn new() -> TestApp {
        Self::builder().build().await
    }

    pub fn identity(&self) -> Uuid {
        self.credentials().player_id
    }

    /// A fresh identity together with its bearer token.
    pub fn credentials(&self) -> IdentityResponse {
        identity::issue_identity(&self.state).expect("issue identity")
    }

    /// Create a session and join `names` as players, returning the code, host and player ids.
    pub async fn lobby(&self, names: &[&str]) -> (String, Uuid, Vec<Uuid>) {
        let host = self.identity();
        let code = session_service::create_session(&self.state, host)
            .await
            .expect("create session");
        let mut players = Vec::new();
        for name in names {
            let player = self.identity();
            session_service::join_session(&self.state, &code, player, (*name).to_owned(), None)
                .await
                .expect("join session");
            players.push(player);
        }
        (code, host, players)
    }

    pub async fn session(&self, code: &str) -> SessionEntity {
        self.store
            .load_session(code)
            .await
            .expect("load session")
            .expect("session exists")
            .value
    }

    pub async fn score(&self, code: &str, player: Uuid) -> u32 {
        let session = self.session(code).await;
        self.store
            .find_player(code, player)
            .await
            .expect("find player")
            .expect("player exists")
            .score_in(session.epoch)
    }

    /// Poll until `player` holds `expected` points; scores land right after the reveal commits.
    pub async fn wait_for_score(&self, code: &str, player: Uuid, expected: u32) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let score = self.score(code, player).await;
            if score == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "player {player} stuck at {score} points, expected {expected}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Answer the current item correctly.
    pub async fn answer_of(&self, code: &str) -> String {
        self.session(code)
            .await
            .canonical_answer()
            .expect("item in play")
            .to_owned()
    }

    /// Poll the stored session until `predicate` holds.
    pub async fn wait_for<F>(&self, code: &str, predicate: F) -> SessionEntity
    where
        F: Fn(&SessionEntity) -> bool,
    {
        let limit = Duration::from_secs(5);
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let session = self.session(code).await;
            if predicate(&session) {
                return session;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "session `{code}` did not reach the expected state within {limit:?}: {:?}",
                session.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
