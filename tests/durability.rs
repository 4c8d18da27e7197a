//! Sessions outliving the process that started them: restarts, replicas and races with
//! abandonment.

mod support;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use cinescore_back::{
    dao::{
        models::{
            CasOutcome, PlayerEntity, Revision, RoundEnd, ScoreAward, SessionEntity,
            SessionStatus, Versioned,
        },
        session_store::{MemorySessionStore, SessionStore},
        storage::StorageResult,
    },
    error::ServiceError,
    services::{
        arbitration::{self, ANSWER_WINDOW_ELAPSED, ClaimOutcome},
        identity, recovery, round_director, session_service, sse_service,
    },
    state::timers::TimerKind,
};
use futures::future::BoxFuture;
use support::{CATEGORY, TestApp, quick_timings};
use uuid::Uuid;

async fn start(app: &TestApp, names: &[&str]) -> (String, Uuid, Vec<Uuid>) {
    let (code, host, players) = app.lobby(names).await;
    round_director::start_game(&app.state, &code, host, CATEGORY.into(), 3)
        .await
        .expect("start game");
    (code, host, players)
}

/// Second process serving the same store, as after a restart or on another replica.
async fn replica_of(app: &TestApp, builder: support::Builder) -> TestApp {
    builder.store(app.store.clone()).build().await
}

#[tokio::test]
async fn host_token_is_honoured_by_another_replica() {
    let first = TestApp::new().await;
    let second = replica_of(&first, TestApp::builder()).await;

    let host = first.credentials();
    let code = session_service::create_session(&first.state, host.player_id)
        .await
        .expect("create session");
    let player = first.identity();
    session_service::join_session(&first.state, &code, player, "Ada".into(), None)
        .await
        .expect("join");

    let caller = identity::authenticate(&second.state, &host.token).expect("token accepted");
    assert_eq!(caller, host.player_id);
    let session = round_director::start_game(&second.state, &code, caller, CATEGORY.into(), 3)
        .await
        .expect("start on the second replica");
    assert_eq!(session.status, SessionStatus::Playing);
}

#[tokio::test]
async fn overdue_claim_is_released_by_the_next_buzz() {
    let mut timings = quick_timings();
    timings.answer_window = Duration::from_millis(50);
    let app = TestApp::builder().timings(timings).build().await;
    let (code, _, players) = start(&app, &["Ada", "Bob"]).await;
    let (ada, bob) = (players[0], players[1]);

    arbitration::attempt_claim(&app.state, &code, ada)
        .await
        .expect("claim");
    // The process that armed the answer window went away.
    app.state.timers().cancel_all(&code);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        app.session(&code).await.claim.map(|claim| claim.player_id),
        Some(ada)
    );

    assert_eq!(
        arbitration::attempt_claim(&app.state, &code, bob)
            .await
            .expect("claim"),
        ClaimOutcome::Accepted { round: 1 }
    );
    let session = app.session(&code).await;
    assert!(session.attempted_this_round.contains(&ada));
    assert_eq!(session.claim.map(|claim| claim.player_id), Some(bob));
}

#[tokio::test]
async fn replica_rearms_the_answer_window_on_subscribe() {
    let mut timings = quick_timings();
    timings.answer_window = Duration::from_millis(500);
    let first = TestApp::builder().timings(timings).build().await;
    let second = replica_of(&first, TestApp::builder().timings(timings)).await;
    let (code, _, players) = start(&first, &["Ada", "Bob"]).await;
    let ada = players[0];

    arbitration::attempt_claim(&first.state, &code, ada)
        .await
        .expect("claim");
    first.state.timers().cancel_all(&code);

    let _stream = sse_service::subscribe_session(&second.state, &code)
        .await
        .expect("subscribe");
    assert!(second.state.timers().is_pending(&code, TimerKind::AnswerWindow));

    let session = second
        .wait_for(&code, |session| session.attempted_this_round.contains(&ada))
        .await;
    assert!(session.claim.is_none());
    assert_eq!(
        session.last_verdict.map(|verdict| verdict.reason).as_deref(),
        Some(ANSWER_WINDOW_ELAPSED)
    );
}

#[tokio::test]
async fn guess_left_pending_is_judged_after_a_restart() {
    let first = TestApp::builder()
        .judge_delay(Duration::from_secs(30))
        .build()
        .await;
    let second = replica_of(&first, TestApp::builder()).await;
    let (code, _, players) = start(&first, &["Ada", "Bob"]).await;
    let ada = players[0];
    let answer = first.answer_of(&code).await;

    arbitration::attempt_claim(&first.state, &code, ada)
        .await
        .expect("claim");
    arbitration::submit_answer(&first.state, &code, ada, answer)
        .await
        .expect("submit");

    recovery::resume_session(&second.state, &code)
        .await
        .expect("resume");

    let session = second
        .wait_for(&code, |session| session.status == SessionStatus::Revealed)
        .await;
    let outcome = session.last_round_outcome.expect("outcome");
    assert_eq!(outcome.end, RoundEnd::Correct);
    second.wait_for_score(&code, ada, 100).await;
}

#[tokio::test]
async fn reveal_moves_on_after_a_restart() {
    let first = TestApp::new().await;
    let mut timings = quick_timings();
    timings.reveal_dwell = Duration::from_millis(50);
    let second = replica_of(&first, TestApp::builder().timings(timings)).await;
    let (code, host, _) = start(&first, &["Ada", "Bob"]).await;

    round_director::host_skip(&first.state, &code, host)
        .await
        .expect("host skip");
    first.state.timers().cancel_all(&code);

    session_service::get_snapshot(&second.state, &code)
        .await
        .expect("snapshot");

    let session = second
        .wait_for(&code, |session| session.round == 2)
        .await;
    assert_eq!(session.status, SessionStatus::Playing);
}

/// Makes the session disappear for everyone right after a player record is written, the way a
/// host abandoning the session between the two writes of a join would.
struct VanishingStore {
    inner: MemorySessionStore,
    vanished: AtomicBool,
}

impl SessionStore for VanishingStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.insert_session(session)
    }

    fn load_session(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<SessionEntity>>>> {
        if self.vanished.load(Ordering::SeqCst) {
            return Box::pin(async { Ok(None) });
        }
        self.inner.load_session(code)
    }

    fn replace_session(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<CasOutcome>> {
        self.inner.replace_session(expected, session)
    }

    fn delete_session(&self, code: &str) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_session(code)
    }

    fn upsert_player(
        &self,
        code: &str,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.vanished.store(true, Ordering::SeqCst);
        self.inner.upsert_player(code, player)
    }

    fn remove_player(
        &self,
        code: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.remove_player(code, player_id)
    }

    fn list_players(&self, code: &str) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        self.inner.list_players(code)
    }

    fn find_player(
        &self,
        code: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        self.inner.find_player(code, player_id)
    }

    fn increment_score(
        &self,
        code: &str,
        player_id: Uuid,
        award: ScoreAward,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.increment_score(code, player_id, award)
    }

    fn reset_scores(&self, code: &str, epoch: u64) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.reset_scores(code, epoch)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

#[tokio::test]
async fn join_racing_abandonment_leaves_no_player_behind() {
    let store = Arc::new(VanishingStore {
        inner: MemorySessionStore::new(),
        vanished: AtomicBool::new(false),
    });
    let app = TestApp::builder()
        .store(store.clone() as Arc<dyn SessionStore>)
        .build()
        .await;
    let host = app.identity();
    let code = session_service::create_session(&app.state, host)
        .await
        .expect("create session");

    let player = app.identity();
    let err = session_service::join_session(&app.state, &code, player, "Ada".into(), None)
        .await
        .expect_err("session vanished mid-join");

    assert!(matches!(err, ServiceError::NotFound(_)));
    assert!(
        store
            .inner
            .find_player(&code, player)
            .await
            .expect("find player")
            .is_none()
    );
}
