mod support;

use std::time::Duration;

use cinescore_back::{
    dao::models::{RoundEnd, SessionStatus},
    dto::session::BuzzRejection,
    error::ServiceError,
    services::{
        arbitration::{self, ClaimOutcome},
        round_director::{self, AdvanceTrigger},
    },
};
use support::{CATEGORY, TestApp, quick_timings};

async fn start(app: &TestApp, names: &[&str]) -> (String, uuid::Uuid, Vec<uuid::Uuid>) {
    let (code, host, players) = app.lobby(names).await;
    round_director::start_game(&app.state, &code, host, CATEGORY.into(), 3)
        .await
        .expect("start game");
    (code, host, players)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_buzzes_have_exactly_one_winner() {
    let app = TestApp::new().await;
    let names = ["A", "B", "C", "D", "E", "F", "G", "H"];
    let (code, _, players) = start(&app, &names).await;

    let handles: Vec<_> = players
        .iter()
        .map(|player| {
            let state = app.state.clone();
            let code = code.clone();
            let player = *player;
            tokio::spawn(async move {
                (player, arbitration::attempt_claim(&state, &code, player).await)
            })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        let (player, outcome) = handle.await.expect("task");
        match outcome.expect("claim attempt") {
            ClaimOutcome::Accepted { round } => {
                assert_eq!(round, 1);
                winners.push(player);
            }
            ClaimOutcome::Rejected(reason) => assert_eq!(reason, BuzzRejection::AlreadyClaimed),
        }
    }

    assert_eq!(winners.len(), 1);
    let session = app.session(&code).await;
    assert_eq!(session.claim.map(|claim| claim.player_id), Some(winners[0]));
    assert!(session.buzz_locked);
    assert!(session.answer_deadline.is_some());
}

#[tokio::test]
async fn buzzing_outside_a_round_is_rejected() {
    let app = TestApp::new().await;
    let (code, _, players) = app.lobby(&["A"]).await;

    let outcome = arbitration::attempt_claim(&app.state, &code, players[0])
        .await
        .expect("claim attempt");
    assert_eq!(outcome, ClaimOutcome::Rejected(BuzzRejection::NotPlaying));
}

#[tokio::test]
async fn strangers_cannot_buzz() {
    let app = TestApp::new().await;
    let (code, _, _) = start(&app, &["A"]).await;
    let stranger = app.identity();

    let err = arbitration::attempt_claim(&app.state, &code, stranger)
        .await
        .expect_err("stranger buzz");
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn wrong_guess_locks_the_claimant_out_and_reopens_buzzing() {
    let mut timings = quick_timings();
    timings.feedback_clear = Duration::from_secs(600);
    let app = TestApp::builder().timings(timings).build().await;
    let (code, _, players) = start(&app, &["Ada", "Bob"]).await;
    let (ada, bob) = (players[0], players[1]);

    arbitration::attempt_claim(&app.state, &code, ada)
        .await
        .expect("claim");
    assert!(
        arbitration::submit_answer(&app.state, &code, ada, "Definitely Wrong".into())
            .await
            .expect("submit")
    );

    let session = app
        .wait_for(&code, |session| session.attempted_this_round.contains(&ada))
        .await;
    assert_eq!(session.status, SessionStatus::Playing);
    assert!(session.claim.is_none());
    assert!(!session.buzz_locked);
    assert_eq!(
        session.feedback.as_deref(),
        Some("Ada guessed wrong! Keep listening!")
    );
    assert_eq!(session.last_verdict.map(|verdict| verdict.score), Some(0));

    assert_eq!(
        arbitration::attempt_claim(&app.state, &code, ada)
            .await
            .expect("second buzz"),
        ClaimOutcome::Rejected(BuzzRejection::LockedOut)
    );
    assert_eq!(
        arbitration::attempt_claim(&app.state, &code, bob)
            .await
            .expect("other buzz"),
        ClaimOutcome::Accepted { round: 1 }
    );
    assert!(app.session(&code).await.feedback.is_none());
}

#[tokio::test]
async fn wrong_guess_feedback_clears_itself() {
    let app = TestApp::new().await;
    let (code, _, players) = start(&app, &["Ada", "Bob"]).await;

    arbitration::attempt_claim(&app.state, &code, players[0])
        .await
        .expect("claim");
    arbitration::submit_answer(&app.state, &code, players[0], "nope".into())
        .await
        .expect("submit");

    let session = app
        .wait_for(&code, |session| {
            session.attempted_this_round.contains(&players[0]) && session.feedback.is_none()
        })
        .await;
    assert_eq!(session.status, SessionStatus::Playing);
}

#[tokio::test]
async fn only_the_claimant_may_answer_and_only_once() {
    let app = TestApp::builder()
        .judge_delay(Duration::from_millis(300))
        .build()
        .await;
    let (code, _, players) = start(&app, &["Ada", "Bob"]).await;
    let (ada, bob) = (players[0], players[1]);

    arbitration::attempt_claim(&app.state, &code, ada)
        .await
        .expect("claim");

    let err = arbitration::submit_answer(&app.state, &code, bob, "Film 1".into())
        .await
        .expect_err("non claimant");
    assert!(matches!(err, ServiceError::Forbidden(_)));

    assert!(
        arbitration::submit_answer(&app.state, &code, ada, "first".into())
            .await
            .expect("first submission")
    );
    assert!(
        !arbitration::submit_answer(&app.state, &code, ada, "second".into())
            .await
            .expect("second submission")
    );

    let session = app.session(&code).await;
    assert_eq!(
        session.pending_guess.map(|guess| guess.text).as_deref(),
        Some("first")
    );
}

#[tokio::test]
async fn correct_guess_scores_and_reveals() {
    let app = TestApp::new().await;
    let (code, _, players) = start(&app, &["Ada", "Bob"]).await;
    let ada = players[0];
    let answer = app.answer_of(&code).await;

    arbitration::attempt_claim(&app.state, &code, ada)
        .await
        .expect("claim");
    arbitration::submit_answer(&app.state, &code, ada, answer.to_uppercase())
        .await
        .expect("submit");

    let session = app
        .wait_for(&code, |session| session.status == SessionStatus::Revealed)
        .await;
    let outcome = session.last_round_outcome.expect("outcome");
    assert_eq!(outcome.end, RoundEnd::Correct);
    assert_eq!(outcome.score, 100);
    assert_eq!(outcome.answer, answer);
    assert_eq!(outcome.claimant.map(|claimant| claimant.player_id), Some(ada));
    assert!(session.claim.is_none());
    app.wait_for_score(&code, ada, 100).await;
    assert_eq!(app.score(&code, players[1]).await, 0);
}

#[tokio::test]
async fn silent_claimant_times_out_like_a_wrong_guess() {
    let mut timings = quick_timings();
    timings.answer_window = Duration::from_millis(50);
    let app = TestApp::builder().timings(timings).build().await;
    let (code, _, players) = start(&app, &["Ada", "Bob"]).await;

    arbitration::attempt_claim(&app.state, &code, players[0])
        .await
        .expect("claim");

    let session = app
        .wait_for(&code, |session| session.attempted_this_round.contains(&players[0]))
        .await;
    assert_eq!(session.status, SessionStatus::Playing);
    assert!(session.claim.is_none());
    let verdict = session.last_verdict.expect("verdict");
    assert!(verdict.failed);
    assert_eq!(verdict.reason, arbitration::ANSWER_WINDOW_ELAPSED);
}

async fn guess_wrong(app: &TestApp, code: &str, player: uuid::Uuid) {
    assert_eq!(
        arbitration::attempt_claim(&app.state, code, player)
            .await
            .expect("claim"),
        ClaimOutcome::Accepted { round: 1 }
    );
    arbitration::submit_answer(&app.state, code, player, "nope".into())
        .await
        .expect("submit");
    app.wait_for(code, |session| {
        session.attempted_this_round.contains(&player) && session.claim.is_none()
    })
    .await;
}

#[tokio::test]
async fn second_player_wins_after_a_wrong_guess() {
    let app = TestApp::new().await;
    let (code, _, players) = start(&app, &["Ada", "Bob"]).await;
    let (ada, bob) = (players[0], players[1]);

    guess_wrong(&app, &code, ada).await;
    assert_eq!(app.session(&code).await.status, SessionStatus::Playing);

    let answer = app.answer_of(&code).await;
    arbitration::attempt_claim(&app.state, &code, bob)
        .await
        .expect("claim");
    arbitration::submit_answer(&app.state, &code, bob, answer)
        .await
        .expect("submit");

    let session = app
        .wait_for(&code, |session| session.status == SessionStatus::Revealed)
        .await;
    let outcome = session.last_round_outcome.expect("outcome");
    assert_eq!(outcome.end, RoundEnd::Correct);
    assert_eq!(outcome.claimant.map(|claimant| claimant.player_id), Some(bob));
    app.wait_for_score(&code, bob, 100).await;
    assert_eq!(app.score(&code, ada).await, 0);
}

#[tokio::test]
async fn round_ends_once_everyone_has_tried() {
    let app = TestApp::new().await;
    let (code, _, players) = start(&app, &["Ada", "Bob"]).await;

    guess_wrong(&app, &code, players[0]).await;
    arbitration::attempt_claim(&app.state, &code, players[1])
        .await
        .expect("claim");
    arbitration::submit_answer(&app.state, &code, players[1], "also wrong".into())
        .await
        .expect("submit");

    let session = app
        .wait_for(&code, |session| session.status == SessionStatus::Revealed)
        .await;
    let outcome = session.last_round_outcome.expect("outcome");
    assert_eq!(outcome.end, RoundEnd::Exhausted);
    assert_eq!(outcome.score, 0);
    assert!(outcome.claimant.is_none());
    assert!(session.winner.is_none());
    assert_eq!(app.score(&code, players[0]).await, 0);
    assert_eq!(app.score(&code, players[1]).await, 0);
}

#[tokio::test]
async fn skip_needs_more_than_three_quarters_of_the_room() {
    let app = TestApp::new().await;
    let (code, _, players) = start(&app, &["A", "B", "C", "D"]).await;

    for (index, player) in players.iter().take(3).enumerate() {
        let tally = arbitration::vote_skip(&app.state, &code, *player)
            .await
            .expect("vote");
        assert_eq!(tally.votes, index + 1);
        assert_eq!(tally.players, 4);
        assert!(!tally.round_ended);
    }
    assert_eq!(app.session(&code).await.status, SessionStatus::Playing);

    let tally = arbitration::vote_skip(&app.state, &code, players[3])
        .await
        .expect("deciding vote");
    assert!(tally.round_ended);

    let session = app.session(&code).await;
    assert_eq!(session.status, SessionStatus::Revealed);
    assert_eq!(
        session.last_round_outcome.map(|outcome| outcome.end),
        Some(RoundEnd::SkipVote)
    );
}

#[tokio::test]
async fn repeated_skip_votes_count_once() {
    let app = TestApp::new().await;
    let (code, _, players) = start(&app, &["A", "B", "C"]).await;

    for _ in 0..3 {
        let tally = arbitration::vote_skip(&app.state, &code, players[0])
            .await
            .expect("vote");
        assert_eq!(tally.votes, 1);
        assert!(!tally.round_ended);
    }
    assert_eq!(app.session(&code).await.skip_votes.len(), 1);
}

#[tokio::test]
async fn skip_votes_need_a_round_in_play() {
    let app = TestApp::new().await;
    let (code, _, players) = app.lobby(&["A"]).await;

    let err = arbitration::vote_skip(&app.state, &code, players[0])
        .await
        .expect_err("lobby vote");
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

/// Claim and submit the right answer while the judge is still holding its verdict back.
async fn correct_guess_in_flight(app: &TestApp, code: &str, player: uuid::Uuid) {
    let answer = app.answer_of(code).await;
    arbitration::attempt_claim(&app.state, code, player)
        .await
        .expect("claim");
    arbitration::submit_answer(&app.state, code, player, answer)
        .await
        .expect("submit");
    assert!(app.state.judging().is_active(code, 1, player));
}

async fn wait_for_judging(app: &TestApp, code: &str, round: u32, player: uuid::Uuid) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while app.state.judging().is_active(code, round, player) {
        assert!(tokio::time::Instant::now() < deadline, "judging never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn verdict_landing_after_host_skip_scores_nothing() {
    let app = TestApp::builder()
        .judge_delay(Duration::from_millis(200))
        .build()
        .await;
    let (code, host, players) = start(&app, &["Ada", "Bob"]).await;
    let ada = players[0];
    correct_guess_in_flight(&app, &code, ada).await;

    round_director::host_skip(&app.state, &code, host)
        .await
        .expect("host skip");
    wait_for_judging(&app, &code, 1, ada).await;

    let session = app.session(&code).await;
    assert_eq!(session.status, SessionStatus::Revealed);
    assert_eq!(session.round, 1);
    let outcome = session.last_round_outcome.expect("outcome");
    assert_eq!(outcome.end, RoundEnd::HostReveal);
    assert_eq!(outcome.score, 0);
    assert!(outcome.claimant.is_none());
    assert_eq!(app.score(&code, ada).await, 0);
}

#[tokio::test]
async fn verdict_landing_after_a_skip_vote_scores_nothing() {
    let app = TestApp::builder()
        .judge_delay(Duration::from_millis(200))
        .build()
        .await;
    let (code, _, players) = start(&app, &["Ada", "Bob"]).await;
    let (ada, bob) = (players[0], players[1]);
    correct_guess_in_flight(&app, &code, ada).await;

    arbitration::vote_skip(&app.state, &code, ada)
        .await
        .expect("vote");
    let tally = arbitration::vote_skip(&app.state, &code, bob)
        .await
        .expect("vote");
    assert!(tally.round_ended);
    wait_for_judging(&app, &code, 1, ada).await;

    let session = app.session(&code).await;
    assert_eq!(session.status, SessionStatus::Revealed);
    let outcome = session.last_round_outcome.expect("outcome");
    assert_eq!(outcome.end, RoundEnd::SkipVote);
    assert_eq!(outcome.score, 0);
    assert_eq!(app.score(&code, ada).await, 0);
}

#[tokio::test]
async fn verdict_for_a_finished_round_leaves_the_next_round_alone() {
    let app = TestApp::builder()
        .judge_delay(Duration::from_millis(200))
        .build()
        .await;
    let (code, host, players) = start(&app, &["Ada", "Bob"]).await;
    let ada = players[0];
    correct_guess_in_flight(&app, &code, ada).await;

    round_director::host_skip(&app.state, &code, host)
        .await
        .expect("host skip");
    let next = round_director::advance(&app.state, &code, AdvanceTrigger::Caller(host))
        .await
        .expect("advance");
    assert_eq!(next.round, 2);
    wait_for_judging(&app, &code, 1, ada).await;

    let session = app.session(&code).await;
    assert_eq!(session.status, SessionStatus::Playing);
    assert_eq!(session.round, 2);
    assert!(session.claim.is_none());
    assert!(session.last_verdict.is_none());
    assert!(session.last_round_outcome.is_none());
    assert!(session.attempted_this_round.is_empty());
    assert_eq!(app.score(&code, ada).await, 0);
    assert_eq!(
        arbitration::attempt_claim(&app.state, &code, ada)
            .await
            .expect("claim"),
        ClaimOutcome::Accepted { round: 2 }
    );
}
