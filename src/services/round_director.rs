//! Round lifecycle: starting a game, applying verdicts, reveals, advancing and game over.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            ClaimantEntity, CurrentItemEntity, PlayerEntity, RoundEnd, RoundOutcomeEntity,
            ScoreAward, SessionEntity, SessionStatus, VerdictEntity, WinnerEntity,
        },
        session_store::SessionStore,
        transaction::{TxDecision, transact},
    },
    error::ServiceError,
    judging::Verdict,
    services::{
        selection::{
            CandidatePool, ExhaustReason, MAX_MEDIA_ATTEMPTS, SelectionPlan, SelectionStep,
        },
        session_service::{ensure_host, ensure_member, load_existing},
        sse_events::publish_session,
    },
    state::{
        SharedState,
        state_machine::{self, InvalidTransition, SessionEvent},
        timers::{RoundGuard, TimerKind},
    },
};

/// Where a verdict comes from; decides which pending-guess state it may apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    /// The judging provider graded the submitted guess.
    Judge,
    /// The claimant let the answer window elapse without submitting.
    AnswerTimeout,
}

/// Who asked to leave the reveal screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceTrigger {
    /// Host or player pressing "next".
    Caller(Uuid),
    /// Auto-advance timer armed for a specific round.
    Timer(RoundGuard),
}

/// Whether `votes` skip votes strictly exceed three quarters of `players`.
pub fn skip_threshold_reached(votes: usize, players: usize) -> bool {
    players > 0 && votes * 4 > players * 3
}

/// Highest score wins; ties go to the earliest joiner, then the lowest id.
pub fn pick_winner(session: &SessionEntity, players: &[PlayerEntity]) -> Option<WinnerEntity> {
    let epoch = session.epoch;
    players
        .iter()
        .filter(|player| session.roster.contains(&player.id))
        .max_by(|a, b| {
            a.score_in(epoch)
                .cmp(&b.score_in(epoch))
                .then_with(|| b.joined_at.cmp(&a.joined_at))
                .then_with(|| b.id.cmp(&a.id))
        })
        .map(|player| WinnerEntity {
            player_id: player.id,
            display_name: player.display_name.clone(),
            score: player.score_in(epoch),
        })
}

/// End the current round with nobody credited.
pub(crate) fn reveal_without_winner(
    session: &mut SessionEntity,
    event: SessionEvent,
    end: RoundEnd,
) -> Result<(), InvalidTransition> {
    state_machine::apply(&mut session.status, event)?;
    session.clear_claim();
    session.feedback = None;
    session.last_round_outcome = Some(RoundOutcomeEntity {
        round: session.round,
        claimant: None,
        score: 0,
        answer: session.canonical_answer().unwrap_or_default().to_owned(),
        end,
    });
    Ok(())
}

/// Stop in-round timers and arm the auto-advance for `round`.
pub(crate) fn after_reveal(state: &SharedState, code: &str, round: u32) {
    state.timers().cancel(code, TimerKind::AnswerWindow);
    state.timers().cancel(code, TimerKind::FeedbackClear);
    arm_auto_advance(state, code, round, state.config().timings.reveal_dwell);
}

/// Leave the reveal of `round` after `delay`.
pub(crate) fn arm_auto_advance(state: &SharedState, code: &str, round: u32, delay: Duration) {
    let task_state = state.clone();
    let task_code = code.to_owned();
    let guard = RoundGuard {
        round,
        claimant: None,
    };
    state.timers().schedule(code, TimerKind::AutoAdvance, delay, async move {
        if let Err(err) = advance(&task_state, &task_code, AdvanceTrigger::Timer(guard)).await {
            warn!(code = %task_code, round, error = %err, "auto-advance failed");
        }
    });
}

/// Pick an unplayed item of `category` whose media resolves.
async fn select_item(
    state: &SharedState,
    category: &str,
    played: &[String],
) -> Result<CurrentItemEntity, ServiceError> {
    let items = state
        .catalog()
        .items(category)
        .ok_or_else(|| ServiceError::InvalidInput(format!("unknown category `{category}`")))?;
    let mut plan = SelectionPlan::new(CandidatePool::new(items, played), MAX_MEDIA_ATTEMPTS);
    let media = state.media();

    loop {
        let step = plan.next(&mut rand::rng());
        match step {
            SelectionStep::Try(item) => match media.resolve(&item).await {
                Some(resolved) => {
                    debug!(category, item_id = %item.id, attempts = plan.attempts(), "item selected");
                    return Ok(CurrentItemEntity {
                        item,
                        preview_audio_url: resolved.preview_audio_url,
                        cover_image_url: resolved.cover_image_url,
                    });
                }
                None => {
                    info!(category, item_id = %item.id, "no playable media; discarding candidate");
                    plan.reject(&item.id);
                }
            },
            SelectionStep::Exhausted {
                reason: ExhaustReason::NoCandidates,
            } => {
                return Err(ServiceError::ContentExhausted {
                    category: category.to_owned(),
                });
            }
            SelectionStep::Exhausted {
                reason: ExhaustReason::AttemptsExhausted,
            } => {
                return Err(ServiceError::MediaUnavailable {
                    attempts: plan.attempts(),
                });
            }
        }
    }
}

/// Host starts a game from the lobby: new epoch, round 1, fresh item, scores reset.
pub async fn start_game(
    state: &SharedState,
    code: &str,
    caller: Uuid,
    category: String,
    total_rounds: u32,
) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    let current = load_existing(store.as_ref(), code).await?;
    ensure_host(&current, caller)?;
    state_machine::next_status(current.status, SessionEvent::StartGame)?;
    if current.roster.is_empty() {
        return Err(ServiceError::InvalidState(
            "at least one player must join before the game starts".into(),
        ));
    }

    let selected = select_item(state, &category, &[]).await?;

    let outcome = transact(store.as_ref(), code, |session| {
        ensure_host(session, caller)?;
        state_machine::apply(&mut session.status, SessionEvent::StartGame)?;
        session.epoch += 1;
        session.category = Some(category.clone());
        session.total_rounds = total_rounds;
        session.round = 1;
        session.clear_round();
        session.winner = None;
        session.played_items = vec![selected.item.id.clone()];
        session.current_item = Some(selected.clone());
        Ok(TxDecision::Commit(()))
    })
    .await?;
    let session = outcome.session;

    store.reset_scores(code, session.epoch).await?;
    state.timers().cancel_all(code);
    info!(
        code,
        category = %category,
        total_rounds,
        epoch = session.epoch,
        item_id = %selected.item.id,
        "game started"
    );
    publish_session(state, &session).await;
    Ok(session)
}

enum VerdictApplied {
    Stale,
    Correct { player_id: Uuid, award: ScoreAward },
    Exhausted { round: u32 },
    Wrong { round: u32, feedback: String },
}

/// Apply a verdict for the claim described by `guard` as one atomic transition.
///
/// Returns whether anything changed; a verdict for a claim that is no longer current is dropped.
pub async fn apply_verdict(
    state: &SharedState,
    code: &str,
    guard: RoundGuard,
    verdict: Verdict,
    source: VerdictSource,
) -> Result<bool, ServiceError> {
    let store = state.require_session_store().await?;
    let verdict_entity = VerdictEntity::from(&verdict);

    let outcome = transact(store.as_ref(), code, |session| {
        if session.status != SessionStatus::Playing || session.round != guard.round {
            return Ok(TxDecision::Skip(VerdictApplied::Stale));
        }
        let Some(claim) = session.claim.clone() else {
            return Ok(TxDecision::Skip(VerdictApplied::Stale));
        };
        if Some(claim.player_id) != guard.claimant {
            return Ok(TxDecision::Skip(VerdictApplied::Stale));
        }
        let guess_owner = session.pending_guess.as_ref().map(|guess| guess.player_id);
        let expected_owner = match source {
            VerdictSource::Judge => Some(claim.player_id),
            VerdictSource::AnswerTimeout => None,
        };
        if guess_owner != expected_owner {
            return Ok(TxDecision::Skip(VerdictApplied::Stale));
        }

        let round = session.round;
        let answer = session.canonical_answer().unwrap_or_default().to_owned();
        session.last_verdict = Some(verdict_entity.clone());

        if verdict.is_correct() {
            state_machine::apply(&mut session.status, SessionEvent::CorrectGuess)?;
            let points = verdict.score();
            session.clear_claim();
            session.feedback = None;
            session.last_round_outcome = Some(RoundOutcomeEntity {
                round,
                claimant: Some(ClaimantEntity {
                    player_id: claim.player_id,
                    display_name: claim.display_name.clone(),
                }),
                score: points,
                answer,
                end: RoundEnd::Correct,
            });
            return Ok(TxDecision::Commit(VerdictApplied::Correct {
                player_id: claim.player_id,
                award: ScoreAward {
                    epoch: session.epoch,
                    round,
                    points,
                },
            }));
        }

        session.attempted_this_round.insert(claim.player_id);
        let everyone_tried = session
            .roster
            .iter()
            .all(|player| session.attempted_this_round.contains(player));

        if everyone_tried {
            reveal_without_winner(session, SessionEvent::Exhausted, RoundEnd::Exhausted)?;
            return Ok(TxDecision::Commit(VerdictApplied::Exhausted { round }));
        }

        state_machine::apply(&mut session.status, SessionEvent::WrongGuess)?;
        session.clear_claim();
        let feedback = format!("{} guessed wrong! Keep listening!", claim.display_name);
        session.feedback = Some(feedback.clone());
        Ok(TxDecision::Commit(VerdictApplied::Wrong { round, feedback }))
    })
    .await?;

    match outcome.value {
        VerdictApplied::Stale => {
            debug!(code, round = guard.round, ?source, "dropping verdict for a stale claim");
            return Ok(false);
        }
        VerdictApplied::Correct { player_id, award } => {
            info!(code, %player_id, round = award.round, score = award.points, "correct guess");
            if let Err(err) = store.increment_score(code, player_id, award).await {
                // Settled again when the round is advanced.
                warn!(code, %player_id, error = %err, "failed to credit score");
            }
            after_reveal(state, code, award.round);
        }
        VerdictApplied::Exhausted { round } => {
            info!(code, round, "every player tried; revealing answer");
            after_reveal(state, code, round);
        }
        VerdictApplied::Wrong { round, feedback } => {
            debug!(code, round, reason = verdict.reason(), "wrong guess; buzzing reopened");
            state.timers().cancel(code, TimerKind::AnswerWindow);
            let delay = state.config().timings.feedback_clear;
            schedule_feedback_clear(state, code, round, feedback, delay);
        }
    }

    publish_session(state, &outcome.session).await;
    Ok(true)
}

/// Remove `feedback` from `round` after `delay`, unless something replaced it meanwhile.
pub(crate) fn schedule_feedback_clear(
    state: &SharedState,
    code: &str,
    round: u32,
    feedback: String,
    delay: Duration,
) {
    let task_state = state.clone();
    let task_code = code.to_owned();
    state.timers().schedule(code, TimerKind::FeedbackClear, delay, async move {
        if let Err(err) = clear_feedback(&task_state, &task_code, round, &feedback).await {
            warn!(code = %task_code, error = %err, "failed to clear feedback");
        }
    });
}

async fn clear_feedback(
    state: &SharedState,
    code: &str,
    round: u32,
    feedback: &str,
) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    let outcome = transact(store.as_ref(), code, |session| {
        if session.round != round || session.feedback.as_deref() != Some(feedback) {
            return Ok(TxDecision::Skip(()));
        }
        session.feedback = None;
        Ok(TxDecision::Commit(()))
    })
    .await?;

    if outcome.committed {
        publish_session(state, &outcome.session).await;
    }
    Ok(())
}

/// Host forces the answer to be revealed with nobody credited.
pub async fn host_skip(
    state: &SharedState,
    code: &str,
    caller: Uuid,
) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    let outcome = transact(store.as_ref(), code, |session| {
        ensure_host(session, caller)?;
        if session.status == SessionStatus::Revealed {
            return Ok(TxDecision::Skip(false));
        }
        reveal_without_winner(session, SessionEvent::HostReveal, RoundEnd::HostReveal)?;
        Ok(TxDecision::Commit(true))
    })
    .await?;

    if outcome.value {
        info!(code, round = outcome.session.round, "host revealed the answer");
        after_reveal(state, code, outcome.session.round);
        publish_session(state, &outcome.session).await;
    }
    Ok(outcome.session)
}

fn advance_is_due(session: &SessionEntity, trigger: AdvanceTrigger) -> bool {
    if session.status != SessionStatus::Revealed {
        return false;
    }
    match trigger {
        AdvanceTrigger::Caller(_) => true,
        AdvanceTrigger::Timer(guard) => guard.round == session.round,
    }
}

/// Leave the reveal screen: next round, or game over after the last one.
///
/// Calling it when the session is not on a reveal, or with a timer armed for an earlier round,
/// leaves the session untouched.
pub async fn advance(
    state: &SharedState,
    code: &str,
    trigger: AdvanceTrigger,
) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_existing(store.as_ref(), code).await?;
    if let AdvanceTrigger::Caller(caller) = trigger {
        ensure_member(&session, caller)?;
    }
    if !advance_is_due(&session, trigger) {
        debug!(code, status = ?session.status, round = session.round, "advance not due");
        return Ok(session);
    }

    settle_round_award(store.as_ref(), &session).await?;

    let result = if session.round >= session.total_rounds {
        finish_game(state, store.as_ref(), &session).await
    } else {
        next_round(state, store.as_ref(), &session).await
    };

    if let (Err(err), AdvanceTrigger::Timer(guard)) = (&result, trigger) {
        record_advance_failure(state, store.as_ref(), code, guard.round, err).await;
    }
    result
}

/// Re-credit the revealed round's award; a no-op when the first write landed.
async fn settle_round_award(
    store: &dyn SessionStore,
    session: &SessionEntity,
) -> Result<(), ServiceError> {
    let Some(outcome) = &session.last_round_outcome else {
        return Ok(());
    };
    let Some(claimant) = &outcome.claimant else {
        return Ok(());
    };
    if outcome.score == 0 || outcome.round != session.round {
        return Ok(());
    }

    let award = ScoreAward {
        epoch: session.epoch,
        round: outcome.round,
        points: outcome.score,
    };
    if store
        .increment_score(&session.code, claimant.player_id, award)
        .await?
    {
        info!(code = %session.code, player_id = %claimant.player_id, round = award.round, "settled missed score award");
    }
    Ok(())
}

async fn next_round(
    state: &SharedState,
    store: &dyn SessionStore,
    revealed: &SessionEntity,
) -> Result<SessionEntity, ServiceError> {
    let code = revealed.code.as_str();
    let category = revealed
        .category
        .clone()
        .ok_or_else(|| ServiceError::InvalidState("session has no category".into()))?;
    let selected = select_item(state, &category, &revealed.played_items).await?;

    let outcome = transact(store, code, |session| {
        if session.status != SessionStatus::Revealed || session.round != revealed.round {
            return Ok(TxDecision::Skip(false));
        }
        state_machine::apply(&mut session.status, SessionEvent::Advance)?;
        session.round += 1;
        session.played_items.push(selected.item.id.clone());
        session.clear_round();
        session.current_item = Some(selected.clone());
        Ok(TxDecision::Commit(true))
    })
    .await?;

    if outcome.value {
        state.timers().cancel_all(code);
        info!(code, round = outcome.session.round, item_id = %selected.item.id, "next round started");
        publish_session(state, &outcome.session).await;
    }
    Ok(outcome.session)
}

async fn finish_game(
    state: &SharedState,
    store: &dyn SessionStore,
    revealed: &SessionEntity,
) -> Result<SessionEntity, ServiceError> {
    let code = revealed.code.as_str();
    let players = store.list_players(code).await?;
    let winner = pick_winner(revealed, &players);

    let outcome = transact(store, code, |session| {
        if session.status != SessionStatus::Revealed || session.round != revealed.round {
            return Ok(TxDecision::Skip(false));
        }
        state_machine::apply(&mut session.status, SessionEvent::Finish)?;
        session.clear_claim();
        session.skip_votes.clear();
        session.feedback = None;
        session.winner = winner.clone();
        Ok(TxDecision::Commit(true))
    })
    .await?;

    if outcome.value {
        state.timers().cancel_all(code);
        match &outcome.session.winner {
            Some(winner) => info!(
                code,
                winner = %winner.player_id,
                score = winner.score,
                "game over"
            ),
            None => info!(code, "game over without players"),
        }
        publish_session(state, &outcome.session).await;
    }
    Ok(outcome.session)
}

/// Surface a failed auto-advance to the host, who can pick another category or reset.
async fn record_advance_failure(
    state: &SharedState,
    store: &dyn SessionStore,
    code: &str,
    round: u32,
    err: &ServiceError,
) {
    let message = err.to_string();
    let outcome = transact(store, code, |session| {
        if session.status != SessionStatus::Revealed || session.round != round {
            return Ok(TxDecision::Skip(()));
        }
        session.feedback = Some(message.clone());
        Ok(TxDecision::Commit(()))
    })
    .await;

    match outcome {
        Ok(outcome) if outcome.committed => publish_session(state, &outcome.session).await,
        Ok(_) => {}
        Err(err) => warn!(code, error = %err, "failed to record advance failure"),
    }
}

/// Host returns the session to the lobby from any status.
pub async fn reset(
    state: &SharedState,
    code: &str,
    caller: Uuid,
) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    let outcome = transact(store.as_ref(), code, |session| {
        ensure_host(session, caller)?;
        state_machine::apply(&mut session.status, SessionEvent::Reset)?;
        session.clear_round();
        session.current_item = None;
        session.round = 0;
        session.winner = None;
        session.played_items.clear();
        session.category = None;
        session.total_rounds = 0;
        Ok(TxDecision::Commit(()))
    })
    .await?;

    state.timers().cancel_all(code);
    info!(code, "session reset to lobby");
    publish_session(state, &outcome.session).await;
    Ok(outcome.session)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    #[test]
    fn skip_needs_strictly_more_than_three_quarters() {
        assert!(!skip_threshold_reached(3, 4));
        assert!(skip_threshold_reached(4, 4));
        assert!(skip_threshold_reached(1, 1));
        assert!(!skip_threshold_reached(1, 2));
        assert!(skip_threshold_reached(2, 2));
        assert!(!skip_threshold_reached(0, 0));
        assert!(!skip_threshold_reached(6, 8));
        assert!(skip_threshold_reached(7, 8));
    }

    fn player(name: &str, score: u32, joined_secs: u64) -> PlayerEntity {
        let mut player = PlayerEntity::new(Uuid::new_v4(), name.into(), None, 1);
        player.score = score;
        player.joined_at = SystemTime::UNIX_EPOCH + Duration::from_secs(joined_secs);
        player
    }

    fn session_with(players: &[PlayerEntity]) -> SessionEntity {
        let mut session = SessionEntity::new("ABCD".into(), Uuid::new_v4());
        session.epoch = 1;
        for player in players {
            session.roster.insert(player.id);
        }
        session
    }

    #[test]
    fn winner_has_the_highest_score() {
        let players = [player("Ada", 100, 1), player("Bob", 250, 2)];
        let winner = pick_winner(&session_with(&players), &players).expect("winner");
        assert_eq!(winner.display_name, "Bob");
        assert_eq!(winner.score, 250);
    }

    #[test]
    fn tied_winner_is_the_earliest_joiner() {
        let players = [player("Late", 200, 9), player("Early", 200, 3)];
        let winner = pick_winner(&session_with(&players), &players).expect("winner");
        assert_eq!(winner.display_name, "Early");
    }

    #[test]
    fn scores_from_an_older_game_do_not_win() {
        let mut stale = player("Stale", 900, 1);
        stale.epoch = 0;
        let players = [stale, player("Fresh", 50, 2)];
        let winner = pick_winner(&session_with(&players), &players).expect("winner");
        assert_eq!(winner.display_name, "Fresh");
    }

    #[test]
    fn no_players_means_no_winner() {
        assert!(pick_winner(&session_with(&[]), &[]).is_none());
    }
}
