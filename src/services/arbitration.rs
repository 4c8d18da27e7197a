//! Turn arbitration: who may answer, what they answered, and whether the room wants to skip.

use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            ClaimEntity, GuessEntity, PlayerEntity, RoundEnd, SessionEntity, SessionStatus,
        },
        session_store::SessionStore,
        transaction::{TxDecision, TxOutcome, transact},
    },
    dto::session::{BuzzRejection, SkipVoteResponse},
    error::ServiceError,
    judging::{Verdict, judge_guess},
    services::{
        recovery,
        round_director::{
            VerdictSource, after_reveal, apply_verdict, reveal_without_winner,
            skip_threshold_reached,
        },
        sse_events::publish_session,
    },
    state::{
        SharedState,
        state_machine::SessionEvent,
        timers::{RoundGuard, TimerKind},
    },
};

/// Reason recorded when a claimant never submits.
pub const ANSWER_WINDOW_ELAPSED: &str = "answer window elapsed";

/// Result of a buzz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now holds the claim for `round`.
    Accepted {
        /// Round the claim belongs to.
        round: u32,
    },
    /// Nothing changed.
    Rejected(BuzzRejection),
}

/// Try to take the right to answer. Exactly one of any set of concurrent callers wins.
///
/// A claim whose answer window passed without a timer releasing it (for instance after a
/// restart) is expired first, and the buzz is retried once against the freed round.
pub async fn attempt_claim(
    state: &SharedState,
    code: &str,
    player_id: Uuid,
) -> Result<ClaimOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let player = store
        .find_player(code, player_id)
        .await?
        .ok_or_else(|| ServiceError::Forbidden("join the session before buzzing".into()))?;

    let mut outcome = try_claim(state, store.as_ref(), code, &player).await?;
    if outcome.value == ClaimOutcome::Rejected(BuzzRejection::AlreadyClaimed)
        && recovery::resume(state, &outcome.session).await?
    {
        outcome = try_claim(state, store.as_ref(), code, &player).await?;
    }

    match outcome.value {
        ClaimOutcome::Accepted { round } => {
            info!(code, %player_id, round, "claim accepted");
            state.timers().cancel(code, TimerKind::FeedbackClear);
            schedule_answer_window(
                state,
                code,
                RoundGuard {
                    round,
                    claimant: Some(player_id),
                },
                state.config().timings.answer_window,
            );
            publish_session(state, &outcome.session).await;
        }
        ClaimOutcome::Rejected(reason) => {
            debug!(code, %player_id, ?reason, "buzz rejected");
        }
    }

    Ok(outcome.value)
}

async fn try_claim(
    state: &SharedState,
    store: &dyn SessionStore,
    code: &str,
    player: &PlayerEntity,
) -> Result<TxOutcome<ClaimOutcome>, ServiceError> {
    let player_id = player.id;
    let answer_window = state.config().timings.answer_window;

    transact(store, code, |session| {
        if !session.roster.contains(&player_id) {
            return Err(ServiceError::Forbidden(
                "join the session before buzzing".into(),
            ));
        }
        if session.status != SessionStatus::Playing {
            return Ok(TxDecision::Skip(ClaimOutcome::Rejected(
                BuzzRejection::NotPlaying,
            )));
        }
        if session.attempted_this_round.contains(&player_id) {
            return Ok(TxDecision::Skip(ClaimOutcome::Rejected(
                BuzzRejection::LockedOut,
            )));
        }
        if session.claim.is_some() || session.buzz_locked {
            return Ok(TxDecision::Skip(ClaimOutcome::Rejected(
                BuzzRejection::AlreadyClaimed,
            )));
        }

        let now = SystemTime::now();
        session.claim = Some(ClaimEntity {
            player_id,
            display_name: player.display_name.clone(),
            claimed_at: now,
        });
        session.buzz_locked = true;
        session.answer_deadline = Some(now + answer_window);
        session.pending_guess = None;
        session.feedback = None;
        Ok(TxDecision::Commit(ClaimOutcome::Accepted {
            round: session.round,
        }))
    })
    .await
}

/// Arm the answer window of `guard`'s claim to fire after `delay`.
pub(crate) fn schedule_answer_window(
    state: &SharedState,
    code: &str,
    guard: RoundGuard,
    delay: Duration,
) {
    let task_state = state.clone();
    let task_code = code.to_owned();
    state.timers().schedule(code, TimerKind::AnswerWindow, delay, async move {
        match expire_claim(&task_state, &task_code, guard).await {
            Ok(true) => info!(code = %task_code, round = guard.round, "answer window elapsed"),
            Ok(false) => {}
            Err(err) => warn!(code = %task_code, error = %err, "failed to expire claim"),
        }
    });
}

/// Treat the claimant of `guard` as having answered wrong. Returns whether the claim was
/// still live.
pub(crate) async fn expire_claim(
    state: &SharedState,
    code: &str,
    guard: RoundGuard,
) -> Result<bool, ServiceError> {
    let verdict = Verdict::failed(ANSWER_WINDOW_ELAPSED);
    apply_verdict(state, code, guard, verdict, VerdictSource::AnswerTimeout).await
}

/// Judge `guess` in the background and apply the verdict to `round`.
///
/// Does nothing when this process is already judging the same guess.
pub(crate) fn dispatch_judging(
    state: &SharedState,
    code: &str,
    round: u32,
    guess: GuessEntity,
    answer: String,
) {
    let player_id = guess.player_id;
    let Some(slot) = state.judging().try_acquire(code, round, player_id) else {
        debug!(code, %player_id, round, "guess already being judged");
        return;
    };

    let task_state = state.clone();
    let task_code = code.to_owned();
    tokio::spawn(async move {
        let _slot = slot;
        let judge = task_state.judge();
        let limit = task_state.config().timings.judge_timeout;
        let verdict = judge_guess(judge.as_ref(), &guess.text, &answer, limit).await;
        info!(code = %task_code, %player_id, round, score = verdict.score(), "guess judged");

        let guard = RoundGuard {
            round,
            claimant: Some(player_id),
        };
        if let Err(err) =
            apply_verdict(&task_state, &task_code, guard, verdict, VerdictSource::Judge).await
        {
            warn!(code = %task_code, %player_id, error = %err, "failed to apply verdict");
        }
    });
}

/// Store the claimant's guess and hand it to the judge.
///
/// Returns `false` when a guess was already pending; the first submission wins.
pub async fn submit_answer(
    state: &SharedState,
    code: &str,
    player_id: Uuid,
    text: String,
) -> Result<bool, ServiceError> {
    let store = state.require_session_store().await?;
    let guess = text.trim().to_owned();

    let outcome = transact(store.as_ref(), code, |session| {
        if session.status != SessionStatus::Playing {
            return Err(ServiceError::InvalidState("no round is being played".into()));
        }
        match &session.claim {
            Some(claim) if claim.player_id == player_id => {}
            _ => {
                return Err(ServiceError::Forbidden(
                    "only the current claimant may answer".into(),
                ));
            }
        }
        if session.pending_guess.is_some() {
            return Ok(TxDecision::Skip(None));
        }
        let answer = session
            .canonical_answer()
            .ok_or_else(|| ServiceError::InvalidState("round has no item".into()))?
            .to_owned();

        let pending = GuessEntity {
            player_id,
            text: guess.clone(),
            submitted_at: SystemTime::now(),
        };
        session.pending_guess = Some(pending.clone());
        session.answer_deadline = None;
        Ok(TxDecision::Commit(Some((session.round, pending, answer))))
    })
    .await?;

    let Some((round, pending, answer)) = outcome.value else {
        debug!(code, %player_id, "duplicate answer submission ignored");
        return Ok(false);
    };

    state.timers().cancel(code, TimerKind::AnswerWindow);
    publish_session(state, &outcome.session).await;
    dispatch_judging(state, code, round, pending, answer);

    Ok(true)
}

/// Record a vote to abandon the current round; the round ends once votes strictly exceed
/// three quarters of the players.
pub async fn vote_skip(
    state: &SharedState,
    code: &str,
    player_id: Uuid,
) -> Result<SkipVoteResponse, ServiceError> {
    let store = state.require_session_store().await?;

    let outcome = transact(store.as_ref(), code, |session| {
        if !session.roster.contains(&player_id) {
            return Err(ServiceError::Forbidden("join the session before voting".into()));
        }
        let tally = |session: &SessionEntity, round_ended: bool| SkipVoteResponse {
            votes: session.skip_votes.len(),
            players: session.roster.len(),
            round_ended,
        };
        match session.status {
            SessionStatus::Playing => {}
            // Someone else's vote or a verdict already ended the round.
            SessionStatus::Revealed => return Ok(TxDecision::Skip(tally(session, false))),
            SessionStatus::Lobby | SessionStatus::GameOver => {
                return Err(ServiceError::InvalidState("no round is being played".into()));
            }
        }

        let inserted = session.skip_votes.insert(player_id);
        if skip_threshold_reached(session.skip_votes.len(), session.roster.len()) {
            reveal_without_winner(session, SessionEvent::SkipVoted, RoundEnd::SkipVote)?;
            return Ok(TxDecision::Commit(tally(session, true)));
        }
        if inserted {
            Ok(TxDecision::Commit(tally(session, false)))
        } else {
            Ok(TxDecision::Skip(tally(session, false)))
        }
    })
    .await?;

    let tally = outcome.value;
    if tally.round_ended {
        info!(code, round = outcome.session.round, votes = tally.votes, players = tally.players, "round skipped by vote");
        after_reveal(state, code, outcome.session.round);
    } else {
        debug!(code, %player_id, votes = tally.votes, players = tally.players, "skip vote recorded");
    }
    if outcome.committed {
        publish_session(state, &outcome.session).await;
    }
    Ok(tally)
}
