//! Rebuild the in-process side of a round from the stored session.
//!
//! Timers and judging tasks only live in the process that started them. The session keeps the
//! answer deadline, the pending guess, the feedback and the time of the reveal, which is enough
//! for any process serving the session to pick the round up again.

use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::{
    dao::models::{SessionEntity, SessionStatus},
    error::ServiceError,
    services::{
        arbitration::{dispatch_judging, expire_claim, schedule_answer_window},
        round_director::{arm_auto_advance, schedule_feedback_clear},
        session_service::load_existing,
    },
    state::{
        SharedState,
        timers::{RoundGuard, TimerKind},
    },
};

/// Re-arm whatever session `code` is waiting on.
pub async fn resume_session(state: &SharedState, code: &str) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_existing(store.as_ref(), code).await?;
    resume(state, &session).await?;
    Ok(())
}

/// Re-arm whatever `session` is waiting on. Returns whether an overdue claim was released.
pub(crate) async fn resume(
    state: &SharedState,
    session: &SessionEntity,
) -> Result<bool, ServiceError> {
    let now = SystemTime::now();
    match session.status {
        SessionStatus::Playing => resume_round(state, session, now).await,
        SessionStatus::Revealed => {
            resume_reveal(state, session, now);
            Ok(false)
        }
        SessionStatus::Lobby | SessionStatus::GameOver => Ok(false),
    }
}

async fn resume_round(
    state: &SharedState,
    session: &SessionEntity,
    now: SystemTime,
) -> Result<bool, ServiceError> {
    let code = session.code.as_str();
    let round = session.round;

    if let Some(feedback) = &session.feedback {
        if !state.timers().is_pending(code, TimerKind::FeedbackClear) {
            let delay = state.config().timings.feedback_clear;
            schedule_feedback_clear(state, code, round, feedback.clone(), delay);
        }
    }

    let Some(claim) = &session.claim else {
        return Ok(false);
    };
    let claimant = claim.player_id;

    if let Some(guess) = &session.pending_guess {
        if guess.player_id != claimant || state.judging().is_active(code, round, claimant) {
            return Ok(false);
        }
        match session.canonical_answer() {
            Some(answer) => {
                info!(code, round, %claimant, "judging a guess left pending");
                dispatch_judging(state, code, round, guess.clone(), answer.to_owned());
            }
            None => warn!(code, round, "pending guess without an item in play"),
        }
        return Ok(false);
    }

    let guard = RoundGuard {
        round,
        claimant: Some(claimant),
    };
    if session.claim_overdue(now) {
        let released = expire_claim(state, code, guard).await?;
        if released {
            info!(code, round, %claimant, "released an overdue claim");
        }
        return Ok(released);
    }

    if !state.timers().is_pending(code, TimerKind::AnswerWindow) {
        if let Some(deadline) = session.answer_deadline {
            let remaining = deadline.duration_since(now).unwrap_or_default();
            debug!(code, round, %claimant, ?remaining, "re-arming answer window");
            schedule_answer_window(state, code, guard, remaining);
        }
    }
    Ok(false)
}

fn resume_reveal(state: &SharedState, session: &SessionEntity, now: SystemTime) {
    let code = session.code.as_str();
    // Feedback on a reveal is a failed advance waiting for the host.
    if session.feedback.is_some() || state.timers().is_pending(code, TimerKind::AutoAdvance) {
        return;
    }
    let due = session.updated_at + state.config().timings.reveal_dwell;
    let remaining = due.duration_since(now).unwrap_or_default();
    debug!(code, round = session.round, ?remaining, "re-arming auto-advance");
    arm_auto_advance(state, code, session.round, remaining);
}
