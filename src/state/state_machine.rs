use thiserror::Error;

use crate::dao::models::SessionStatus;

/// Events that move a session between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host starts a game from the lobby.
    StartGame,
    /// The claimant was judged correct.
    CorrectGuess,
    /// The claimant failed and every known player has now attempted.
    Exhausted,
    /// The claimant failed but other players can still buzz.
    WrongGuess,
    /// Skip votes reached the supermajority.
    SkipVoted,
    /// Host forced the reveal.
    HostReveal,
    /// Move to the next round after a reveal.
    Advance,
    /// Last round revealed; compute the winner.
    Finish,
    /// Host returns the session to the lobby.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Status the session was in when the event was received.
    pub from: SessionStatus,
    /// The event that cannot be applied from this status.
    pub event: SessionEvent,
}

/// Compute the status reached by applying `event` while in `from`.
pub fn next_status(
    from: SessionStatus,
    event: SessionEvent,
) -> Result<SessionStatus, InvalidTransition> {
    use SessionEvent as E;
    use SessionStatus as S;

    let next = match (from, event) {
        (S::Lobby, E::StartGame) => S::Playing,
        (S::Playing, E::CorrectGuess | E::Exhausted | E::SkipVoted | E::HostReveal) => S::Revealed,
        (S::Playing, E::WrongGuess) => S::Playing,
        (S::Revealed, E::Advance) => S::Playing,
        (S::Revealed, E::Finish) => S::GameOver,
        (_, E::Reset) => S::Lobby,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

/// Move `status` forward, leaving it untouched on error.
pub fn apply(status: &mut SessionStatus, event: SessionEvent) -> Result<(), InvalidTransition> {
    *status = next_status(*status, event)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[SessionEvent]) -> SessionStatus {
        let mut status = SessionStatus::Lobby;
        for event in events {
            apply(&mut status, *event).unwrap();
        }
        status
    }

    #[test]
    fn full_happy_path_through_game() {
        use SessionEvent::*;
        assert_eq!(run(&[StartGame]), SessionStatus::Playing);
        assert_eq!(
            run(&[StartGame, WrongGuess, CorrectGuess]),
            SessionStatus::Revealed
        );
        assert_eq!(
            run(&[StartGame, CorrectGuess, Advance, SkipVoted, Finish]),
            SessionStatus::GameOver
        );
        assert_eq!(
            run(&[StartGame, HostReveal, Finish, Reset]),
            SessionStatus::Lobby
        );
    }

    #[test]
    fn every_round_end_reveals() {
        for event in [
            SessionEvent::CorrectGuess,
            SessionEvent::Exhausted,
            SessionEvent::SkipVoted,
            SessionEvent::HostReveal,
        ] {
            assert_eq!(
                next_status(SessionStatus::Playing, event),
                Ok(SessionStatus::Revealed)
            );
        }
    }

    #[test]
    fn reset_is_accepted_everywhere() {
        for from in [
            SessionStatus::Lobby,
            SessionStatus::Playing,
            SessionStatus::Revealed,
            SessionStatus::GameOver,
        ] {
            assert_eq!(
                next_status(from, SessionEvent::Reset),
                Ok(SessionStatus::Lobby)
            );
        }
    }

    #[test]
    fn invalid_transition_returns_error() {
        let err = next_status(SessionStatus::Lobby, SessionEvent::CorrectGuess).unwrap_err();
        assert_eq!(err.from, SessionStatus::Lobby);
        assert_eq!(err.event, SessionEvent::CorrectGuess);

        assert!(next_status(SessionStatus::Playing, SessionEvent::Advance).is_err());
        assert!(next_status(SessionStatus::Playing, SessionEvent::Finish).is_err());
        assert!(next_status(SessionStatus::GameOver, SessionEvent::StartGame).is_err());
        assert!(next_status(SessionStatus::Revealed, SessionEvent::WrongGuess).is_err());
    }

    #[test]
    fn failed_apply_keeps_status() {
        let mut status = SessionStatus::Revealed;
        assert!(apply(&mut status, SessionEvent::StartGame).is_err());
        assert_eq!(status, SessionStatus::Revealed);
    }
}
