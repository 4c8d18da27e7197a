use std::time::SystemTime;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a session document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players are joining; no round is running.
    Lobby,
    /// A round is in progress and buzzers are live.
    Playing,
    /// The current round ended and its answer is shown.
    Revealed,
    /// The last round was played and the winner is computed.
    GameOver,
}

/// Kind of work a trivia item belongs to, used by cover art lookups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Feature film soundtrack.
    #[default]
    Movie,
    /// Television theme.
    Tv,
}

/// Static trivia entry taken from a catalog category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriviaItemEntity {
    /// Stable identifier, unique inside a category.
    pub id: String,
    /// Track title (e.g. "Main Title").
    pub title: String,
    /// Performer or composer of the track.
    pub artist: String,
    /// Canonical answer: the movie or show the track comes from.
    pub work: String,
    /// Release year of the work, when known.
    #[serde(default)]
    pub year: Option<u16>,
    /// Movie or TV, forwarded to cover art lookups.
    #[serde(default)]
    pub media_kind: MediaKind,
}

/// Trivia item in play for the current round with its resolved media.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentItemEntity {
    /// Catalog entry being played.
    pub item: TriviaItemEntity,
    /// Playable preview clip.
    pub preview_audio_url: String,
    /// Cover image, when one could be found.
    pub cover_image_url: Option<String>,
}

/// The single player currently allowed to answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimEntity {
    /// Identity of the claimant.
    pub player_id: Uuid,
    /// Display name captured when the claim was taken.
    pub display_name: String,
    /// When the buzz was accepted.
    pub claimed_at: SystemTime,
}

/// Answer submitted by the current claimant, awaiting judgment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuessEntity {
    /// Player that submitted the guess.
    pub player_id: Uuid,
    /// Free-text guess as typed.
    pub text: String,
    /// Submission timestamp.
    pub submitted_at: SystemTime,
}

/// Result of the latest judgment, kept for display on reveal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerdictEntity {
    /// Awarded score (0 for wrong or failed judgments).
    pub score: u32,
    /// Explanation returned by the judge or the failure reason.
    pub reason: String,
    /// True when the judge could not produce a valid answer.
    pub failed: bool,
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundEnd {
    /// The claimant was judged correct.
    Correct,
    /// Every known player tried and failed.
    Exhausted,
    /// A supermajority of players voted to skip.
    SkipVote,
    /// The host forced the reveal.
    HostReveal,
}

/// Claimant reference stored in outcomes and winners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimantEntity {
    /// Player identity.
    pub player_id: Uuid,
    /// Display name at the time of the outcome.
    pub display_name: String,
}

/// Outcome of the round that just finished.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundOutcomeEntity {
    /// Round number the outcome belongs to.
    pub round: u32,
    /// Scoring claimant, absent when nobody won the round.
    pub claimant: Option<ClaimantEntity>,
    /// Points awarded to the claimant.
    pub score: u32,
    /// Canonical answer surfaced on reveal.
    pub answer: String,
    /// How the round ended.
    pub end: RoundEnd,
}

/// Winner computed once the last round is over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WinnerEntity {
    /// Winning player.
    pub player_id: Uuid,
    /// Display name of the winner.
    pub display_name: String,
    /// Final score.
    pub score: u32,
}

/// Authoritative state of one game session, keyed by its code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Short human-relayable lookup key.
    pub code: String,
    /// Identity allowed to issue host-only transitions.
    pub host_id: Uuid,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Category chosen at game start.
    pub category: Option<String>,
    /// Number of rounds chosen at game start.
    pub total_rounds: u32,
    /// Round counter, 0 before the first round.
    pub round: u32,
    /// Game generation, bumped on every start; tags score increments.
    pub epoch: u64,
    /// Identities of joined players, in join order.
    pub roster: IndexSet<Uuid>,
    /// Item in play this round.
    pub current_item: Option<CurrentItemEntity>,
    /// Exclusive right to answer.
    pub claim: Option<ClaimEntity>,
    /// Set while a claim is being adjudicated.
    pub buzz_locked: bool,
    /// Deadline for the claimant to submit an answer.
    pub answer_deadline: Option<SystemTime>,
    /// Guess awaiting judgment.
    pub pending_guess: Option<GuessEntity>,
    /// Latest judgment result.
    pub last_verdict: Option<VerdictEntity>,
    /// Outcome of the round that just ended.
    pub last_round_outcome: Option<RoundOutcomeEntity>,
    /// Players locked out for the rest of the round.
    pub attempted_this_round: IndexSet<Uuid>,
    /// Players voting to abandon the round.
    pub skip_votes: IndexSet<Uuid>,
    /// Append-only history of item identifiers used this game.
    pub played_items: Vec<String>,
    /// Winner, set when the game is over.
    pub winner: Option<WinnerEntity>,
    /// Transient message shown to everyone (e.g. a wrong guess).
    pub feedback: Option<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last committed change.
    pub updated_at: SystemTime,
}

impl SessionEntity {
    /// Build a fresh lobby session owned by `host_id`.
    pub fn new(code: String, host_id: Uuid) -> Self {
        let now = SystemTime::now();
        Self {
            code,
            host_id,
            status: SessionStatus::Lobby,
            category: None,
            total_rounds: 0,
            round: 0,
            epoch: 0,
            roster: IndexSet::new(),
            current_item: None,
            claim: None,
            buzz_locked: false,
            answer_deadline: None,
            pending_guess: None,
            last_verdict: None,
            last_round_outcome: None,
            attempted_this_round: IndexSet::new(),
            skip_votes: IndexSet::new(),
            played_items: Vec::new(),
            winner: None,
            feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Drop every piece of per-round claim state.
    pub fn clear_claim(&mut self) {
        self.claim = None;
        self.buzz_locked = false;
        self.answer_deadline = None;
        self.pending_guess = None;
    }

    /// Reset the per-round sets ahead of a new round.
    pub fn clear_round(&mut self) {
        self.clear_claim();
        self.attempted_this_round.clear();
        self.skip_votes.clear();
        self.feedback = None;
        self.last_verdict = None;
        self.last_round_outcome = None;
    }

    /// Whether `player_id` is the host of this session.
    pub fn is_host(&self, player_id: Uuid) -> bool {
        self.host_id == player_id
    }

    /// Whether a claim is still held with no guess submitted after its deadline passed.
    pub fn claim_overdue(&self, now: SystemTime) -> bool {
        self.status == SessionStatus::Playing
            && self.claim.is_some()
            && self.pending_guess.is_none()
            && self.answer_deadline.is_none_or(|deadline| deadline <= now)
    }

    /// Canonical answer of the item in play.
    pub fn canonical_answer(&self) -> Option<&str> {
        self.current_item
            .as_ref()
            .map(|current| current.item.work.as_str())
    }
}

/// Player record stored in the session's child collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identity of the device.
    pub id: Uuid,
    /// Name shown on the leaderboard.
    pub display_name: String,
    /// Optional avatar, as a data URL.
    pub avatar_image: Option<String>,
    /// Score within `epoch`.
    pub score: u32,
    /// Game generation the score belongs to.
    pub epoch: u64,
    /// Highest round already credited in `epoch`.
    pub awarded_round: u32,
    /// Join timestamp, used as the winner tie-break.
    pub joined_at: SystemTime,
}

impl PlayerEntity {
    /// Create a zero-score player belonging to the session's current game.
    pub fn new(id: Uuid, display_name: String, avatar_image: Option<String>, epoch: u64) -> Self {
        Self {
            id,
            display_name,
            avatar_image,
            score: 0,
            epoch,
            awarded_round: 0,
            joined_at: SystemTime::now(),
        }
    }

    /// Score as seen from a game of generation `epoch`.
    ///
    /// Records still tagged with an older generation have not been reset yet and count as 0.
    pub fn score_in(&self, epoch: u64) -> u32 {
        if self.epoch >= epoch { self.score } else { 0 }
    }

    /// Bring the record forward to `epoch`, zeroing scores from previous games.
    ///
    /// Returns whether anything changed.
    pub fn normalize_epoch(&mut self, epoch: u64) -> bool {
        if self.epoch >= epoch {
            return false;
        }
        self.epoch = epoch;
        self.score = 0;
        self.awarded_round = 0;
        true
    }

    /// Credit `award` once; replays of the same round or stale epochs are ignored.
    pub fn apply_award(&mut self, award: &ScoreAward) -> bool {
        self.normalize_epoch(award.epoch);
        if self.epoch != award.epoch || self.awarded_round >= award.round {
            return false;
        }
        self.score = self.score.saturating_add(award.points);
        self.awarded_round = award.round;
        true
    }
}

/// Score increment tagged with the game and round it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreAward {
    /// Game generation the round was played in.
    pub epoch: u64,
    /// Round being credited.
    pub round: u32,
    /// Points to add.
    pub points: u32,
}

/// Opaque revision token used for compare-and-set writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(pub String);

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    /// Revision to pass back on conditional writes.
    pub revision: Revision,
    /// Document content.
    pub value: T,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied.
    Applied,
    /// The stored revision no longer matched; nothing was written.
    Conflict,
}
