use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::{
    CurrentItemEntity, PlayerEntity, RoundEnd, RoundOutcomeEntity, SessionEntity, SessionStatus,
    VerdictEntity, WinnerEntity,
};
use crate::dto::{
    format_system_time,
    validation::{validate_answer_text, validate_avatar, validate_display_name},
};

/// Response returned when a host opens a new session.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    /// Four character join code.
    pub code: String,
}

/// Payload used by a player to join a session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    #[validate(
        length(min = 1, max = 24, message = "Display name must be 1 to 24 characters"),
        custom(function = "validate_display_name")
    )]
    pub display_name: String,
    /// Optional avatar as an image data URL.
    #[serde(default)]
    #[validate(custom(function = "validate_avatar"))]
    pub avatar_image: Option<String>,
}

/// Payload used by the host to start a game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartRequest {
    #[validate(length(min = 1, message = "Category must not be empty"))]
    pub category: String,
    #[validate(range(min = 1, max = 20, message = "Total rounds must be between 1 and 20"))]
    pub total_rounds: u32,
}

/// Free-text guess submitted by the claimant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AnswerRequest {
    #[validate(
        length(min = 1, max = 200, message = "Answer must be 1 to 200 characters"),
        custom(function = "validate_answer_text")
    )]
    pub text: String,
}

/// Why a buzz did not win the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BuzzRejection {
    /// No round is accepting buzzes.
    NotPlaying,
    /// Someone else holds the claim.
    AlreadyClaimed,
    /// The caller already failed this round.
    LockedOut,
}

/// Result of a buzz attempt.
#[derive(Debug, Serialize, ToSchema)]
pub struct BuzzResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<BuzzRejection>,
}

/// Acknowledgement of an answer submission; the verdict arrives over SSE.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerResponse {
    /// `false` when a guess was already pending for this claim.
    pub accepted: bool,
}

/// Tally after a skip vote.
#[derive(Debug, Serialize, ToSchema)]
pub struct SkipVoteResponse {
    pub votes: usize,
    pub players: usize,
    /// Whether this vote reached the supermajority and revealed the round.
    pub round_ended: bool,
}

/// Category listing entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct CategorySummary {
    pub name: String,
    pub item_count: usize,
}

/// Leaderboard row.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerSummary {
    pub id: Uuid,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_image: Option<String>,
    pub score: u32,
    pub joined_at: String,
}

/// Item currently on air. Answer fields are withheld while the round is being played.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentItemView {
    pub preview_audio_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work: Option<String>,
}

/// Player currently holding the right to answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimView {
    pub player_id: Uuid,
    pub display_name: String,
    pub claimed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_deadline: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerdictView {
    pub score: u32,
    pub reason: String,
    pub failed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoundOutcomeView {
    pub round: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimant_name: Option<String>,
    pub score: u32,
    pub answer: String,
    pub end: RoundEnd,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WinnerView {
    pub player_id: Uuid,
    pub display_name: String,
    pub score: u32,
}

/// Full session view pushed to every device.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSnapshot {
    pub code: String,
    pub host_id: Uuid,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub total_rounds: u32,
    pub round: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<CurrentItemView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<ClaimView>,
    pub buzz_locked: bool,
    /// A guess is waiting for its verdict.
    pub judging: bool,
    pub attempted_this_round: Vec<Uuid>,
    pub skip_votes: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verdict: Option<VerdictView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_round_outcome: Option<RoundOutcomeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<WinnerView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub players: Vec<PlayerSummary>,
    pub updated_at: String,
}

impl SessionSnapshot {
    /// Build the public view of `session`; `players` is the session's child collection.
    pub fn build(session: &SessionEntity, players: &[PlayerEntity]) -> Self {
        let hide_answer = session.status == SessionStatus::Playing;

        let mut leaderboard: Vec<&PlayerEntity> = players
            .iter()
            .filter(|player| session.roster.contains(&player.id))
            .collect();
        leaderboard.sort_by(|a, b| {
            b.score_in(session.epoch)
                .cmp(&a.score_in(session.epoch))
                .then(a.joined_at.cmp(&b.joined_at))
        });

        Self {
            code: session.code.clone(),
            host_id: session.host_id,
            status: session.status,
            category: session.category.clone(),
            total_rounds: session.total_rounds,
            round: session.round,
            current_item: session
                .current_item
                .as_ref()
                .map(|current| CurrentItemView::from_entity(current, hide_answer)),
            claim: session.claim.as_ref().map(|claim| ClaimView {
                player_id: claim.player_id,
                display_name: claim.display_name.clone(),
                claimed_at: format_system_time(claim.claimed_at),
                answer_deadline: session.answer_deadline.map(format_system_time),
            }),
            buzz_locked: session.buzz_locked,
            judging: session.pending_guess.is_some(),
            attempted_this_round: session.attempted_this_round.iter().copied().collect(),
            skip_votes: session.skip_votes.iter().copied().collect(),
            // Judge reasons can name the answer.
            last_verdict: session
                .last_verdict
                .as_ref()
                .filter(|_| !hide_answer)
                .map(VerdictView::from),
            last_round_outcome: session
                .last_round_outcome
                .as_ref()
                .map(RoundOutcomeView::from),
            winner: session.winner.as_ref().map(WinnerView::from),
            feedback: session.feedback.clone(),
            players: leaderboard
                .into_iter()
                .map(|player| PlayerSummary {
                    id: player.id,
                    display_name: player.display_name.clone(),
                    avatar_image: player.avatar_image.clone(),
                    score: player.score_in(session.epoch),
                    joined_at: format_system_time(player.joined_at),
                })
                .collect(),
            updated_at: format_system_time(session.updated_at),
        }
    }
}

impl CurrentItemView {
    fn from_entity(current: &CurrentItemEntity, hide_answer: bool) -> Self {
        if hide_answer {
            return Self {
                preview_audio_url: current.preview_audio_url.clone(),
                cover_image_url: None,
                title: None,
                artist: None,
                work: None,
            };
        }
        Self {
            preview_audio_url: current.preview_audio_url.clone(),
            cover_image_url: current.cover_image_url.clone(),
            title: Some(current.item.title.clone()),
            artist: Some(current.item.artist.clone()),
            work: Some(current.item.work.clone()),
        }
    }
}

impl From<&VerdictEntity> for VerdictView {
    fn from(verdict: &VerdictEntity) -> Self {
        Self {
            score: verdict.score,
            reason: verdict.reason.clone(),
            failed: verdict.failed,
        }
    }
}

impl From<&RoundOutcomeEntity> for RoundOutcomeView {
    fn from(outcome: &RoundOutcomeEntity) -> Self {
        Self {
            round: outcome.round,
            claimant_id: outcome.claimant.as_ref().map(|c| c.player_id),
            claimant_name: outcome.claimant.as_ref().map(|c| c.display_name.clone()),
            score: outcome.score,
            answer: outcome.answer.clone(),
            end: outcome.end,
        }
    }
}

impl From<&WinnerEntity> for WinnerView {
    fn from(winner: &WinnerEntity) -> Self {
        Self {
            player_id: winner.player_id,
            display_name: winner.display_name.clone(),
            score: winner.score,
        }
    }
}
