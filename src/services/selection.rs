//! Pure candidate selection for the next round; media lookups stay with the caller.

use rand::{Rng, seq::IndexedRandom};

use crate::dao::models::TriviaItemEntity;

/// Maximum number of candidates tried before giving up on media resolution.
pub const MAX_MEDIA_ATTEMPTS: usize = 5;

/// Items of a category that have not been played yet this game.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    remaining: Vec<TriviaItemEntity>,
}

impl CandidatePool {
    /// Filter `items` down to those whose id is not in `played`.
    pub fn new(items: &[TriviaItemEntity], played: &[String]) -> Self {
        let remaining = items
            .iter()
            .filter(|item| !played.iter().any(|id| *id == item.id))
            .cloned()
            .collect();
        Self { remaining }
    }

    /// Number of candidates left.
    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    /// Whether every item has been played or discarded.
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Pick a candidate uniformly at random.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&TriviaItemEntity> {
        self.remaining.choose(rng)
    }

    /// Remove a candidate whose media could not be resolved.
    pub fn discard(&mut self, id: &str) {
        self.remaining.retain(|item| item.id != id);
    }
}

/// Why selection stopped without an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    /// Nothing unplayed is left in the category.
    NoCandidates,
    /// The attempt budget was spent on unresolvable candidates.
    AttemptsExhausted,
}

/// Next thing the caller should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionStep {
    /// Resolve media for this item.
    Try(TriviaItemEntity),
    /// Stop; no round can start.
    Exhausted {
        /// Cause of the exhaustion.
        reason: ExhaustReason,
    },
}

/// Bounded retry-with-discard loop over a [`CandidatePool`].
#[derive(Debug, Clone)]
pub struct SelectionPlan {
    pool: CandidatePool,
    attempts: usize,
    max_attempts: usize,
}

impl SelectionPlan {
    /// Start a plan allowing at most `max_attempts` draws.
    pub fn new(pool: CandidatePool, max_attempts: usize) -> Self {
        Self {
            pool,
            attempts: 0,
            max_attempts,
        }
    }

    /// Draw the next candidate, or report why there is none.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SelectionStep {
        if self.pool.is_empty() {
            let reason = if self.attempts == 0 {
                ExhaustReason::NoCandidates
            } else {
                ExhaustReason::AttemptsExhausted
            };
            return SelectionStep::Exhausted { reason };
        }
        if self.attempts >= self.max_attempts {
            return SelectionStep::Exhausted {
                reason: ExhaustReason::AttemptsExhausted,
            };
        }

        match self.pool.draw(rng) {
            Some(item) => {
                self.attempts += 1;
                SelectionStep::Try(item.clone())
            }
            None => SelectionStep::Exhausted {
                reason: ExhaustReason::NoCandidates,
            },
        }
    }

    /// Record that the last candidate could not be resolved.
    pub fn reject(&mut self, id: &str) {
        self.pool.discard(id);
    }

    /// Draws made so far.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::dao::models::MediaKind;

    fn items(n: usize) -> Vec<TriviaItemEntity> {
        (0..n)
            .map(|i| TriviaItemEntity {
                id: format!("item-{i}"),
                title: format!("Title {i}"),
                artist: "Artist".into(),
                work: format!("Work {i}"),
                year: None,
                media_kind: MediaKind::Movie,
            })
            .collect()
    }

    #[test]
    fn pool_excludes_played_items() {
        let pool = CandidatePool::new(&items(3), &["item-1".to_string()]);
        assert_eq!(pool.len(), 2);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_ne!(pool.draw(&mut rng).unwrap().id, "item-1");
        }
    }

    #[test]
    fn empty_pool_reports_no_candidates() {
        let played: Vec<String> = items(2).into_iter().map(|item| item.id).collect();
        let mut plan = SelectionPlan::new(CandidatePool::new(&items(2), &played), 5);
        assert_eq!(
            plan.next(&mut StdRng::seed_from_u64(1)),
            SelectionStep::Exhausted {
                reason: ExhaustReason::NoCandidates
            }
        );
    }

    #[test]
    fn rejecting_everything_exhausts_attempts() {
        let mut plan = SelectionPlan::new(CandidatePool::new(&items(10), &[]), MAX_MEDIA_ATTEMPTS);
        let mut rng = StdRng::seed_from_u64(3);
        let mut tried = Vec::new();
        loop {
            match plan.next(&mut rng) {
                SelectionStep::Try(item) => {
                    assert!(!tried.contains(&item.id), "discarded item drawn twice");
                    plan.reject(&item.id);
                    tried.push(item.id);
                }
                SelectionStep::Exhausted { reason } => {
                    assert_eq!(reason, ExhaustReason::AttemptsExhausted);
                    break;
                }
            }
        }
        assert_eq!(tried.len(), MAX_MEDIA_ATTEMPTS);
        assert_eq!(plan.attempts(), MAX_MEDIA_ATTEMPTS);
    }

    #[test]
    fn small_pool_runs_dry_before_budget() {
        let mut plan = SelectionPlan::new(CandidatePool::new(&items(2), &[]), MAX_MEDIA_ATTEMPTS);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..2 {
            let SelectionStep::Try(item) = plan.next(&mut rng) else {
                panic!("expected a candidate");
            };
            plan.reject(&item.id);
        }
        assert_eq!(
            plan.next(&mut rng),
            SelectionStep::Exhausted {
                reason: ExhaustReason::AttemptsExhausted
            }
        );
    }
}
