//! Cancellable per-session round timers.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use tokio::{task::JoinHandle, time::sleep};
use uuid::Uuid;

/// Timer families; at most one of each is pending per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Leave the reveal screen and start the next round.
    AutoAdvance,
    /// Synthesize a wrong answer for an unresponsive claimant.
    AnswerWindow,
    /// Clear the wrong-guess message.
    FeedbackClear,
}

/// Round context captured when a timer is armed; the fired transition re-checks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundGuard {
    /// Round the timer belongs to.
    pub round: u32,
    /// Claimant the timer belongs to, when it is claim-specific.
    pub claimant: Option<Uuid>,
}

struct Scheduled {
    id: u64,
    handle: JoinHandle<()>,
}

/// Registry of pending timers keyed by `(session code, kind)`.
#[derive(Clone, Default)]
pub struct RoundTimers {
    pending: Arc<DashMap<(String, TimerKind), Scheduled>>,
    next_id: Arc<AtomicU64>,
}

impl RoundTimers {
    /// Empty registry; timers are spawned on the current Tokio runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any pending timer of the same kind for `code`.
    ///
    /// A timer detaches itself from the registry when it fires, so cancelling from within the
    /// transition it triggers never aborts the running task.
    pub fn schedule<F>(&self, code: &str, kind: TimerKind, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = (code.to_owned(), kind);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = self.pending.clone();
        let own_key = key.clone();

        // The shard stays locked until the handle is stored, so the task cannot detach early.
        let entry = self.pending.entry(key);
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            pending.remove_if(&own_key, |_, scheduled| scheduled.id == id);
            task.await;
        });
        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(Scheduled { id, handle });
                previous.handle.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Scheduled { id, handle });
            }
        }
    }

    /// Abort the pending timer of `kind` for `code`, if any.
    pub fn cancel(&self, code: &str, kind: TimerKind) {
        if let Some((_, scheduled)) = self.pending.remove(&(code.to_owned(), kind)) {
            scheduled.handle.abort();
        }
    }

    /// Abort every pending timer of `code`.
    pub fn cancel_all(&self, code: &str) {
        for kind in [
            TimerKind::AutoAdvance,
            TimerKind::AnswerWindow,
            TimerKind::FeedbackClear,
        ] {
            self.cancel(code, kind);
        }
    }

    /// Whether a timer of `kind` is pending for `code`.
    pub fn is_pending(&self, code: &str, kind: TimerKind) -> bool {
        self.pending.contains_key(&(code.to_owned(), kind))
    }
}

type JudgingKey = (String, u32, Uuid);

/// Guesses this process is currently judging, keyed by `(session code, round, player)`.
#[derive(Clone, Default)]
pub struct JudgingSlots {
    active: Arc<DashSet<JudgingKey>>,
}

impl JudgingSlots {
    /// No guess reserved.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the judging of `player`'s guess in `round`; `None` while another task holds it.
    pub fn try_acquire(&self, code: &str, round: u32, player: Uuid) -> Option<JudgingSlot> {
        let key = (code.to_owned(), round, player);
        self.active.insert(key.clone()).then(|| JudgingSlot {
            active: self.active.clone(),
            key,
        })
    }

    /// Whether `player`'s guess in `round` is being judged.
    pub fn is_active(&self, code: &str, round: u32, player: Uuid) -> bool {
        self.active.contains(&(code.to_owned(), round, player))
    }
}

/// Reservation released on drop.
pub struct JudgingSlot {
    active: Arc<DashSet<JudgingKey>>,
    key: JudgingKey,
}

impl Drop for JudgingSlot {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous_timer() {
        let timers = RoundTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let fired = fired.clone();
            timers.schedule("ABCD", TimerKind::AutoAdvance, Duration::from_secs(1), async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        sleep(Duration::from_secs(2)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending("ABCD", TimerKind::AutoAdvance));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timers = RoundTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        timers.schedule("ABCD", TimerKind::AnswerWindow, Duration::from_secs(1), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timers.cancel_all("ABCD");
        sleep(Duration::from_secs(2)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_timer_survives_self_cancel() {
        let timers = RoundTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let (counter, registry) = (fired.clone(), timers.clone());
        timers.schedule("ABCD", TimerKind::AutoAdvance, Duration::from_secs(1), async move {
            registry.cancel_all("ABCD");
            tokio::task::yield_now().await;
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sleep(Duration::from_secs(2)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn judging_slot_is_exclusive_until_dropped() {
        let slots = JudgingSlots::new();
        let player = Uuid::new_v4();

        let held = slots.try_acquire("ABCD", 1, player).expect("free slot");
        assert!(slots.try_acquire("ABCD", 1, player).is_none());
        assert!(slots.try_acquire("ABCD", 2, player).is_some());
        assert!(slots.is_active("ABCD", 1, player));

        drop(held);
        assert!(!slots.is_active("ABCD", 1, player));
        assert!(slots.try_acquire("ABCD", 1, player).is_some());
    }
}
