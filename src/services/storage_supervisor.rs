use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{session_store::SessionStore, storage::StorageError},
    services::sse_events::broadcast_system_status,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

fn backoff(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Connect the session store, then watch it; sessions answer 503 while it is unreachable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_session_store(store.clone()).await;
                broadcast_system_status(&state, false);
                info!("session store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch(&state, store.as_ref()).await;
                warn!("session store lost; reconnecting from scratch");
            }
            Err(err) => warn!(error = %err, "session store connection attempt failed"),
        }

        sleep(delay).await;
        delay = backoff(delay);
    }
}

/// Poll the store until it fails and cannot be revived in place.
async fn watch(state: &SharedState, store: &dyn SessionStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded() {
                info!("session store healthy again; leaving degraded mode");
                set_degraded(state, false);
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !reconnect(state, store).await {
            warn!("exhausted session store reconnect attempts; staying in degraded mode");
            return;
        }
        set_degraded(state, false);
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect(state: &SharedState, store: &dyn SessionStore) -> bool {
    let mut delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "session store reconnected after failed health check");
                return true;
            }
            Err(err) if attempt == 0 => {
                warn!(attempt, error = %err, "session store reconnect failed; entering degraded mode");
                set_degraded(state, true);
            }
            Err(err) => warn!(attempt, error = %err, "session store reconnect attempt failed"),
        }
        sleep(delay).await;
        delay = backoff(delay);
    }
    false
}

fn set_degraded(state: &SharedState, degraded: bool) {
    if state.is_degraded() != degraded {
        state.update_degraded(degraded);
        broadcast_system_status(state, degraded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(backoff(INITIAL_DELAY), Duration::from_secs(2));
        assert_eq!(backoff(Duration::from_secs(8)), MAX_DELAY);
        assert_eq!(backoff(MAX_DELAY), MAX_DELAY);
    }
}
