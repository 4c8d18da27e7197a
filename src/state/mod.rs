mod sse;
pub mod state_machine;
pub mod timers;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    catalog::Catalog,
    config::AppConfig,
    dao::session_store::SessionStore,
    error::ServiceError,
    judging::JudgingProvider,
    media::MediaResolver,
    services::identity::IdentityIssuer,
};

pub use self::sse::{SessionHubs, SseHub};
use self::timers::{JudgingSlots, RoundTimers};

pub type SharedState = Arc<AppState>;

/// Capacity of each per-session broadcast channel.
const SESSION_HUB_CAPACITY: usize = 32;

/// Central application state: storage handle, providers, timers and SSE hubs.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    hubs: SessionHubs,
    timers: RoundTimers,
    judging: JudgingSlots,
    identities: IdentityIssuer,
    catalog: Catalog,
    judge: Arc<dyn JudgingProvider>,
    media: Arc<dyn MediaResolver>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        catalog: Catalog,
        judge: Arc<dyn JudgingProvider>,
        media: Arc<dyn MediaResolver>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            hubs: SessionHubs::new(SESSION_HUB_CAPACITY),
            timers: RoundTimers::new(),
            judging: JudgingSlots::new(),
            identities: IdentityIssuer::new(&config.identity),
            catalog,
            judge,
            media,
            config,
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Session store or [`ServiceError::Degraded`] when storage is down.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if *self.degraded.borrow() {
            return Err(ServiceError::Degraded);
        }
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Per-session SSE hubs.
    pub fn hubs(&self) -> &SessionHubs {
        &self.hubs
    }

    /// Pending round timers.
    pub fn timers(&self) -> &RoundTimers {
        &self.timers
    }

    /// Guesses being judged by this process.
    pub fn judging(&self) -> &JudgingSlots {
        &self.judging
    }

    /// Signer for anonymous device identities.
    pub fn identities(&self) -> &IdentityIssuer {
        &self.identities
    }

    /// Trivia content.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Answer judge.
    pub fn judge(&self) -> Arc<dyn JudgingProvider> {
        self.judge.clone()
    }

    /// Media resolver.
    pub fn media(&self) -> Arc<dyn MediaResolver> {
        self.media.clone()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
