use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{PlayerEntity, SessionEntity},
        session_store::SessionStore,
        transaction::{TxDecision, transact},
    },
    dto::session::{CategorySummary, SessionSnapshot},
    error::ServiceError,
    services::{
        recovery,
        sse_events::{publish_closed, publish_session},
    },
    state::SharedState,
};

const CODE_LENGTH: usize = 4;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Collisions are rare with 36^4 codes; give up long before it matters.
const MAX_CODE_ATTEMPTS: usize = 16;

/// Random join code of [`CODE_LENGTH`] uppercase alphanumerics.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

pub(crate) fn not_found(code: &str) -> ServiceError {
    ServiceError::NotFound(format!("session `{code}` not found"))
}

/// Fail unless `caller` owns the session.
pub(crate) fn ensure_host(session: &SessionEntity, caller: Uuid) -> Result<(), ServiceError> {
    if session.is_host(caller) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("only the host may do this".into()))
    }
}

/// Fail unless `caller` is the host or a joined player.
pub(crate) fn ensure_member(session: &SessionEntity, caller: Uuid) -> Result<(), ServiceError> {
    if session.is_host(caller) || session.roster.contains(&caller) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("join the session first".into()))
    }
}

pub(crate) async fn load_existing(
    store: &dyn SessionStore,
    code: &str,
) -> Result<SessionEntity, ServiceError> {
    store
        .load_session(code)
        .await?
        .map(|current| current.value)
        .ok_or_else(|| not_found(code))
}

/// Build the public view of `session` with a fresh read of its players.
pub async fn snapshot_of(
    state: &SharedState,
    session: &SessionEntity,
) -> Result<SessionSnapshot, ServiceError> {
    let store = state.require_session_store().await?;
    let players = store.list_players(&session.code).await?;
    Ok(SessionSnapshot::build(session, &players))
}

/// Open a new session owned by `host` and return its join code.
pub async fn create_session(state: &SharedState, host: Uuid) -> Result<String, ServiceError> {
    let store = state.require_session_store().await?;

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = generate_code(&mut rand::rng());
        if store
            .insert_session(SessionEntity::new(code.clone(), host))
            .await?
        {
            info!(%code, host_id = %host, "session created");
            return Ok(code);
        }
        debug!(%code, attempt, "session code already taken");
    }

    Err(ServiceError::Contention)
}

/// Join `code` as `player_id`, or refresh the name and avatar of a returning player.
///
/// A returning player keeps the score of the current game.
pub async fn join_session(
    state: &SharedState,
    code: &str,
    player_id: Uuid,
    display_name: String,
    avatar_image: Option<String>,
) -> Result<SessionSnapshot, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_existing(store.as_ref(), code).await?;

    let player = PlayerEntity::new(
        player_id,
        display_name.trim().to_owned(),
        avatar_image,
        session.epoch,
    );
    store.upsert_player(code, player).await?;

    let joined = transact(store.as_ref(), code, |session| {
        if session.roster.insert(player_id) {
            Ok(TxDecision::Commit(true))
        } else {
            Ok(TxDecision::Skip(false))
        }
    })
    .await;
    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(err @ ServiceError::NotFound(_)) => {
            // The session was abandoned between the player write and the roster update.
            if let Err(cleanup) = store.remove_player(code, player_id).await {
                warn!(code, %player_id, error = %cleanup, "failed to drop player of a deleted session");
            }
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    if outcome.value {
        info!(code, %player_id, players = outcome.session.roster.len(), "player joined");
    } else {
        debug!(code, %player_id, "player rejoined");
    }

    publish_session(state, &outcome.session).await;
    snapshot_of(state, &outcome.session).await
}

/// Current snapshot of `code`.
pub async fn get_snapshot(state: &SharedState, code: &str) -> Result<SessionSnapshot, ServiceError> {
    let store = state.require_session_store().await?;
    let mut session = load_existing(store.as_ref(), code).await?;
    match recovery::resume(state, &session).await {
        Ok(true) => session = load_existing(store.as_ref(), code).await?,
        Ok(false) => {}
        Err(err) => warn!(code, error = %err, "failed to resume session"),
    }
    snapshot_of(state, &session).await
}

/// Abandon a session: drop it with its players, stop its timers and close its streams.
pub async fn delete_session(state: &SharedState, code: &str, caller: Uuid) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_existing(store.as_ref(), code).await?;
    ensure_host(&session, caller)?;

    if !store.delete_session(code).await? {
        return Err(not_found(code));
    }
    state.timers().cancel_all(code);
    publish_closed(state, code);
    info!(code, "session abandoned by host");
    Ok(())
}

/// Categories available to start a game with.
pub fn list_categories(state: &SharedState) -> Vec<CategorySummary> {
    state
        .catalog()
        .summaries()
        .map(|(name, item_count)| CategorySummary {
            name: name.to_owned(),
            item_count,
        })
        .collect()
}
