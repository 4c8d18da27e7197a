//! Optimistic read-modify-write over a single session document.

use std::time::SystemTime;

use tracing::debug;

use crate::{
    dao::{
        models::{CasOutcome, SessionEntity},
        session_store::SessionStore,
    },
    error::ServiceError,
};

/// Upper bound on CAS retries before giving up with [`ServiceError::Contention`].
pub const MAX_TX_ATTEMPTS: usize = 8;

/// What a transaction body decided to do with the session it was handed.
#[derive(Debug)]
pub enum TxDecision<T> {
    /// Persist the mutated session and return the value.
    Commit(T),
    /// Leave the stored session untouched and return the value.
    Skip(T),
}

/// Outcome of a transaction: the body's value plus the session as it now stands.
#[derive(Debug)]
pub struct TxOutcome<T> {
    /// Value produced by the body.
    pub value: T,
    /// Session after the transaction (committed state, or the unchanged read on skip).
    pub session: SessionEntity,
    /// Whether anything was written.
    pub committed: bool,
}

/// Run `body` against the freshest copy of session `code` and write it back atomically.
///
/// The body may run several times when concurrent writers move the revision on, so it must be a
/// pure function of the session it receives. Any precondition check belongs inside it.
pub async fn transact<T, F>(
    store: &dyn SessionStore,
    code: &str,
    mut body: F,
) -> Result<TxOutcome<T>, ServiceError>
where
    F: FnMut(&mut SessionEntity) -> Result<TxDecision<T>, ServiceError>,
{
    for attempt in 1..=MAX_TX_ATTEMPTS {
        let Some(current) = store.load_session(code).await? else {
            return Err(ServiceError::NotFound(format!("session `{code}`")));
        };

        let mut session = current.value;
        match body(&mut session)? {
            TxDecision::Skip(value) => {
                return Ok(TxOutcome {
                    value,
                    session,
                    committed: false,
                });
            }
            TxDecision::Commit(value) => {
                session.updated_at = SystemTime::now();
                match store
                    .replace_session(current.revision, session.clone())
                    .await?
                {
                    CasOutcome::Applied => {
                        return Ok(TxOutcome {
                            value,
                            session,
                            committed: true,
                        });
                    }
                    CasOutcome::Conflict => {
                        debug!(code, attempt, "session revision moved; retrying");
                    }
                }
            }
        }
    }

    Err(ServiceError::Contention)
}
