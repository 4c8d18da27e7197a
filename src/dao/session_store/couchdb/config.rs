use std::env;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_BASE_URL: &str = "http://localhost:5984";
const DEFAULT_DATABASE: &str = "cinescore";

/// Basic-auth pair sent with every CouchDB request.
#[derive(Debug, Clone)]
pub struct CouchCredentials {
    pub username: String,
    pub password: String,
}

/// Where the CouchDB session database lives.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub credentials: Option<CouchCredentials>,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL` and `COUCH_DB` (both defaulted), plus optional
    /// `COUCH_USERNAME`/`COUCH_PASSWORD`, which must be set together.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = env::var("COUCH_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let database = env::var("COUCH_DB").unwrap_or_else(|_| DEFAULT_DATABASE.into());
        let credentials = match (env::var("COUCH_USERNAME"), env::var("COUCH_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(CouchCredentials { username, password }),
            (Err(_), Err(_)) => None,
            (Ok(_), Err(_)) => {
                return Err(CouchDaoError::IncompleteCredentials {
                    missing: "COUCH_PASSWORD",
                });
            }
            (Err(_), Ok(_)) => {
                return Err(CouchDaoError::IncompleteCredentials {
                    missing: "COUCH_USERNAME",
                });
            }
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            database,
            credentials,
        })
    }
}
