//! Error types for the CouchDB session backend.

use reqwest::StatusCode;
use thiserror::Error;

/// Result alias returning [`CouchDaoError`] failures.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while interacting with CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Only one of the user name and password was configured.
    #[error("CouchDB credentials are incomplete, `{missing}` is not set")]
    IncompleteCredentials { missing: &'static str },
    /// The HTTP client could not be constructed.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// Checking whether the database exists failed in transit.
    #[error("failed to query CouchDB database `{database}`")]
    DatabaseQuery {
        database: String,
        #[source]
        source: reqwest::Error,
    },
    /// Creating the database failed in transit.
    #[error("failed to create CouchDB database `{database}`")]
    DatabaseCreate {
        database: String,
        #[source]
        source: reqwest::Error,
    },
    /// The database check or creation answered with an unexpected status.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        database: String,
        status: StatusCode,
    },
    /// A document request never got a response.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// A document request answered with an unexpected status.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// The response body was not valid JSON.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The JSON did not match the expected document shape.
    #[error("failed to deserialize CouchDB value for `{path}`")]
    DeserializeValue {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// A document kept conflicting with concurrent writers.
    #[error("document `{doc_id}` still conflicted after {attempts} attempt(s)")]
    PersistentConflict { doc_id: String, attempts: u32 },
    /// A stored document is inconsistent with its id or lacks a revision.
    #[error("invalid document `{doc_id}`: {kind}")]
    InvalidDocId { doc_id: String, kind: &'static str },
}
