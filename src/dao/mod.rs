/// Database model definitions.
pub mod models;
/// Session and player persistence behind a pluggable backend.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Optimistic read-modify-write helper over the session store.
pub mod transaction;
