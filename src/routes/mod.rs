use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::SharedState;

pub mod catalog;
pub mod docs;
pub mod health;
pub mod identity;
pub mod session;
pub mod sse;

/// Compose all route trees and bind the shared state.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(identity::router())
        .merge(catalog::router())
        .merge(session::router())
        .merge(sse::router())
        .merge(docs::router());

    api_router.with_state(state)
}

/// Full HTTP application: routes plus cross-cutting middleware layers.
pub fn build_router(state: SharedState) -> Router<()> {
    router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
