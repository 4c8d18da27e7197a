use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::session::CategorySummary, services::session_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/categories",
    tag = "catalog",
    responses((status = 200, description = "Playable categories", body = [CategorySummary]))
)]
/// List the categories a host can start a game with.
pub async fn list_categories(State(state): State<SharedState>) -> Json<Vec<CategorySummary>> {
    Json(session_service::list_categories(&state))
}

/// Configure the catalog routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/categories", get(list_categories))
}
