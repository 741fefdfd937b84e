use crate::db;
use crate::domain::models::Empresa;
use crate::state::SharedState;
use crate::web::error::ApiError;
use axum::{extract::State, routing::get, Json, Router};

pub fn router(state: SharedState) -> Router {
    Router::new().route("/", get(list)).with_state(state)
}

// Public: the registration form needs the company list before any session
// exists.
async fn list(State(state): State<SharedState>) -> Result<Json<Vec<Empresa>>, ApiError> {
    let empresas = db::list_empresas(&state.pool).await?;
    Ok(Json(empresas))
}
