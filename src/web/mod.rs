pub mod admin;
pub mod auth;
pub mod empresas;
pub mod error;
pub mod session;
pub mod surveys;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/surveys", surveys::router(state.clone()))
        .nest("/responses", surveys::responses_router(state.clone()))
        .nest("/empresas", empresas::router(state.clone()))
        .nest("/admin", admin::router(state))
}
