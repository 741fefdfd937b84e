use crate::db;
use crate::domain::models::{RankingEntry, SurveyResponse};
use crate::state::SharedState;
use crate::web::error::ApiError;
use crate::web::session::Session;
use axum::{extract::State, routing::get, Json, Router};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/responses", get(all_responses))
        .route("/ranking", get(ranking))
        .with_state(state)
}

/// Every response across every survey, newest first.
async fn all_responses(
    session: Session,
    State(state): State<SharedState>,
) -> Result<Json<Vec<SurveyResponse>>, ApiError> {
    require_admin(&session)?;
    let responses = db::all_responses(&state.pool).await?;
    Ok(Json(responses))
}

/// Company ranking: summed response scores per company.
async fn ranking(
    session: Session,
    State(state): State<SharedState>,
) -> Result<Json<Vec<RankingEntry>>, ApiError> {
    require_admin(&session)?;
    let ranking = db::company_ranking(&state.pool).await?;
    Ok(Json(ranking))
}

fn require_admin(session: &Session) -> Result<(), ApiError> {
    if !session.is_admin() {
        return Err(ApiError::Forbidden("admin role required".to_string()));
    }
    Ok(())
}
