use crate::db::{self, NewSurvey, StoreError, SurveyUpdate};
use crate::domain::answers::{AnswerSheet, AnswerValue};
use crate::domain::models::{Question, Survey, SurveyResponse};
use crate::domain::survey::normalize_questions;
use crate::state::SharedState;
use crate::web::error::ApiError;
use crate::web::session::Session;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(fetch).put(update).delete(remove))
        .route("/:id/responses", get(list_responses).post(submit))
        .route("/:id/results", get(results))
        .with_state(state)
}

pub fn responses_router(state: SharedState) -> Router {
    Router::new()
        .route("/mine", get(my_responses))
        .with_state(state)
}

#[derive(Serialize)]
pub struct SurveySummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub question_count: usize,
}

impl From<&Survey> for SurveySummary {
    fn from(survey: &Survey) -> Self {
        SurveySummary {
            id: survey.id,
            title: survey.title.clone(),
            description: survey.description.clone(),
            question_count: survey.questions.len(),
        }
    }
}

#[derive(Serialize)]
pub struct SurveyList {
    pub available: Vec<SurveySummary>,
    pub completed: Vec<SurveySummary>,
}

/// Company-scoped survey listing, split at read time into surveys the user
/// has not answered yet and surveys they already completed.
async fn list(
    session: Session,
    State(state): State<SharedState>,
) -> Result<Json<SurveyList>, ApiError> {
    let surveys = db::list_surveys(&state.pool, session.empresa_id).await?;
    let answered: HashSet<Uuid> = db::responses_by_user(&state.pool, session.user_id)
        .await?
        .into_iter()
        .map(|r| r.survey_id)
        .collect();
    Ok(Json(split_by_answered(&surveys, &answered)))
}

fn split_by_answered(surveys: &[Survey], answered: &HashSet<Uuid>) -> SurveyList {
    let mut listing = SurveyList {
        available: Vec::new(),
        completed: Vec::new(),
    };
    for survey in surveys {
        if answered.contains(&survey.id) {
            listing.completed.push(survey.into());
        } else {
            listing.available.push(survey.into());
        }
    }
    listing
}

/// Every key in a submitted sheet must name a question that exists on the
/// survey; anything else is a malformed submission.
fn check_answer_keys(sheet: &AnswerSheet, questions: &[Question]) -> Result<(), ApiError> {
    let known: HashSet<String> = questions.iter().map(|q| q.id.to_string()).collect();
    for key in sheet.keys() {
        if !known.contains(key) {
            return Err(ApiError::BadRequest(format!("unknown question key {key}")));
        }
    }
    Ok(())
}

async fn my_responses(
    session: Session,
    State(state): State<SharedState>,
) -> Result<Json<Vec<SurveyResponse>>, ApiError> {
    let responses = db::responses_by_user(&state.pool, session.user_id).await?;
    Ok(Json(responses))
}

async fn fetch(
    session: Session,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Survey>, ApiError> {
    let survey = db::find_survey(&state.pool, id).await?;
    check_scope(&session, &survey)?;
    Ok(Json(survey))
}

#[derive(Deserialize)]
pub struct CreateSurveyPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Accepted in any of the legacy shapes; normalized before storage.
    #[serde(default)]
    pub questions: Value,
    pub empresa_id: Option<Uuid>,
}

async fn create(
    session: Session,
    State(state): State<SharedState>,
    Json(payload): Json<CreateSurveyPayload>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&session)?;
    let questions = normalize_questions(&payload.questions)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let survey = db::insert_survey(
        &state.pool,
        NewSurvey {
            title: payload.title,
            description: payload.description,
            empresa_id: payload.empresa_id.unwrap_or(session.empresa_id),
            questions,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(survey)))
}

#[derive(Deserialize)]
pub struct UpdateSurveyPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub questions: Option<Value>,
}

async fn update(
    session: Session,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSurveyPayload>,
) -> Result<Json<Survey>, ApiError> {
    require_admin(&session)?;
    let questions = payload
        .questions
        .as_ref()
        .map(normalize_questions)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let survey = db::update_survey(
        &state.pool,
        id,
        SurveyUpdate {
            title: payload.title,
            description: payload.description,
            questions,
        },
    )
    .await?;
    Ok(Json(survey))
}

async fn remove(
    session: Session,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_admin(&session)?;
    db::delete_survey(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SubmitPayload {
    pub answers: BTreeMap<String, AnswerValue>,
}

/// One response row per (user, survey). Score is one point per answered
/// question; a second submission is rejected, not deduplicated.
async fn submit(
    session: Session,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let survey = db::find_survey(&state.pool, id).await?;
    check_scope(&session, &survey)?;

    let sheet = AnswerSheet::from_payload(payload.answers);
    check_answer_keys(&sheet, &survey.questions)?;

    let response = db::insert_response(
        &state.pool,
        survey.id,
        session.user_id,
        &sheet.to_value(),
        sheet.answered_count() as i32,
    )
    .await
    .map_err(|err| match err {
        StoreError::Conflict => ApiError::Conflict("survey already answered".to_string()),
        other => other.into(),
    })?;

    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Serialize, PartialEq, Debug)]
pub struct OptionCount {
    pub option: String,
    pub count: i64,
}

#[derive(Serialize)]
pub struct ResultsResponse {
    pub survey_id: Uuid,
    pub total_responses: usize,
    pub counts: Vec<OptionCount>,
}

/// Aggregated per-option tally across every response to the survey. Zero
/// responses yields an empty tally so clients show a zero-state instead of
/// an empty chart.
async fn results(
    session: Session,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let survey = db::find_survey(&state.pool, id).await?;
    check_scope(&session, &survey)?;

    let responses = db::responses_by_survey(&state.pool, id).await?;
    Ok(Json(ResultsResponse {
        survey_id: id,
        total_responses: responses.len(),
        counts: tally_options(&responses),
    }))
}

async fn list_responses(
    session: Session,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SurveyResponse>>, ApiError> {
    require_admin(&session)?;
    let responses = db::responses_by_survey(&state.pool, id).await?;
    Ok(Json(responses))
}

/// Counts how often each option value was selected, over single values and
/// multi-select arrays alike.
fn tally_options(responses: &[SurveyResponse]) -> Vec<OptionCount> {
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for response in responses {
        let Some(answers) = response.answers.as_object() else {
            continue;
        };
        for value in answers.values() {
            match value {
                Value::String(s) => *counts.entry(s.clone()).or_insert(0) += 1,
                Value::Array(values) => {
                    for v in values {
                        if let Some(s) = v.as_str() {
                            *counts.entry(s.to_string()).or_insert(0) += 1;
                        }
                    }
                }
                Value::Number(n) => *counts.entry(n.to_string()).or_insert(0) += 1,
                _ => {}
            }
        }
    }
    let mut tallied: Vec<OptionCount> = counts
        .into_iter()
        .map(|(option, count)| OptionCount { option, count })
        .collect();
    tallied.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.option.cmp(&b.option)));
    tallied
}

fn check_scope(session: &Session, survey: &Survey) -> Result<(), ApiError> {
    if survey.empresa_id != session.empresa_id && !session.is_admin() {
        return Err(ApiError::Forbidden(
            "survey belongs to another company".to_string(),
        ));
    }
    Ok(())
}

fn require_admin(session: &Session) -> Result<(), ApiError> {
    if !session.is_admin() {
        return Err(ApiError::Forbidden("admin role required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn response_with(answers: Value) -> SurveyResponse {
        SurveyResponse {
            id: Uuid::new_v4(),
            survey_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            answers,
            score: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tally_counts_single_and_multi_values() {
        let responses = vec![
            response_with(json!({ "0": "A", "1": ["B", "C"] })),
            response_with(json!({ "0": "A", "1": ["B"] })),
        ];
        let counts = tally_options(&responses);
        assert_eq!(
            counts,
            vec![
                OptionCount { option: "A".into(), count: 2 },
                OptionCount { option: "B".into(), count: 2 },
                OptionCount { option: "C".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn tally_of_nothing_is_empty() {
        assert!(tally_options(&[]).is_empty());
    }

    #[test]
    fn tally_counts_numeric_answers() {
        let responses = vec![response_with(json!({ "0": 3, "1": 3 }))];
        let counts = tally_options(&responses);
        assert_eq!(counts, vec![OptionCount { option: "3".into(), count: 2 }]);
    }

    fn survey_named(title: &str) -> Survey {
        Survey {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            empresa_id: Uuid::new_v4(),
            questions: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn answered_surveys_move_to_completed() {
        let surveys = vec![survey_named("S1"), survey_named("S2")];
        let answered: HashSet<Uuid> = [surveys[0].id].into_iter().collect();

        let listing = split_by_answered(&surveys, &answered);
        assert_eq!(listing.completed.len(), 1);
        assert_eq!(listing.completed[0].title, "S1");
        assert_eq!(listing.available.len(), 1);
        assert_eq!(listing.available[0].title, "S2");
    }

    #[test]
    fn nothing_answered_means_everything_available() {
        let surveys = vec![survey_named("S1")];
        let listing = split_by_answered(&surveys, &HashSet::new());
        assert_eq!(listing.available.len(), 1);
        assert!(listing.completed.is_empty());
    }

    fn question(id: u32) -> Question {
        Question {
            id,
            text: format!("Q{id}"),
            options: vec!["A".into(), "B".into()],
            multiple: false,
        }
    }

    #[test]
    fn sheet_keyed_by_existing_questions_passes() {
        let questions = vec![question(0), question(1)];
        let sheet = AnswerSheet::from_payload(
            [("0".to_string(), AnswerValue::One("A".into()))].into(),
        );
        assert!(check_answer_keys(&sheet, &questions).is_ok());
    }

    #[test]
    fn sheet_with_unknown_key_is_rejected() {
        let questions = vec![question(0)];
        let sheet = AnswerSheet::from_payload(
            [("7".to_string(), AnswerValue::One("A".into()))].into(),
        );
        match check_answer_keys(&sheet, &questions) {
            Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "unknown question key 7"),
            other => panic!("expected bad request, got {other:?}"),
        }
    }
}
