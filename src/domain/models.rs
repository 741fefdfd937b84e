use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

/// Canonical question schema. Stored survey definitions may predate this
/// shape (bare strings, option objects, JSON-encoded strings); everything is
/// normalized into this form before a survey leaves the db layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: u32,
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub multiple: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Survey {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub empresa_id: Uuid,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SurveyResponse {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub user_id: Uuid,
    pub answers: serde_json::Value,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Empresa {
    pub id: Uuid,
    pub nombre: String,
}

/// One row of the `ranking_empresas` view: summed response score per company.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RankingEntry {
    pub empresa_id: Uuid,
    pub nombre_empresa: String,
    pub puntaje: i64,
}
