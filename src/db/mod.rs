pub mod seed;

use crate::domain::models::{Empresa, Question, RankingEntry, Survey, SurveyResponse, UserRole};
use crate::domain::survey::{self, SchemaError};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Everything the store can answer with. Propagated unchanged to callers;
/// no retries or recovery happen at this layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("record not found")]
    NotFound,
    #[error("conflicts with an existing record")]
    Conflict,
    #[error("stored questions are malformed: {0}")]
    Schema(#[from] SchemaError),
}

/// Unique-constraint rejections become `Conflict`; everything else stays a
/// plain query failure.
fn insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.code().as_deref() == Some("23505") {
            return StoreError::Conflict;
        }
    }
    StoreError::Query(err)
}

// Carries the password hash, so it never derives Serialize.
#[derive(Debug, FromRow)]
pub struct DbUsuario {
    pub id: Uuid,
    pub email: String,
    pub hash: String,
    pub nombre: String,
    pub empresa_id: Uuid,
    pub rol: UserRole,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SurveyRow {
    id: Uuid,
    title: String,
    description: String,
    empresa_id: Uuid,
    questions: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SurveyRow {
    fn into_survey(self) -> Result<Survey, StoreError> {
        let questions = survey::normalize_questions(&self.questions)?;
        Ok(Survey {
            id: self.id,
            title: self.title,
            description: self.description,
            empresa_id: self.empresa_id,
            questions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Surveys
// ---------------------------------------------------------------------------

pub async fn list_surveys(pool: &PgPool, empresa_id: Uuid) -> Result<Vec<Survey>, StoreError> {
    let rows = sqlx::query_as::<_, SurveyRow>(
        r#"
        SELECT id, title, description, empresa_id, questions, created_at, updated_at
        FROM surveys
        WHERE empresa_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(empresa_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(SurveyRow::into_survey).collect()
}

pub async fn find_survey(pool: &PgPool, id: Uuid) -> Result<Survey, StoreError> {
    let row = sqlx::query_as::<_, SurveyRow>(
        r#"
        SELECT id, title, description, empresa_id, questions, created_at, updated_at
        FROM surveys
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound)?;
    row.into_survey()
}

pub struct NewSurvey {
    pub title: String,
    pub description: String,
    pub empresa_id: Uuid,
    pub questions: Vec<Question>,
}

pub async fn insert_survey(pool: &PgPool, survey: NewSurvey) -> Result<Survey, StoreError> {
    let row = sqlx::query_as::<_, SurveyRow>(
        r#"
        INSERT INTO surveys (title, description, empresa_id, questions)
        VALUES ($1, $2, $3, $4)
        RETURNING id, title, description, empresa_id, questions, created_at, updated_at
        "#,
    )
    .bind(&survey.title)
    .bind(&survey.description)
    .bind(survey.empresa_id)
    .bind(survey::questions_to_value(&survey.questions))
    .fetch_one(pool)
    .await
    .map_err(insert_error)?;
    row.into_survey()
}

#[derive(Default)]
pub struct SurveyUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub questions: Option<Vec<Question>>,
}

pub async fn update_survey(
    pool: &PgPool,
    id: Uuid,
    fields: SurveyUpdate,
) -> Result<Survey, StoreError> {
    let questions = fields.questions.as_deref().map(survey::questions_to_value);
    let row = sqlx::query_as::<_, SurveyRow>(
        r#"
        UPDATE surveys
        SET title = COALESCE($2, title),
            description = COALESCE($3, description),
            questions = COALESCE($4, questions),
            updated_at = now()
        WHERE id = $1
        RETURNING id, title, description, empresa_id, questions, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(fields.title)
    .bind(fields.description)
    .bind(questions)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound)?;
    row.into_survey()
}

pub async fn delete_survey(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM surveys WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

pub async fn insert_response(
    pool: &PgPool,
    survey_id: Uuid,
    user_id: Uuid,
    answers: &serde_json::Value,
    score: i32,
) -> Result<SurveyResponse, StoreError> {
    let response = sqlx::query_as::<_, SurveyResponse>(
        r#"
        INSERT INTO survey_responses (survey_id, user_id, answers, score)
        VALUES ($1, $2, $3, $4)
        RETURNING id, survey_id, user_id, answers, score, created_at
        "#,
    )
    .bind(survey_id)
    .bind(user_id)
    .bind(answers)
    .bind(score)
    .fetch_one(pool)
    .await
    .map_err(insert_error)?;
    Ok(response)
}

pub async fn responses_by_survey(
    pool: &PgPool,
    survey_id: Uuid,
) -> Result<Vec<SurveyResponse>, StoreError> {
    let responses = sqlx::query_as::<_, SurveyResponse>(
        r#"
        SELECT id, survey_id, user_id, answers, score, created_at
        FROM survey_responses
        WHERE survey_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(survey_id)
    .fetch_all(pool)
    .await?;
    Ok(responses)
}

pub async fn responses_by_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<SurveyResponse>, StoreError> {
    let responses = sqlx::query_as::<_, SurveyResponse>(
        r#"
        SELECT id, survey_id, user_id, answers, score, created_at
        FROM survey_responses
        WHERE user_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(responses)
}

pub async fn all_responses(pool: &PgPool) -> Result<Vec<SurveyResponse>, StoreError> {
    let responses = sqlx::query_as::<_, SurveyResponse>(
        r#"
        SELECT id, survey_id, user_id, answers, score, created_at
        FROM survey_responses
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(responses)
}

// ---------------------------------------------------------------------------
// Usuarios
// ---------------------------------------------------------------------------

pub async fn find_usuario_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<DbUsuario>, StoreError> {
    let usuario = sqlx::query_as::<_, DbUsuario>(
        r#"
        SELECT id, email, hash, nombre, empresa_id, rol, confirmed_at, created_at
        FROM usuarios
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(usuario)
}

pub async fn find_usuario_by_id(pool: &PgPool, id: Uuid) -> Result<Option<DbUsuario>, StoreError> {
    let usuario = sqlx::query_as::<_, DbUsuario>(
        r#"
        SELECT id, email, hash, nombre, empresa_id, rol, confirmed_at, created_at
        FROM usuarios
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(usuario)
}

pub struct NewUsuario {
    pub email: String,
    pub hash: String,
    pub nombre: String,
    pub empresa_id: Uuid,
    pub rol: UserRole,
}

pub async fn insert_usuario(pool: &PgPool, usuario: NewUsuario) -> Result<DbUsuario, StoreError> {
    let inserted = sqlx::query_as::<_, DbUsuario>(
        r#"
        INSERT INTO usuarios (email, hash, nombre, empresa_id, rol)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, email, hash, nombre, empresa_id, rol, confirmed_at, created_at
        "#,
    )
    .bind(&usuario.email)
    .bind(&usuario.hash)
    .bind(&usuario.nombre)
    .bind(usuario.empresa_id)
    .bind(usuario.rol)
    .fetch_one(pool)
    .await
    .map_err(insert_error)?;
    Ok(inserted)
}

pub async fn confirm_usuario(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE usuarios SET confirmed_at = COALESCE(confirmed_at, now()) WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn update_password(pool: &PgPool, id: Uuid, hash: &str) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE usuarios SET hash = $2 WHERE id = $1")
        .bind(id)
        .bind(hash)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Empresas
// ---------------------------------------------------------------------------

pub async fn list_empresas(pool: &PgPool) -> Result<Vec<Empresa>, StoreError> {
    let empresas = sqlx::query_as::<_, Empresa>("SELECT id, nombre FROM empresas ORDER BY nombre")
        .fetch_all(pool)
        .await?;
    Ok(empresas)
}

pub async fn find_empresa(pool: &PgPool, id: Uuid) -> Result<Option<Empresa>, StoreError> {
    let empresa = sqlx::query_as::<_, Empresa>("SELECT id, nombre FROM empresas WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(empresa)
}

pub async fn company_ranking(pool: &PgPool) -> Result<Vec<RankingEntry>, StoreError> {
    let ranking = sqlx::query_as::<_, RankingEntry>(
        r#"
        SELECT empresa_id, nombre_empresa, puntaje
        FROM ranking_empresas
        ORDER BY puntaje DESC, nombre_empresa
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(ranking)
}

// ---------------------------------------------------------------------------
// Account tokens (email confirmation, password reset)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Confirm,
    Reset,
}

impl TokenPurpose {
    fn as_str(self) -> &'static str {
        match self {
            TokenPurpose::Confirm => "confirm",
            TokenPurpose::Reset => "reset",
        }
    }
}

pub async fn create_token(
    pool: &PgPool,
    user_id: Uuid,
    purpose: TokenPurpose,
    ttl_hours: i64,
) -> Result<String, StoreError> {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    sqlx::query(
        r#"
        INSERT INTO account_tokens (token, user_id, purpose, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&token)
    .bind(user_id)
    .bind(purpose.as_str())
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(token)
}

/// Marks the token used and returns its owner. A missing, spent, expired or
/// wrong-purpose token all look the same to the caller.
pub async fn consume_token(
    pool: &PgPool,
    token: &str,
    purpose: TokenPurpose,
) -> Result<Uuid, StoreError> {
    let user_id: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE account_tokens
        SET used = TRUE
        WHERE token = $1
          AND purpose = $2
          AND used = FALSE
          AND expires_at > now()
        RETURNING user_id
        "#,
    )
    .bind(token)
    .bind(purpose.as_str())
    .fetch_optional(pool)
    .await?;
    user_id.ok_or(StoreError::NotFound)
}
