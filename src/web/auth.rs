use crate::db::{self, NewUsuario, TokenPurpose};
use crate::domain::models::UserRole;
use crate::state::SharedState;
use crate::web::error::ApiError;
use crate::web::session::{self, Session};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

const CONFIRM_TOKEN_HOURS: i64 = 48;
const RESET_TOKEN_HOURS: i64 = 2;
const MIN_PASSWORD_LEN: usize = 8;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/confirm", get(confirm))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/reset", post(reset_request))
        .route("/reset/confirm", post(reset_confirm))
        .route("/me", get(me))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub nombre: String,
    pub empresa_id: Uuid,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub email: String,
    pub confirmation_sent: bool,
}

async fn register(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, ApiError> {
    check_rate_limit(&state, addr).await?;

    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::BadRequest("invalid email address".to_string()));
    }

    db::find_empresa(&state.pool, payload.empresa_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("unknown company".to_string()))?;

    let hash = hash_password(&payload.password)?;
    let usuario = db::insert_usuario(
        &state.pool,
        NewUsuario {
            email: email.clone(),
            hash,
            nombre: payload.nombre.trim().to_string(),
            empresa_id: payload.empresa_id,
            rol: UserRole::User,
        },
    )
    .await
    .map_err(register_error)?;

    let token =
        db::create_token(&state.pool, usuario.id, TokenPurpose::Confirm, CONFIRM_TOKEN_HOURS)
            .await?;
    // No SMTP in this deployment; the confirmation link goes out through the
    // log pipeline instead.
    tracing::info!("confirmation link for {email}: /auth/confirm?token={token}");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: usuario.id,
            email,
            confirmation_sent: true,
        }),
    ))
}

#[derive(Deserialize)]
pub struct ConfirmParams {
    pub token: String,
}

async fn confirm(
    State(state): State<SharedState>,
    Query(params): Query<ConfirmParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = db::consume_token(&state.pool, &params.token, TokenPurpose::Confirm)
        .await
        .map_err(|_| ApiError::BadRequest("invalid or expired confirmation token".to_string()))?;
    db::confirm_usuario(&state.pool, user_id).await?;
    tracing::info!("account {user_id} confirmed");
    Ok(Json(serde_json::json!({ "confirmed": true })))
}

#[derive(Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub nombre: String,
    pub rol: UserRole,
    pub empresa_id: Uuid,
}

async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, ApiError> {
    check_rate_limit(&state, addr).await?;

    let email = payload.email.trim().to_lowercase();
    let usuario = db::find_usuario_by_email(&state.pool, &email)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&usuario.hash).map_err(|_| ApiError::Unauthorized)?;
    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    if usuario.confirmed_at.is_none() {
        return Err(ApiError::Forbidden("email not confirmed".to_string()));
    }

    let token = session::sign_session(usuario.id, usuario.rol, &state.session_key)
        .map_err(|_| ApiError::Internal)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::SET_COOKIE,
        session::session_cookie(&token)
            .parse()
            .map_err(|_| ApiError::Internal)?,
    );

    tracing::info!("user {} logged in", usuario.id);
    Ok((
        headers,
        Json(LoginResponse {
            user_id: usuario.id,
            nombre: usuario.nombre,
            rol: usuario.rol,
            empresa_id: usuario.empresa_id,
        }),
    ))
}

async fn logout() -> Result<impl IntoResponse, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::SET_COOKIE,
        session::clear_session_cookie()
            .parse()
            .map_err(|_| ApiError::Internal)?,
    );
    Ok((headers, Json(serde_json::json!({ "logged_out": true }))))
}

#[derive(Deserialize)]
pub struct ResetRequestPayload {
    pub email: String,
}

async fn reset_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Json(payload): Json<ResetRequestPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_rate_limit(&state, addr).await?;

    let email = payload.email.trim().to_lowercase();
    // Respond identically whether or not the account exists.
    if let Some(usuario) = db::find_usuario_by_email(&state.pool, &email).await? {
        let token =
            db::create_token(&state.pool, usuario.id, TokenPurpose::Reset, RESET_TOKEN_HOURS)
                .await?;
        tracing::info!("password reset link for {email}: /auth/reset/confirm token={token}");
    }
    Ok(Json(serde_json::json!({ "sent": true })))
}

#[derive(Deserialize)]
pub struct ResetConfirmPayload {
    pub token: String,
    pub password: String,
}

async fn reset_confirm(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Json(payload): Json<ResetConfirmPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_rate_limit(&state, addr).await?;

    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let user_id = db::consume_token(&state.pool, &payload.token, TokenPurpose::Reset)
        .await
        .map_err(|_| ApiError::BadRequest("invalid or expired reset token".to_string()))?;
    let hash = hash_password(&payload.password)?;
    db::update_password(&state.pool, user_id, &hash).await?;
    tracing::info!("password updated for {user_id}");
    Ok(Json(serde_json::json!({ "updated": true })))
}

#[derive(Serialize)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub nombre: String,
    pub email: String,
    pub rol: UserRole,
    pub empresa_id: Uuid,
}

async fn me(session: Session) -> Json<CurrentUser> {
    Json(CurrentUser {
        user_id: session.user_id,
        nombre: session.nombre,
        email: session.email,
        rol: session.role,
        empresa_id: session.empresa_id,
    })
}

/// A rejected insert on the unique email column means the address is taken;
/// that must come back as a distinct message, never as a success.
fn register_error(err: db::StoreError) -> ApiError {
    match err {
        db::StoreError::Conflict => ApiError::Conflict("email already in use".to_string()),
        other => other.into(),
    }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(rand_core::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            tracing::error!("password hashing failed: {e}");
            ApiError::Internal
        })
}

async fn check_rate_limit(state: &SharedState, addr: SocketAddr) -> Result<(), ApiError> {
    let ip = addr.ip().to_string();
    if !state.auth_limiter.check(&ip).await {
        tracing::warn!("auth rate limit exceeded for {ip}");
        return Err(ApiError::TooManyRequests);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_email_reports_already_in_use() {
        let err = register_error(db::StoreError::Conflict);
        match err {
            ApiError::Conflict(msg) => assert_eq!(msg, "email already in use"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn other_store_errors_pass_through() {
        assert!(matches!(
            register_error(db::StoreError::NotFound),
            ApiError::NotFound
        ));
    }
}
