use crate::db;
use crate::domain::models::UserRole;
use crate::web::error::ApiError;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const SESSION_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub role: UserRole,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
    #[error("bad role")]
    Role,
}

pub fn sign_session(user_id: Uuid, role: UserRole, key: &[u8]) -> Result<String, SessionError> {
    sign_with_expiry(user_id, role, key, Utc::now() + Duration::hours(SESSION_HOURS))
}

fn sign_with_expiry(
    user_id: Uuid,
    role: UserRole,
    key: &[u8],
    exp: DateTime<Utc>,
) -> Result<String, SessionError> {
    let payload = format!("{}|{}|{}", user_id, role_string(role), exp.timestamp());
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::STANDARD.encode(payload.as_bytes()),
        general_purpose::STANDARD.encode(sig)
    ))
}

pub fn verify_session(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 2 {
        return Err(SessionError::Invalid);
    }
    let payload_bytes = general_purpose::STANDARD
        .decode(parts[0])
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::STANDARD
        .decode(parts[1])
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let pieces: Vec<&str> = payload.split('|').collect();
    if pieces.len() != 3 {
        return Err(SessionError::Invalid);
    }
    let user_id = Uuid::parse_str(pieces[0]).map_err(|_| SessionError::Invalid)?;
    let role = parse_role(pieces[1])?;
    let exp: i64 = pieces[2].parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims { user_id, role, exp })
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                return Some(bearer.trim().to_string());
            }
        }
    }
    if let Some(cookie) = headers.get(axum::http::header::COOKIE) {
        if let Ok(val) = cookie.to_str() {
            for pair in val.split(';') {
                if let Some(rest) = pair.trim().strip_prefix("session=") {
                    return Some(rest.to_string());
                }
            }
        }
    }
    None
}

pub fn session_cookie(token: &str) -> String {
    let secure = if std::env::var("PRODUCTION").is_ok() {
        "; Secure"
    } else {
        ""
    };
    format!("session={token}; HttpOnly; SameSite=Lax; Path=/{secure}")
}

pub fn clear_session_cookie() -> String {
    "session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0".to_string()
}

fn role_string(role: UserRole) -> &'static str {
    match role {
        UserRole::Admin => "admin",
        UserRole::User => "user",
    }
}

fn parse_role(raw: &str) -> Result<UserRole, SessionError> {
    match raw {
        "admin" => Ok(UserRole::Admin),
        "user" => Ok(UserRole::User),
        _ => Err(SessionError::Role),
    }
}

/// Authenticated request context. The token only proves identity; role and
/// company scope are re-read from the store on every request so there is a
/// single source of truth for authorization.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub role: UserRole,
    pub empresa_id: Uuid,
    pub nombre: String,
    pub email: String,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    crate::state::SharedState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared = crate::state::SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let claims = verify_session(&token, &shared.session_key).map_err(|e| {
            tracing::warn!("session verification failed: {e}");
            ApiError::Unauthorized
        })?;

        let usuario = db::find_usuario_by_id(&shared.pool, claims.user_id)
            .await
            .map_err(|e| {
                tracing::error!("session user lookup failed: {e}");
                ApiError::Internal
            })?
            .ok_or(ApiError::Unauthorized)?;

        if usuario.confirmed_at.is_none() {
            return Err(ApiError::Unauthorized);
        }

        Ok(Session {
            user_id: usuario.id,
            role: usuario.rol,
            empresa_id: usuario.empresa_id,
            nombre: usuario.nombre,
            email: usuario.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn sign_verify_round_trip() {
        let user_id = Uuid::new_v4();
        let token = sign_session(user_id, UserRole::Admin, KEY).unwrap();
        let claims = verify_session(&token, KEY).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.role, UserRole::Admin);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = sign_session(Uuid::new_v4(), UserRole::User, KEY).unwrap();
        let forged_payload =
            general_purpose::STANDARD.encode(format!("{}|admin|{}", Uuid::new_v4(), i64::MAX));
        let sig = token.split('.').nth(1).unwrap();
        let forged = format!("{forged_payload}.{sig}");
        assert!(matches!(
            verify_session(&forged, KEY),
            Err(SessionError::Signature)
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = sign_session(Uuid::new_v4(), UserRole::User, KEY).unwrap();
        assert!(verify_session(&token, b"another-key-entirely-0123456789").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign_with_expiry(
            Uuid::new_v4(),
            UserRole::User,
            KEY,
            Utc::now() - Duration::hours(1),
        )
        .unwrap();
        assert!(matches!(
            verify_session(&token, KEY),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "theme=dark; session=abc123".parse().unwrap(),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer xyz789".parse().unwrap(),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz789"));
    }
}
