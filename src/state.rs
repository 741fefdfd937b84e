use crate::middleware::RateLimiter;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub session_key: Vec<u8>,
    pub auth_limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;
