use std::sync::Arc;

use sqlx::PgPool;

use crate::middleware::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub session_key: Vec<u8>,
    pub login_limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;
