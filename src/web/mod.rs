pub mod activity;
pub mod auth;
pub mod employees;
pub mod error;
pub mod forms;
pub mod responses;
pub mod session;

use axum::{routing::get, Router};

use crate::state::SharedState;

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .merge(employees::router(state.clone()))
        .merge(forms::router(state.clone()))
        .merge(responses::router(state.clone()))
        .merge(activity::router(state))
}
