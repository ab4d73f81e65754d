use axum::{extract::State, http::StatusCode, routing::get, Router};
use serde_json::json;

use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn misc_routes() -> Router<GlobalState> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
}

async fn banner() -> AppSuccess {
    AppSuccess::new(StatusCode::OK, "promptlab is running", json!({
        "service": "promptlab",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<GlobalState>) -> Result<AppSuccess, AppError> {
    sqlx::query("SELECT 1").execute(state.pool()).await?;
    Ok(AppSuccess::new(StatusCode::OK, "OK", json!({ "database": "ok" })))
}
