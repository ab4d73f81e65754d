use std::time::Duration;

use anyhow::Result;
use axum::{extract::DefaultBodyLimit, Router};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use promptlab_common::EnvVars;
use promptlab_service_api::{
    dataset_routes, evaluation_routes, misc_routes, prompt_routes, setup_tracing, ApiServerEnv, GlobalState,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_tracing();

    let env = ApiServerEnv::load();
    let cors = CorsLayer::very_permissive();
    let trace = TraceLayer::new_for_http();

    let global_state = GlobalState::new().await;

    let app = Router::new()
        .merge(misc_routes())
        .merge(prompt_routes())
        .merge(dataset_routes())
        .merge(evaluation_routes())
        .layer(DefaultBodyLimit::max(env.max_upload_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(env.request_timeout_secs)))
        .layer(cors)
        .layer(trace)
        .with_state(global_state);

    let port = env.port;
    let listener = tokio::net::TcpListener::bind(format!(":::{port}")).await?;

    tracing::info!("LISTENING ON {port}");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
