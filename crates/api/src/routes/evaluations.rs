use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use promptlab_runtime::{
    request_node_evaluation, run_evaluation, EvaluationRequest, EvaluationResult, EvaluationStatus,
    NodeEvaluationInput, PageRequest, ResultFilter,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Uuid;

use crate::extract::{AppJson, AppPath, AppQuery};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn evaluation_routes() -> Router<GlobalState> {
    Router::new()
        .route("/evaluations/run", post(run))
        .route("/evaluations/request", post(request_evaluation))
        .route("/evaluations/requests", get(list_requests))
        .route("/evaluations/requests/{id}", get(get_request))
        .route("/evaluations/results", get(list_results))
        .route("/evaluations/results/node/{node_name}", get(node_results))
        .route("/evaluations/metrics", get(list_metrics))
}

#[derive(Debug, Deserialize)]
pub struct RunEvaluationRequest {
    pub prompt_id: Uuid,
    pub dataset_id: Uuid,
    pub metric_name: String,
}
async fn run(
    State(state): State<GlobalState>,
    AppJson(payload): AppJson<RunEvaluationRequest>,
) -> Result<AppSuccess, AppError> {
    let result = run_evaluation(
        state.pool(), &state.metrics, payload.prompt_id, payload.dataset_id, &payload.metric_name
    ).await?;
    Ok(AppSuccess::new(StatusCode::CREATED, "Evaluation completed successfully", json!(result)))
}

async fn request_evaluation(
    State(state): State<GlobalState>,
    AppJson(payload): AppJson<NodeEvaluationInput>,
) -> Result<AppSuccess, AppError> {
    let request = request_node_evaluation(state.pool(), &state.metrics, payload).await?;
    Ok(AppSuccess::new(StatusCode::ACCEPTED, "Evaluation request accepted", json!({
        "request_id": request.id,
        "status": request.status,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    page: Option<i64>,
    size: Option<i64>,
    status: Option<EvaluationStatus>,
}
async fn list_requests(
    State(state): State<GlobalState>,
    AppQuery(query): AppQuery<ListRequestsQuery>,
) -> Result<AppSuccess, AppError> {
    let page = PageRequest::new(query.page, query.size)?;
    let requests = EvaluationRequest::list_paginated(state.pool(), query.status, page).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Evaluation requests fetched successfully", json!(requests)))
}

async fn get_request(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<AppSuccess, AppError> {
    let request = EvaluationRequest::get(state.pool(), id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Evaluation request fetched successfully", json!(request)))
}

#[derive(Debug, Deserialize)]
pub struct ListResultsQuery {
    page: Option<i64>,
    size: Option<i64>,
    prompt_id: Option<Uuid>,
    dataset_id: Option<Uuid>,
    metric_name: Option<String>,
}
async fn list_results(
    State(state): State<GlobalState>,
    AppQuery(query): AppQuery<ListResultsQuery>,
) -> Result<AppSuccess, AppError> {
    let page = PageRequest::new(query.page, query.size)?;
    let filter = ResultFilter {
        prompt_id: query.prompt_id,
        dataset_id: query.dataset_id,
        metric_name: query.metric_name,
    };
    let results = EvaluationResult::list_paginated(state.pool(), &filter, page).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Evaluation results fetched successfully", json!(results)))
}

#[derive(Debug, Deserialize)]
pub struct NodeResultsQuery {
    metric_name: Option<String>,
}
async fn node_results(
    State(state): State<GlobalState>,
    AppPath(node_name): AppPath<String>,
    AppQuery(query): AppQuery<NodeResultsQuery>,
) -> Result<AppSuccess, AppError> {
    let results = EvaluationResult::for_node(state.pool(), &node_name, query.metric_name.as_deref()).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Node evaluation results fetched successfully", json!({
        "node_name": node_name,
        "results": results,
    })))
}

async fn list_metrics(State(state): State<GlobalState>) -> AppSuccess {
    AppSuccess::new(StatusCode::OK, "Metrics fetched successfully", json!(state.metrics.list()))
}
