use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use promptlab_runtime::{list_nodes, nodes_summary, PageRequest, Prompt, PromptContent, PromptUpdate};
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Uuid;

use crate::extract::{AppJson, AppPath, AppQuery};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn prompt_routes() -> Router<GlobalState> {
    Router::new()
        .route("/prompts",
            get(list_prompts)
            .post(create_prompt)
        )
        .route("/prompts/id/{id}",
            get(get_prompt)
            .put(update_prompt)
            .delete(delete_prompt)
        )
        .route("/prompts/{id}/production",
            post(promote_prompt)
            .delete(demote_prompt)
        )

        .route("/prompts/node/{node_name}", get(list_node_versions))
        .route("/prompts/node/{node_name}/production", get(get_production_prompt))
        .route("/prompts/node/{node_name}/version/{version}",
            get(get_prompt_version)
            .put(update_prompt_version)
            .delete(delete_prompt_version)
        )

        .route("/prompts/count/{node_name}", get(count_node_versions))
        .route("/prompts/delete-all/{node_name}", delete(delete_node))
        .route("/prompts/nodes", get(get_nodes))
        .route("/prompts/nodes-summary", get(get_nodes_summary))
}

#[derive(Debug, Deserialize)]
pub struct CreatePromptRequest {
    pub node_name: String,
    pub content: PromptContent,
    pub message: Option<String>,
}
async fn create_prompt(
    State(state): State<GlobalState>,
    AppJson(payload): AppJson<CreatePromptRequest>,
) -> Result<AppSuccess, AppError> {
    let prompt = Prompt::new_version(state.pool(), &payload.node_name, payload.content, payload.message).await?;
    Ok(AppSuccess::new(StatusCode::CREATED, "Prompt created successfully", json!(prompt)))
}

#[derive(Debug, Deserialize)]
pub struct ListPromptsQuery {
    page: Option<i64>,
    size: Option<i64>,
    node_name: Option<String>,
    search: Option<String>,
}
async fn list_prompts(
    State(state): State<GlobalState>,
    AppQuery(query): AppQuery<ListPromptsQuery>,
) -> Result<AppSuccess, AppError> {
    let page = PageRequest::new(query.page, query.size)?;
    let prompts = Prompt::list_paginated(
        state.pool(), query.node_name.as_deref(), query.search.as_deref(), page
    ).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompts fetched successfully", json!(prompts)))
}

async fn get_prompt(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<AppSuccess, AppError> {
    let prompt = Prompt::get(state.pool(), id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompt fetched successfully", json!(prompt)))
}

async fn update_prompt(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(changes): AppJson<PromptUpdate>,
) -> Result<AppSuccess, AppError> {
    let prompt = Prompt::patch(state.pool(), id, changes).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompt updated successfully", json!(prompt)))
}

async fn delete_prompt(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<AppSuccess, AppError> {
    Prompt::remove(state.pool(), id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompt deleted successfully", json!({ "id": id })))
}

async fn promote_prompt(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<AppSuccess, AppError> {
    let prompt = Prompt::promote(state.pool(), id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompt set as production", json!(prompt)))
}

async fn demote_prompt(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<AppSuccess, AppError> {
    let prompt = Prompt::demote(state.pool(), id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompt removed from production", json!(prompt)))
}

async fn list_node_versions(
    State(state): State<GlobalState>,
    AppPath(node_name): AppPath<String>,
) -> Result<AppSuccess, AppError> {
    let prompts = Prompt::list_by_node(state.pool(), &node_name).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompts fetched successfully", json!(prompts)))
}

async fn get_production_prompt(
    State(state): State<GlobalState>,
    AppPath(node_name): AppPath<String>,
) -> Result<AppSuccess, AppError> {
    let prompt = Prompt::get_production(state.pool(), &node_name).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Production prompt fetched successfully", json!(prompt)))
}

async fn get_prompt_version(
    State(state): State<GlobalState>,
    AppPath((node_name, version)): AppPath<(String, i32)>,
) -> Result<AppSuccess, AppError> {
    let prompt = Prompt::get_by_version(state.pool(), &node_name, version).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompt fetched successfully", json!(prompt)))
}

async fn update_prompt_version(
    State(state): State<GlobalState>,
    AppPath((node_name, version)): AppPath<(String, i32)>,
    AppJson(changes): AppJson<PromptUpdate>,
) -> Result<AppSuccess, AppError> {
    let prompt = Prompt::patch_by_version(state.pool(), &node_name, version, changes).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompt updated successfully", json!(prompt)))
}

async fn delete_prompt_version(
    State(state): State<GlobalState>,
    AppPath((node_name, version)): AppPath<(String, i32)>,
) -> Result<AppSuccess, AppError> {
    Prompt::remove_by_version(state.pool(), &node_name, version).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompt deleted successfully", json!({
        "node_name": node_name,
        "version": version,
    })))
}

async fn count_node_versions(
    State(state): State<GlobalState>,
    AppPath(node_name): AppPath<String>,
) -> Result<AppSuccess, AppError> {
    let count = Prompt::count_by_node(state.pool(), &node_name).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Prompts counted successfully", json!({
        "node_name": node_name,
        "count": count,
    })))
}

async fn delete_node(
    State(state): State<GlobalState>,
    AppPath(node_name): AppPath<String>,
) -> Result<AppSuccess, AppError> {
    let deleted = Prompt::remove_node(state.pool(), &node_name).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Node prompts deleted successfully", json!({
        "node_name": node_name,
        "deleted": deleted,
    })))
}

async fn get_nodes(State(state): State<GlobalState>) -> Result<AppSuccess, AppError> {
    let nodes = list_nodes(state.pool()).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Nodes fetched successfully", json!(nodes)))
}

async fn get_nodes_summary(State(state): State<GlobalState>) -> Result<AppSuccess, AppError> {
    let summary = nodes_summary(state.pool()).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Node summary fetched successfully", json!(summary)))
}
