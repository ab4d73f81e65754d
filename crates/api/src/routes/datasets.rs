use anyhow::anyhow;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use promptlab_runtime::{Dataset, DatasetUpdate, PageRequest};
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Uuid;

use crate::extract::{AppJson, AppPath, AppQuery};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn dataset_routes() -> Router<GlobalState> {
    Router::new()
        .route("/datasets",
            get(list_datasets)
            .post(upload_dataset)
        )
        .route("/datasets/list", get(list_dataset_briefs))
        .route("/datasets/search", get(search_datasets))
        .route("/datasets/{id}",
            get(get_dataset)
            .put(update_dataset)
            .delete(delete_dataset)
        )
        .route("/datasets/{id}/download", get(download_dataset))
}

#[derive(Debug, Default)]
struct UploadForm {
    name: Option<String>,
    description: Option<String>,
    content_type: Option<String>,
    bytes: Option<Vec<u8>>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().map(str::to_string);
            match field_name.as_deref() {
                Some("name") => form.name = Some(field.text().await?),
                Some("description") => {
                    let description = field.text().await?;
                    form.description = Some(description).filter(|d| !d.trim().is_empty());
                }
                Some("file") => {
                    form.content_type = Some(field.content_type().unwrap_or_default().to_string());
                    form.bytes = Some(field.bytes().await?.to_vec());
                }
                other => tracing::debug!("[upload_dataset] ignoring multipart field {:?}", other),
            }
        }
        Ok(form)
    }
}

async fn upload_dataset(
    State(state): State<GlobalState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<AppSuccess, AppError> {
    let form = UploadForm::read(multipart?).await?;

    let name = form.name
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, anyhow!("Missing form field: name")))?;
    let bytes = form.bytes
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, anyhow!("Missing form field: file")))?;
    let content_type = form.content_type.unwrap_or_default();

    let dataset = Dataset::upload(state.pool(), &name, form.description, &content_type, bytes).await?;
    Ok(AppSuccess::new(StatusCode::CREATED, "Dataset uploaded successfully", json!(dataset)))
}

#[derive(Debug, Deserialize)]
pub struct ListDatasetsQuery {
    page: Option<i64>,
    size: Option<i64>,
    search: Option<String>,
}
async fn list_datasets(
    State(state): State<GlobalState>,
    AppQuery(query): AppQuery<ListDatasetsQuery>,
) -> Result<AppSuccess, AppError> {
    let page = PageRequest::new(query.page, query.size)?;
    let datasets = Dataset::list_paginated(state.pool(), query.search.as_deref(), page).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Datasets fetched successfully", json!(datasets)))
}

async fn list_dataset_briefs(State(state): State<GlobalState>) -> Result<AppSuccess, AppError> {
    let datasets = Dataset::list_brief(state.pool()).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Datasets fetched successfully", json!(datasets)))
}

#[derive(Debug, Deserialize)]
pub struct SearchDatasetsQuery {
    query: String,
}
async fn search_datasets(
    State(state): State<GlobalState>,
    AppQuery(query): AppQuery<SearchDatasetsQuery>,
) -> Result<AppSuccess, AppError> {
    let datasets = Dataset::search(state.pool(), &query.query).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Datasets fetched successfully", json!(datasets)))
}

async fn get_dataset(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<AppSuccess, AppError> {
    let dataset = Dataset::get_detail(state.pool(), id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Dataset fetched successfully", json!(dataset)))
}

async fn update_dataset(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(changes): AppJson<DatasetUpdate>,
) -> Result<AppSuccess, AppError> {
    let dataset = Dataset::patch(state.pool(), id, changes).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Dataset updated successfully", json!(dataset)))
}

async fn delete_dataset(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<AppSuccess, AppError> {
    Dataset::remove(state.pool(), id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Dataset deleted successfully", json!({ "id": id })))
}

fn attachment_header(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"dataset.csv\""))
}

async fn download_dataset(
    State(state): State<GlobalState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, AppError> {
    let file = Dataset::download(state.pool(), id).await?;
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
        (header::CONTENT_DISPOSITION, attachment_header(&file.filename)),
    ];
    Ok((headers, file.content).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_utils::offline_state;

    #[test]
    fn attachment_header_quotes_filename() {
        assert_eq!(attachment_header("qa set.csv"), "attachment; filename=\"qa set.csv\"");
        assert_eq!(attachment_header("a\"b.csv"), "attachment; filename=\"a_b.csv\"");
    }

    #[tokio::test]
    async fn content_update_is_rejected() {
        let changes: DatasetUpdate = serde_json::from_value(json!({ "content": "a,b\n1,2\n" })).unwrap();
        let err = update_dataset(State(offline_state()), AppPath(uuid::Uuid::new_v4()), AppJson(changes))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_rejects_page_zero() {
        let query = ListDatasetsQuery { page: Some(0), size: None, search: None };
        let err = list_datasets(State(offline_state()), AppQuery(query)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
