use csv::ReaderBuilder;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::types::Uuid;
use sqlx::PgPool;

use promptlab_database::{
    is_unique_violation, OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery, SqlxObject, SqlxSchema,
};

use crate::pagination::{Page, PageRequest};
use crate::{Result, RuntimeError};

pub const CSV_CONTENT_TYPES: &[&str] = &["text/csv", "application/csv"];

const SEARCH_COLUMNS: &[&str] = &["name", "description"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, SqlxObject)]
#[table_name = "datasets"]
pub struct Dataset {
    pub id: Uuid,

    #[unique]
    pub name: String,
    pub description: Option<String>,
    /// Raw CSV text exactly as uploaded.
    pub content: String,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DatasetBrief {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvSummary {
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetDetail {
    #[serde(flatten)]
    pub dataset: Dataset,
    pub summary: CsvSummary,
}

pub struct DatasetFile {
    pub filename: String,
    pub content: String,
}

/// Rename / re-describe a dataset. `content` is only captured so that an
/// attempt to replace it can be rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub content: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl DatasetUpdate {
    pub fn validate(&self) -> Result<()> {
        if self.content.is_some() {
            return Err(RuntimeError::bad_request("dataset content cannot be modified after upload"));
        }
        if self.name.is_none() && self.description.is_none() {
            return Err(RuntimeError::bad_request("no fields to update"));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RuntimeError::bad_request("dataset name must not be empty"));
    }
    Ok(())
}

/// Media type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

pub fn is_csv_content_type(content_type: &str) -> bool {
    CSV_CONTENT_TYPES.contains(&essence(content_type).as_str())
}

/// Reads the header row and counts data rows. Ragged rows are accepted.
pub fn summarize_csv(text: &str) -> Result<CsvSummary> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| RuntimeError::bad_request(format!("Failed to read CSV headers: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();
    if columns.iter().all(|c| c.trim().is_empty()) {
        return Err(RuntimeError::bad_request("CSV file has no header row"));
    }

    let mut row_count = 0;
    for (index, record) in reader.records().enumerate() {
        record.map_err(|e| RuntimeError::bad_request(format!("Failed to parse CSV row {}: {}", index + 1, e)))?;
        row_count += 1;
    }

    Ok(CsvSummary { columns, row_count })
}

fn duplicate_name(name: &str) -> RuntimeError {
    RuntimeError::conflict(format!("Dataset with name '{}' already exists", name))
}

impl Dataset {
    pub fn not_found(id: Uuid) -> RuntimeError {
        RuntimeError::not_found(format!("Dataset {} not found", id))
    }

    pub fn summary(&self) -> Result<CsvSummary> {
        summarize_csv(&self.content)
    }

    async fn name_taken(pool: &PgPool, name: &str) -> Result<bool> {
        let criteria = QueryCriteria::new().add_valued_filter("name", "=", name.to_string());
        Ok(Dataset::count_by_criteria(criteria, pool).await? > 0)
    }

    pub async fn upload(
        pool: &PgPool,
        name: &str,
        description: Option<String>,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Dataset> {
        validate_name(name)?;
        if !is_csv_content_type(content_type) {
            tracing::warn!("[Dataset::upload] rejected '{}': content type '{}'", name, content_type);
            return Err(RuntimeError::bad_request("Only CSV files can be uploaded"));
        }
        let content = String::from_utf8(bytes).map_err(|_| {
            tracing::warn!("[Dataset::upload] rejected '{}': not UTF-8", name);
            RuntimeError::bad_request("File must be UTF-8 encoded")
        })?;
        summarize_csv(&content)?;

        if Self::name_taken(pool, name).await? {
            tracing::warn!("[Dataset::upload] rejected '{}': name exists", name);
            return Err(duplicate_name(name));
        }

        let dataset = Dataset {
            name: name.to_string(),
            description,
            content,
            ..Default::default()
        }
        .create(pool)
        .await
        .map_err(|e| if is_unique_violation(&e) { duplicate_name(name) } else { e.into() })?;

        tracing::info!("[Dataset::upload] dataset '{}' stored ({})", dataset.name, dataset.id);
        Ok(dataset)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Dataset> {
        Dataset::find_one_by_criteria(QueryCriteria::by_id(id), pool)
            .await?
            .ok_or_else(|| Self::not_found(id))
    }

    pub async fn get_detail(pool: &PgPool, id: Uuid) -> Result<DatasetDetail> {
        let dataset = Self::get(pool, id).await?;
        let summary = dataset.summary()?;
        Ok(DatasetDetail { dataset, summary })
    }

    pub async fn exists(pool: &PgPool, id: Uuid) -> Result<bool> {
        Ok(Dataset::count_by_criteria(QueryCriteria::by_id(id), pool).await? > 0)
    }

    pub async fn list_paginated(pool: &PgPool, search: Option<&str>, page: PageRequest) -> Result<Page<Dataset>> {
        let criteria = || QueryCriteria::new().search(SEARCH_COLUMNS, search);

        let total = Dataset::count_by_criteria(criteria(), pool).await?;
        let items = Dataset::find_by_criteria(
            page.apply(criteria().order_by("created_at", OrderDirection::Desc)),
            pool,
        ).await?;
        Ok(Page::new(items, page, total))
    }

    pub async fn search(pool: &PgPool, keyword: &str) -> Result<Vec<Dataset>> {
        let criteria = QueryCriteria::new()
            .search(SEARCH_COLUMNS, Some(keyword))
            .order_by("created_at", OrderDirection::Desc);
        Ok(Dataset::find_by_criteria(criteria, pool).await?)
    }

    /// Id and name of every dataset, by name.
    pub async fn list_brief(pool: &PgPool) -> Result<Vec<DatasetBrief>> {
        Ok(sqlx::query_as::<_, DatasetBrief>("SELECT id, name FROM datasets ORDER BY name ASC")
            .fetch_all(pool)
            .await?)
    }

    /// Writes only the supplied columns in one statement.
    pub async fn patch(pool: &PgPool, id: Uuid, changes: DatasetUpdate) -> Result<Dataset> {
        changes.validate()?;

        let sql = format!(
            "UPDATE datasets SET name = COALESCE($2, name), description = COALESCE($3, description) \
             WHERE id = $1 RETURNING {}",
            Dataset::select_columns_sql()
        );
        let updated = sqlx::query_as::<_, DatasetRowSqlx>(&sql)
            .bind(id)
            .bind(changes.name.as_deref())
            .bind(changes.description.as_deref())
            .fetch_optional(pool)
            .await
            .map_err(|e| match (&changes.name, is_unique_violation(&e)) {
                (Some(name), true) => duplicate_name(name),
                _ => e.into(),
            })?
            .map(Dataset::from_row)
            .ok_or_else(|| Self::not_found(id))?;

        tracing::info!("[Dataset::patch] dataset {} updated", updated.id);
        Ok(updated)
    }

    pub async fn remove(pool: &PgPool, id: Uuid) -> Result<()> {
        let deleted = Dataset::delete_by_criteria(QueryCriteria::by_id(id), pool).await?;
        if deleted == 0 {
            return Err(Self::not_found(id));
        }
        tracing::info!("[Dataset::remove] dataset {} deleted", id);
        Ok(())
    }

    pub async fn download(pool: &PgPool, id: Uuid) -> Result<DatasetFile> {
        let dataset = Self::get(pool, id).await?;
        Ok(DatasetFile {
            filename: format!("{}.csv", dataset.name),
            content: dataset.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_counts_rows_and_headers() {
        let summary = summarize_csv("question,answer\nWhat is 2+2?,4\n\"Capital, France\",Paris\n").unwrap();
        assert_eq!(summary.columns, vec!["question".to_string(), "answer".to_string()]);
        assert_eq!(summary.row_count, 2);
    }

    #[test]
    fn summary_accepts_ragged_rows_and_header_only_files() {
        assert_eq!(summarize_csv("a,b,c\n1,2\n").unwrap().row_count, 1);
        assert_eq!(summarize_csv("a,b\n").unwrap().row_count, 0);
    }

    #[test]
    fn empty_file_is_not_csv() {
        assert!(matches!(summarize_csv(""), Err(RuntimeError::BadRequest(_))));
    }

    #[test]
    fn csv_content_types() {
        assert!(is_csv_content_type("text/csv"));
        assert!(is_csv_content_type("Text/CSV; charset=utf-8"));
        assert!(is_csv_content_type("application/csv"));
        assert!(!is_csv_content_type("application/json"));
        assert!(!is_csv_content_type(""));
    }

    #[test]
    fn update_with_content_is_rejected() {
        let changes: DatasetUpdate = serde_json::from_value(json!({ "name": "x", "content": "a,b" })).unwrap();
        assert!(matches!(changes.validate(), Err(RuntimeError::BadRequest(_))));

        let null_content: DatasetUpdate = serde_json::from_value(json!({ "content": null })).unwrap();
        assert!(null_content.validate().is_err());
    }

    #[test]
    fn update_needs_a_field() {
        let empty: DatasetUpdate = serde_json::from_value(json!({})).unwrap();
        assert!(empty.validate().is_err());

        let rename: DatasetUpdate = serde_json::from_value(json!({ "name": "qa-v2" })).unwrap();
        assert!(rename.validate().is_ok());

        let blank: DatasetUpdate = serde_json::from_value(json!({ "name": "  " })).unwrap();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn detail_flattens_the_row() {
        let detail = DatasetDetail {
            dataset: Dataset { name: "qa".into(), content: "a\n1\n".into(), ..Default::default() },
            summary: CsvSummary { columns: vec!["a".into()], row_count: 1 },
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["name"], "qa");
        assert_eq!(value["summary"]["row_count"], 1);
    }
}
