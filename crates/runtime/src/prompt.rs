use serde::{Deserialize, Serialize};
use sqlx::types::{Json, Uuid};
use sqlx::{PgPool, Postgres, Transaction};

use promptlab_database::{OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery, SqlxObject, SqlxSchema};

use crate::pagination::{Page, PageRequest};
use crate::{Result, RuntimeError};

/// One message slot of a prompt. Accepts either a bare string or
/// `{ "order": n, "prompt": "..." }`; always serialized as the object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "MessageContentInput")]
pub struct MessageContent {
    pub order: Option<i32>,
    pub prompt: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageContentInput {
    Text(String),
    Full {
        #[serde(default)]
        order: Option<i32>,
        #[serde(default)]
        prompt: Option<String>,
    },
}

impl From<MessageContentInput> for MessageContent {
    fn from(input: MessageContentInput) -> Self {
        match input {
            MessageContentInput::Text(prompt) => Self { order: None, prompt },
            MessageContentInput::Full { order, prompt } => Self { order, prompt: prompt.unwrap_or_default() },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptContent {
    pub system: MessageContent,
    #[serde(default)]
    pub user: MessageContent,
    #[serde(default)]
    pub assistant: MessageContent,
}

impl PromptContent {
    pub fn system_text(&self) -> &str {
        &self.system.prompt
    }

    pub fn validate(&self) -> Result<()> {
        if self.system.prompt.trim().is_empty() {
            return Err(RuntimeError::bad_request("system prompt must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, SqlxObject)]
#[table_name = "prompts"]
#[unique_together = "node_name, version"]
pub struct Prompt {
    pub id: Uuid,

    pub node_name: String,
    pub content: Json<PromptContent>,
    pub version: i32,
    pub production: bool,
    pub message: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial update of a prompt. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptUpdate {
    pub node_name: Option<String>,
    pub content: Option<PromptContent>,
    pub message: Option<String>,
    pub production: Option<bool>,
}

impl PromptUpdate {
    pub fn is_empty(&self) -> bool {
        self.node_name.is_none() && self.content.is_none() && self.message.is_none() && self.production.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(RuntimeError::bad_request("no fields to update"));
        }
        if let Some(node_name) = &self.node_name {
            validate_node_name(node_name)?;
        }
        if let Some(content) = &self.content {
            content.validate()?;
        }
        Ok(())
    }
}

fn validate_node_name(node_name: &str) -> Result<()> {
    if node_name.trim().is_empty() {
        return Err(RuntimeError::bad_request("node_name must not be empty"));
    }
    Ok(())
}

/// Serializes version allocation for one node until the transaction ends.
async fn lock_node(tx: &mut Transaction<'_, Postgres>, node_name: &str) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(node_name)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn next_version(tx: &mut Transaction<'_, Postgres>, node_name: &str) -> Result<i32> {
    lock_node(tx, node_name).await?;
    let current: i32 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM prompts WHERE node_name = $1")
        .bind(node_name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(current + 1)
}

/// Makes `target` the only production row of `node_name`.
async fn promote_in(tx: &mut Transaction<'_, Postgres>, target: Uuid, node_name: &str) -> Result<Prompt> {
    sqlx::query("SELECT id FROM prompts WHERE node_name = $1 FOR UPDATE")
        .bind(node_name)
        .execute(&mut **tx)
        .await?;

    let sql = format!(
        "UPDATE prompts SET production = (id = $2) WHERE node_name = $1 AND (production OR id = $2) RETURNING {}",
        Prompt::select_columns_sql()
    );
    let rows = sqlx::query_as::<_, PromptRowSqlx>(&sql)
        .bind(node_name)
        .bind(target)
        .fetch_all(&mut **tx)
        .await?;

    rows.into_iter()
        .map(Prompt::from_row)
        .find(|p| p.id == target)
        .ok_or_else(|| RuntimeError::not_found(format!("Prompt {} not found", target)))
}

impl Prompt {
    pub fn not_found(id: Uuid) -> RuntimeError {
        RuntimeError::not_found(format!("Prompt {} not found", id))
    }

    fn version_not_found(node_name: &str, version: i32) -> RuntimeError {
        RuntimeError::not_found(format!("Prompt version {} of node '{}' not found", version, node_name))
    }

    /// Appends a new, non-production version to `node_name`.
    pub async fn new_version(
        pool: &PgPool,
        node_name: &str,
        content: PromptContent,
        message: Option<String>,
    ) -> Result<Prompt> {
        validate_node_name(node_name)?;
        content.validate()?;

        let mut tx = pool.begin().await?;
        let version = next_version(&mut tx, node_name).await?;
        let prompt = Prompt {
            node_name: node_name.to_string(),
            content: Json(content),
            version,
            production: false,
            message,
            ..Default::default()
        }
        .create(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!("[Prompt::new_version] node '{}' version {} created ({})", prompt.node_name, prompt.version, prompt.id);
        Ok(prompt)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Prompt> {
        Prompt::find_one_by_criteria(QueryCriteria::by_id(id), pool)
            .await?
            .ok_or_else(|| Self::not_found(id))
    }

    pub async fn get_by_version(pool: &PgPool, node_name: &str, version: i32) -> Result<Prompt> {
        Prompt::find_one_by_criteria(Self::version_criteria(node_name, version), pool)
            .await?
            .ok_or_else(|| Self::version_not_found(node_name, version))
    }

    pub async fn get_production(pool: &PgPool, node_name: &str) -> Result<Prompt> {
        let criteria = QueryCriteria::new()
            .add_valued_filter("node_name", "=", node_name.to_string())
            .add_valued_filter("production", "=", true);
        Prompt::find_one_by_criteria(criteria, pool)
            .await?
            .ok_or_else(|| RuntimeError::not_found(format!("No production prompt for node '{}'", node_name)))
    }

    /// All versions of a node, newest first.
    pub async fn list_by_node(pool: &PgPool, node_name: &str) -> Result<Vec<Prompt>> {
        let criteria = QueryCriteria::new()
            .add_valued_filter("node_name", "=", node_name.to_string())
            .order_by("version", OrderDirection::Desc);
        Ok(Prompt::find_by_criteria(criteria, pool).await?)
    }

    pub async fn count_by_node(pool: &PgPool, node_name: &str) -> Result<i64> {
        let criteria = QueryCriteria::new().add_valued_filter("node_name", "=", node_name.to_string());
        Ok(Prompt::count_by_criteria(criteria, pool).await?)
    }

    pub async fn list_paginated(
        pool: &PgPool,
        node_name: Option<&str>,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Prompt>> {
        let criteria = || {
            QueryCriteria::new()
                .add_optional_filter("node_name", "=", node_name.map(str::to_string))
                .search(&["node_name", "message"], search)
        };

        let total = Prompt::count_by_criteria(criteria(), pool).await?;
        let items = Prompt::find_by_criteria(
            page.apply(criteria().order_by("created_at", OrderDirection::Desc)),
            pool,
        ).await?;
        Ok(Page::new(items, page, total))
    }

    /// Marks one version as the node's production prompt and clears the flag on
    /// the previous one, atomically.
    pub async fn promote(pool: &PgPool, id: Uuid) -> Result<Prompt> {
        let mut tx = pool.begin().await?;
        let prompt = Prompt::find_one_by_criteria(QueryCriteria::by_id(id), &mut *tx)
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        let promoted = promote_in(&mut tx, id, &prompt.node_name).await?;
        tx.commit().await?;

        tracing::info!("[Prompt::promote] node '{}' production -> version {}", promoted.node_name, promoted.version);
        Ok(promoted)
    }

    /// Clears the production flag and writes no other column. A non-production
    /// row is returned as is.
    pub async fn demote(pool: &PgPool, id: Uuid) -> Result<Prompt> {
        let sql = format!(
            "UPDATE prompts SET production = FALSE WHERE id = $1 RETURNING {}",
            Prompt::select_columns_sql()
        );
        let demoted = sqlx::query_as::<_, PromptRowSqlx>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Prompt::from_row)
            .ok_or_else(|| Self::not_found(id))?;

        tracing::info!("[Prompt::demote] node '{}' version {} no longer production", demoted.node_name, demoted.version);
        Ok(demoted)
    }

    pub async fn patch(pool: &PgPool, id: Uuid, changes: PromptUpdate) -> Result<Prompt> {
        changes.validate()?;
        let mut tx = pool.begin().await?;
        sqlx::query("SELECT id FROM prompts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let prompt = Prompt::find_one_by_criteria(QueryCriteria::by_id(id), &mut *tx)
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        let updated = Self::apply_changes(&mut tx, prompt, changes).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn patch_by_version(
        pool: &PgPool,
        node_name: &str,
        version: i32,
        changes: PromptUpdate,
    ) -> Result<Prompt> {
        changes.validate()?;
        let mut tx = pool.begin().await?;
        sqlx::query("SELECT id FROM prompts WHERE node_name = $1 AND version = $2 FOR UPDATE")
            .bind(node_name)
            .bind(version)
            .execute(&mut *tx)
            .await?;
        let prompt = Prompt::find_one_by_criteria(Self::version_criteria(node_name, version), &mut *tx)
            .await?
            .ok_or_else(|| Self::version_not_found(node_name, version))?;
        let updated = Self::apply_changes(&mut tx, prompt, changes).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn apply_changes(
        tx: &mut Transaction<'_, Postgres>,
        mut prompt: Prompt,
        changes: PromptUpdate,
    ) -> Result<Prompt> {
        if let Some(node_name) = changes.node_name.filter(|n| *n != prompt.node_name) {
            // moves to the end of the target node, never as its production prompt
            prompt.version = next_version(tx, &node_name).await?;
            prompt.node_name = node_name;
            prompt.production = false;
        }
        if let Some(content) = changes.content {
            prompt.content = Json(content);
        }
        if let Some(message) = changes.message {
            prompt.message = Some(message);
        }
        if changes.production == Some(false) {
            prompt.production = false;
        }

        let updated = prompt.update(&mut **tx).await?;
        tracing::info!("[Prompt::apply_changes] node '{}' version {} updated", updated.node_name, updated.version);

        if changes.production == Some(true) {
            return promote_in(tx, updated.id, &updated.node_name).await;
        }
        Ok(updated)
    }

    pub async fn remove(pool: &PgPool, id: Uuid) -> Result<()> {
        let deleted = Prompt::delete_by_criteria(QueryCriteria::by_id(id), pool).await?;
        if deleted == 0 {
            return Err(Self::not_found(id));
        }
        tracing::info!("[Prompt::remove] prompt {} deleted", id);
        Ok(())
    }

    pub async fn remove_by_version(pool: &PgPool, node_name: &str, version: i32) -> Result<()> {
        let deleted = Prompt::delete_by_criteria(Self::version_criteria(node_name, version), pool).await?;
        if deleted == 0 {
            return Err(Self::version_not_found(node_name, version));
        }
        tracing::info!("[Prompt::remove_by_version] node '{}' version {} deleted", node_name, version);
        Ok(())
    }

    /// Deletes every version of the node. Returns the number of rows removed.
    pub async fn remove_node(pool: &PgPool, node_name: &str) -> Result<u64> {
        let criteria = QueryCriteria::new().add_valued_filter("node_name", "=", node_name.to_string());
        let deleted = Prompt::delete_by_criteria(criteria, pool).await?;
        tracing::info!("[Prompt::remove_node] node '{}': {} versions deleted", node_name, deleted);
        Ok(deleted)
    }

    fn version_criteria(node_name: &str, version: i32) -> QueryCriteria {
        QueryCriteria::new()
            .add_valued_filter("node_name", "=", node_name.to_string())
            .add_valued_filter("version", "=", version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_accepts_plain_strings_and_objects() {
        let content: PromptContent = serde_json::from_value(json!({
            "system": "You summarize.",
            "user": { "order": 2, "prompt": "Summarize this." }
        })).unwrap();

        assert_eq!(content.system, MessageContent { order: None, prompt: "You summarize.".into() });
        assert_eq!(content.user.order, Some(2));
        assert_eq!(content.assistant, MessageContent::default());
    }

    #[test]
    fn content_serializes_in_object_form() {
        let content: PromptContent = serde_json::from_value(json!({ "system": "Be brief." })).unwrap();
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value["system"], json!({ "order": null, "prompt": "Be brief." }));
        assert_eq!(value["assistant"], json!({ "order": null, "prompt": "" }));
    }

    #[test]
    fn system_prompt_is_required() {
        assert!(serde_json::from_value::<PromptContent>(json!({ "user": "hi" })).is_err());

        let blank: PromptContent = serde_json::from_value(json!({ "system": { "order": 1, "prompt": "   " } })).unwrap();
        assert!(matches!(blank.validate(), Err(RuntimeError::BadRequest(_))));

        let missing_text: PromptContent = serde_json::from_value(json!({ "system": { "order": 1 } })).unwrap();
        assert!(missing_text.validate().is_err());
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(matches!(PromptUpdate::default().validate(), Err(RuntimeError::BadRequest(_))));

        let blank_node = PromptUpdate { node_name: Some(" ".into()), ..Default::default() };
        assert!(blank_node.validate().is_err());

        let flag_only = PromptUpdate { production: Some(true), ..Default::default() };
        assert!(flag_only.validate().is_ok());
    }

    #[test]
    fn prompts_table_is_unique_per_node_version() {
        let sql = Prompt::create_table_sql();
        assert!(sql.contains("CONSTRAINT \"uq_prompts_node_name_version\" UNIQUE (\"node_name\", \"version\")"));
        assert!(sql.contains("\"content\" JSONB NOT NULL"));
    }
}
