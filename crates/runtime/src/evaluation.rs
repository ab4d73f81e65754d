use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::PgPool;
use strum_macros::{Display, EnumString};

use promptlab_database::{OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery, SqlxObject};

use crate::pagination::{Page, PageRequest};
use crate::{Dataset, MetricRegistry, Prompt, Result, RuntimeError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EvaluationStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl EvaluationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationStatus::Completed | EvaluationStatus::Failed)
    }

    /// pending -> running -> completed | failed
    pub fn can_transition_to(&self, next: EvaluationStatus) -> bool {
        matches!(
            (self, next),
            (EvaluationStatus::Pending, EvaluationStatus::Running)
                | (EvaluationStatus::Running, EvaluationStatus::Completed)
                | (EvaluationStatus::Running, EvaluationStatus::Failed)
        )
    }
}

/// Which version of a node an evaluation request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    Production,
    Number(i32),
}

impl FromStr for VersionSelector {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("production") {
            return Ok(VersionSelector::Production);
        }
        match s.parse::<i32>() {
            Ok(n) if n >= 1 => Ok(VersionSelector::Number(n)),
            _ => Err(RuntimeError::bad_request(format!(
                "version must be 'production' or a positive integer, got '{}'", s
            ))),
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Production => write!(f, "production"),
            VersionSelector::Number(n) => write!(f, "{}", n),
        }
    }
}

impl VersionSelector {
    pub async fn resolve(&self, pool: &PgPool, node_name: &str) -> Result<Prompt> {
        match self {
            VersionSelector::Production => Prompt::get_production(pool, node_name).await,
            VersionSelector::Number(n) => Prompt::get_by_version(pool, node_name, *n).await,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, SqlxObject)]
#[table_name = "evaluation_requests"]
pub struct EvaluationRequest {
    pub id: Uuid,

    #[indexed]
    pub node_name: String,
    pub version: String,

    #[foreign_key(referenced_table = "prompts", related_rust_type = "Prompt")]
    pub prompt_id: Option<Uuid>,
    #[foreign_key(referenced_table = "datasets", related_rust_type = "Dataset")]
    pub dataset_id: Option<Uuid>,

    pub metrics: Vec<String>,
    #[indexed]
    pub status: EvaluationStatus,
    pub callback_url: Option<String>,
    pub error_message: Option<String>,

    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, SqlxObject)]
#[table_name = "evaluation_results"]
pub struct EvaluationResult {
    pub id: Uuid,

    #[indexed]
    pub prompt_id: Uuid,
    #[indexed]
    pub dataset_id: Uuid,
    #[indexed]
    pub metric_name: String,
    pub score: f64,
    pub evaluation_request_id: Option<Uuid>,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeEvaluationInput {
    pub node_name: String,
    pub version: String,
    pub dataset_id: Uuid,
    pub metrics: Vec<String>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub prompt_id: Option<Uuid>,
    pub dataset_id: Option<Uuid>,
    pub metric_name: Option<String>,
}

/// One result together with the prompt version it was recorded for.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NodeResult {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub dataset_id: Uuid,
    pub metric_name: String,
    pub score: f64,
    pub version: i32,
    pub production: bool,
    pub created_at: i64,
}

fn validate_callback_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| RuntimeError::bad_request(format!("callback_url is not a valid URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RuntimeError::bad_request("callback_url must use http or https"));
    }
    Ok(())
}

/// Validates a node evaluation request before any lookup is made.
pub fn check_node_evaluation(registry: &MetricRegistry, input: &NodeEvaluationInput) -> Result<VersionSelector> {
    if input.node_name.trim().is_empty() {
        return Err(RuntimeError::bad_request("node_name must not be empty"));
    }
    if input.metrics.is_empty() {
        return Err(RuntimeError::bad_request("at least one metric is required"));
    }
    let unknown = registry.unknown_keys(&input.metrics);
    if !unknown.is_empty() {
        return Err(RuntimeError::bad_request(format!("Unsupported evaluation metrics: {}", unknown.join(", "))));
    }
    if let Some(url) = &input.callback_url {
        validate_callback_url(url)?;
    }
    input.version.parse()
}

/// Scores a prompt's system text against a dataset and records the result.
pub async fn run_evaluation(
    pool: &PgPool,
    registry: &MetricRegistry,
    prompt_id: Uuid,
    dataset_id: Uuid,
    metric_name: &str,
) -> Result<EvaluationResult> {
    let scorer = registry.scorer(metric_name)?;

    let prompt = Prompt::get(pool, prompt_id).await?;
    let dataset = Dataset::get(pool, dataset_id).await?;
    let score = scorer.score(prompt.content.system_text(), &dataset.content);

    let result = EvaluationResult {
        prompt_id,
        dataset_id,
        metric_name: metric_name.to_string(),
        score,
        ..Default::default()
    }
    .create(pool)
    .await?;

    tracing::info!("[run_evaluation] prompt {} / dataset {}: {} = {}", prompt_id, dataset_id, metric_name, score);
    Ok(result)
}

/// Records a pending evaluation request for an external worker.
pub async fn request_node_evaluation(
    pool: &PgPool,
    registry: &MetricRegistry,
    input: NodeEvaluationInput,
) -> Result<EvaluationRequest> {
    let selector = check_node_evaluation(registry, &input)?;

    let prompt = selector.resolve(pool, &input.node_name).await?;
    if !Dataset::exists(pool, input.dataset_id).await? {
        return Err(Dataset::not_found(input.dataset_id));
    }

    let request = EvaluationRequest {
        node_name: input.node_name,
        version: selector.to_string(),
        prompt_id: Some(prompt.id),
        dataset_id: Some(input.dataset_id),
        metrics: input.metrics,
        status: EvaluationStatus::Pending,
        callback_url: input.callback_url,
        ..Default::default()
    }
    .create(pool)
    .await?;

    tracing::info!("[request_node_evaluation] request {} queued for node '{}' version {}", request.id, request.node_name, request.version);
    Ok(request)
}

impl EvaluationRequest {
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<EvaluationRequest> {
        EvaluationRequest::find_one_by_criteria(QueryCriteria::by_id(id), pool)
            .await?
            .ok_or_else(|| RuntimeError::not_found(format!("Evaluation request {} not found", id)))
    }

    pub async fn list_paginated(
        pool: &PgPool,
        status: Option<EvaluationStatus>,
        page: PageRequest,
    ) -> Result<Page<EvaluationRequest>> {
        let criteria = || {
            QueryCriteria::new().add_optional_filter("status", "=", status.map(|s| s.to_string()))
        };

        let total = EvaluationRequest::count_by_criteria(criteria(), pool).await?;
        let items = EvaluationRequest::find_by_criteria(
            page.apply(criteria().order_by("created_at", OrderDirection::Desc)),
            pool,
        ).await?;
        Ok(Page::new(items, page, total))
    }
}

impl EvaluationResult {
    pub async fn list_paginated(pool: &PgPool, filter: &ResultFilter, page: PageRequest) -> Result<Page<EvaluationResult>> {
        let criteria = || {
            QueryCriteria::new()
                .add_optional_filter("prompt_id", "=", filter.prompt_id)
                .add_optional_filter("dataset_id", "=", filter.dataset_id)
                .add_optional_filter("metric_name", "=", filter.metric_name.clone())
        };

        let total = EvaluationResult::count_by_criteria(criteria(), pool).await?;
        let items = EvaluationResult::find_by_criteria(
            page.apply(criteria().order_by("created_at", OrderDirection::Desc)),
            pool,
        ).await?;
        Ok(Page::new(items, page, total))
    }

    /// Results of every version of a node, for comparing versions.
    pub async fn for_node(pool: &PgPool, node_name: &str, metric_name: Option<&str>) -> Result<Vec<NodeResult>> {
        let rows = sqlx::query_as::<_, NodeResult>(
            "SELECT r.id, r.prompt_id, r.dataset_id, r.metric_name, r.score, p.version, p.production, r.created_at \
             FROM evaluation_results r JOIN prompts p ON p.id = r.prompt_id \
             WHERE p.node_name = $1 AND ($2::TEXT IS NULL OR r.metric_name = $2) \
             ORDER BY p.version ASC, r.created_at ASC",
        )
        .bind(node_name)
        .bind(metric_name)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(metrics: &[&str], version: &str, callback_url: Option<&str>) -> NodeEvaluationInput {
        NodeEvaluationInput {
            node_name: "summarize".into(),
            version: version.into(),
            dataset_id: uuid::Uuid::new_v4(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            callback_url: callback_url.map(str::to_string),
        }
    }

    #[test]
    fn version_selector_parsing() {
        assert_eq!("production".parse::<VersionSelector>().unwrap(), VersionSelector::Production);
        assert_eq!(" 3 ".parse::<VersionSelector>().unwrap(), VersionSelector::Number(3));
        assert!("0".parse::<VersionSelector>().is_err());
        assert!("-1".parse::<VersionSelector>().is_err());
        assert!("latest".parse::<VersionSelector>().is_err());
        assert_eq!(VersionSelector::Number(7).to_string(), "7");
    }

    #[test]
    fn status_round_trips_as_lowercase_text() {
        assert_eq!(EvaluationStatus::Pending.to_string(), "pending");
        assert_eq!("failed".parse::<EvaluationStatus>().unwrap(), EvaluationStatus::Failed);
        assert_eq!(serde_json::to_value(EvaluationStatus::Running).unwrap(), "running");
    }

    #[test]
    fn status_transitions() {
        use EvaluationStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Pending));
        assert!(Completed.is_terminal() && Failed.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn node_evaluation_checks() {
        let registry = MetricRegistry::with_builtins();

        assert_eq!(
            check_node_evaluation(&registry, &input(&["accuracy"], "production", None)).unwrap(),
            VersionSelector::Production
        );
        assert!(check_node_evaluation(&registry, &input(&[], "1", None)).is_err());
        assert!(check_node_evaluation(&registry, &input(&["accuracy"], "v2", None)).is_err());
        assert!(check_node_evaluation(&registry, &input(&["accuracy"], "1", Some("ftp://x/y"))).is_err());
        assert!(check_node_evaluation(&registry, &input(&["accuracy"], "1", Some("not a url"))).is_err());
        assert!(check_node_evaluation(&registry, &input(&["accuracy"], "1", Some("https://hooks.local/done"))).is_ok());
    }

    #[test]
    fn every_unknown_metric_is_listed() {
        let registry = MetricRegistry::with_builtins();
        let err = check_node_evaluation(&registry, &input(&["bleu", "accuracy", "rouge"], "1", None)).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported evaluation metrics: bleu, rouge");
    }

    #[test]
    fn request_table_stores_status_as_text() {
        use promptlab_database::SqlxSchema;
        let sql = EvaluationRequest::create_table_sql();
        assert!(sql.contains("\"status\" TEXT NOT NULL"));
        assert!(sql.contains("\"metrics\" TEXT[] NOT NULL"));
        assert!(sql.contains("FOREIGN KEY (\"prompt_id\") REFERENCES \"prompts\"(\"id\")"));
    }

    #[tokio::test]
    async fn unknown_metric_fails_before_touching_the_database() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        let registry = MetricRegistry::with_builtins();

        let err = run_evaluation(&pool, &registry, uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), "bleu").await.unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownMetric(_)));
        assert_eq!(err.status_code(), 400);
    }
}
