use serde::Serialize;
use sqlx::types::Uuid;
use sqlx::PgPool;

use crate::Result;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NodeCount {
    pub node_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NodeSummary {
    pub node_name: String,
    pub total_versions: i64,
    pub latest_version: i32,
    pub production_version: Option<i32>,
    pub production_prompt_id: Option<Uuid>,
    pub last_updated: i64,
}

pub async fn list_nodes(pool: &PgPool) -> Result<Vec<NodeCount>> {
    Ok(sqlx::query_as::<_, NodeCount>(
        "SELECT node_name, COUNT(*) AS count FROM prompts GROUP BY node_name ORDER BY node_name",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn nodes_summary(pool: &PgPool) -> Result<Vec<NodeSummary>> {
    Ok(sqlx::query_as::<_, NodeSummary>(
        "SELECT node_name, \
                COUNT(*) AS total_versions, \
                MAX(version) AS latest_version, \
                MAX(version) FILTER (WHERE production) AS production_version, \
                (array_agg(id) FILTER (WHERE production))[1] AS production_prompt_id, \
                MAX(updated_at) AS last_updated \
         FROM prompts GROUP BY node_name ORDER BY node_name",
    )
    .fetch_all(pool)
    .await?)
}
