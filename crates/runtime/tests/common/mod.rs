use promptlab_database::init_databases;
use promptlab_runtime::{Dataset, EvaluationRequest, EvaluationResult, Prompt};
use sqlx::PgPool;

init_databases!(
    default: [Prompt, Dataset, EvaluationRequest, EvaluationResult]
);

static SCHEMA: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

/// A fresh pool for the current test runtime; tables are created once per process.
pub async fn pool() -> PgPool {
    dotenv::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(16)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");

    SCHEMA
        .get_or_init(|| async {
            create_tables(&pool).await.expect("Failed to create test tables");
        })
        .await;
    pool
}

/// Node and dataset names unique to one test run.
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}
