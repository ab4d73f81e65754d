use std::sync::Arc;

use promptlab_clients::PostgresClient;
use promptlab_common::ModuleClient;
use promptlab_runtime::MetricRegistry;
use sqlx::PgPool;

#[derive(Clone)]
pub struct GlobalState {
    pub db: PostgresClient,
    pub metrics: Arc<MetricRegistry>,
}

impl GlobalState {
    /// Connects the shared pool (creating missing tables) and loads the built-in metrics.
    pub async fn new() -> Self {
        Self {
            db: PostgresClient::setup_connection().await,
            metrics: Arc::new(MetricRegistry::with_builtins()),
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            db: PostgresClient::from_client(pool),
            metrics: Arc::new(MetricRegistry::with_builtins()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        self.db.get_client().as_ref()
    }
}
