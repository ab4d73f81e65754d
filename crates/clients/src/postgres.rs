use promptlab_common::define_module_client;
use promptlab_database::init_databases;
use sqlx::PgPool;

init_databases!(
    default: [
        promptlab_runtime::Prompt,
        promptlab_runtime::Dataset,
        promptlab_runtime::EvaluationRequest,
        promptlab_runtime::EvaluationResult
    ]
);

define_module_client! {
    (struct PostgresClient, "postgres")
    client_type: PgPool,
    env: ["DATABASE_URL"],
    setup: async {
        connect(false, true).await.clone()
    }
}
