/// Declares the process-wide connection pool and the schema bootstrap for a
/// list of `SqlxSchema` types.
///
/// # Generated Items
/// - `async fn create_tables(pool: &PgPool) -> Result<(), sqlx::Error>`: creates the
///   `updated_at` trigger function, then every table, trigger and index, in list order.
/// - `async fn drop_tables(pool: &PgPool) -> Result<(), sqlx::Error>`: drops every table,
///   in reverse list order.
/// - `async fn connect(drop_tables: bool, create_tables: bool) -> &'static PgPool`: connects
///   once using `DatabaseEnv` and optionally resets the schema. Panics if the database is
///   unreachable, as there is nothing to serve without it.
///
/// # Example
/// ```rust,ignore
/// init_databases!(
///     default: [User, Post]
/// );
///
/// #[tokio::main]
/// async fn main() {
///     let pool = connect(false, true).await;
/// }
/// ```
#[macro_export]
macro_rules! init_databases {
    (
        default: [$($default_type:ty),* $(,)?]
    ) => {
        static POOL: tokio::sync::OnceCell<sqlx::PgPool> = tokio::sync::OnceCell::const_new();

        const UPDATED_AT_TRIGGER_FN: &str = r#"
        CREATE OR REPLACE FUNCTION set_updated_at_unix_timestamp()
        RETURNS TRIGGER AS $$
        BEGIN NEW.updated_at = floor(extract(epoch from now())); RETURN NEW; END;
        $$ language 'plpgsql';
        "#;

        pub async fn create_tables(pool: &sqlx::PgPool) -> ::core::result::Result<(), sqlx::Error> {
            sqlx::query(UPDATED_AT_TRIGGER_FN).execute(pool).await?;

            $(
                let create_table_sql_str = <$default_type as $crate::SqlxSchema>::create_table_sql();
                sqlx::query(&create_table_sql_str).execute(pool).await?;

                let trigger_sql_str = <$default_type as $crate::SqlxSchema>::trigger_sql();
                for statement in trigger_sql_str.split(';').filter(|s| !s.trim().is_empty()) {
                    sqlx::query(statement).execute(pool).await?;
                }

                for index_sql in <$default_type as $crate::SqlxSchema>::INDEXES_SQL {
                    sqlx::query(index_sql).execute(pool).await?;
                }

                tracing::debug!("[init_databases] table '{}' ready", <$default_type as $crate::SqlxSchema>::TABLE_NAME);
            )*

            Ok(())
        }

        pub async fn drop_tables(pool: &sqlx::PgPool) -> ::core::result::Result<(), sqlx::Error> {
            let mut statements: Vec<String> = vec![
                $( <$default_type as $crate::SqlxSchema>::drop_table_sql(), )*
            ];
            statements.reverse();
            for statement in statements {
                sqlx::query(&statement).execute(pool).await?;
            }
            Ok(())
        }

        pub async fn connect(drop_tables: bool, create_tables: bool) -> &'static sqlx::PgPool {
            POOL.get_or_init(|| async {
                let env = <$crate::DatabaseEnv as $crate::EnvVars>::load();
                if env.database_url.is_empty() {
                    panic!("DATABASE_URL environment variable not set");
                }

                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(env.max_connections)
                    .connect(&env.database_url)
                    .await
                    .unwrap_or_else(|e| panic!("Failed to connect to database. Error: {:?}", e));

                if drop_tables {
                    if let Err(e) = self::drop_tables(&pool).await {
                        tracing::warn!("[init_databases] Failed to drop tables. Error: {:?}", e);
                    }
                }

                if create_tables {
                    self::create_tables(&pool).await
                        .unwrap_or_else(|e| panic!("Failed to create tables. Error: {:?}", e));
                }

                pool
            }).await
        }
    };
}
