use promptlab_common::{env_or, EnvVars};

pub struct DatabaseEnv {
    pub database_url: String,
    pub max_connections: u32,
}

impl EnvVars for DatabaseEnv {
    fn load() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
        }
    }

    fn get_env_var(&self, key: &str) -> String {
        match key {
            "DATABASE_URL" => self.database_url.clone(),
            "DATABASE_MAX_CONNECTIONS" => self.max_connections.to_string(),
            _ => panic!("Invalid environment variable: {}", key),
        }
    }
}
