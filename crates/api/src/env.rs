use promptlab_common::{env_or, EnvVars};

pub struct ApiServerEnv {
    pub port: u16,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl EnvVars for ApiServerEnv {
    fn load() -> Self {
        Self {
            port: env_or("PORT", 3033),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 60),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
        }
    }

    fn get_env_var(&self, key: &str) -> String {
        match key {
            "PORT" => self.port.to_string(),
            "REQUEST_TIMEOUT_SECS" => self.request_timeout_secs.to_string(),
            "MAX_UPLOAD_BYTES" => self.max_upload_bytes.to_string(),
            _ => panic!("{} is not set", key),
        }
    }
}
