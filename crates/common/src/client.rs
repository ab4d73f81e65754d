/// A process-wide handle to an external resource (for promptlab, the Postgres pool).
#[async_trait::async_trait]
pub trait ModuleClient: Clone + Send + Sync + 'static {
    const NAME: &'static str;
    const REQUIRED_ENV: &'static [&'static str];
    type Client;

    fn validate_env() -> bool {
        let missing = missing_env_vars(Self::REQUIRED_ENV);
        if missing.is_empty() {
            return true;
        }
        tracing::error!("[Client: {}] Required environment variables are not set: [{}]", Self::NAME, missing.join(", "));
        false
    }

    async fn setup_connection() -> Self;

    fn try_client(&self) -> Option<&Self::Client>;

    fn is_connected(&self) -> bool {
        self.try_client().is_some()
    }

    fn get_client(&self) -> &Self::Client {
        match self.try_client() {
            Some(client) => client,
            None => panic!("[Client: {}] not connected. Did you call setup_connection?", Self::NAME),
        }
    }
}

pub fn missing_env_vars(vars: &[&'static str]) -> Vec<&'static str> {
    vars.iter()
        .copied()
        .filter(|var| std::env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true))
        .collect()
}

/// Declares a cheaply clonable handle around a shared client.
///
/// `setup_connection` checks the listed environment variables before running
/// the setup expression; `from_client` wraps an already built client, which
/// is what tests use to inject a pool.
#[macro_export]
macro_rules! define_module_client {
    {
        (struct $struct_name:ident, $client_name:expr)
        client_type: $client_type:ty,
        env: [ $( $env_var:literal ),* ],
        setup: $setup_logic:expr
    } => {
        #[derive(Clone, Default)]
        pub struct $struct_name {
            client: Option<std::sync::Arc<$client_type>>,
        }

        impl $struct_name {
            pub fn from_client(client: $client_type) -> Self {
                Self { client: Some(std::sync::Arc::new(client)) }
            }
        }

        #[async_trait::async_trait]
        impl ::promptlab_common::ModuleClient for $struct_name {
            const NAME: &'static str = $client_name;
            const REQUIRED_ENV: &'static [&'static str] = &[ $( $env_var ),* ];
            type Client = std::sync::Arc<$client_type>;

            async fn setup_connection() -> Self {
                if !Self::validate_env() {
                    panic!("[Client: {}] Required environment variables are not set. Cannot setup connection.", $client_name);
                }

                let client_instance = $setup_logic.await;
                tracing::info!("[Client: {}] connected", $client_name);
                Self::from_client(client_instance)
            }

            fn try_client(&self) -> Option<&Self::Client> {
                self.client.as_ref()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_unset_and_blank_variables() {
        std::env::set_var("PROMPTLAB_TEST_CLIENT_SET", "postgres://localhost/db");
        std::env::set_var("PROMPTLAB_TEST_CLIENT_BLANK", "  ");
        let missing = missing_env_vars(&[
            "PROMPTLAB_TEST_CLIENT_SET",
            "PROMPTLAB_TEST_CLIENT_BLANK",
            "PROMPTLAB_TEST_CLIENT_UNSET",
        ]);
        assert_eq!(missing, vec!["PROMPTLAB_TEST_CLIENT_BLANK", "PROMPTLAB_TEST_CLIENT_UNSET"]);
    }
}
