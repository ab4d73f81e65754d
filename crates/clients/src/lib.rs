#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::{connect, create_tables, drop_tables, PostgresClient};

pub use promptlab_common::ModuleClient;
