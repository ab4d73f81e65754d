mod client;
mod env;

pub use client::{missing_env_vars, ModuleClient};
pub use env::{env_or, EnvVars};
