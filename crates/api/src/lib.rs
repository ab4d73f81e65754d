mod env;
mod extract;
mod global_state;
mod response;
mod utils;
mod routes;

pub use routes::{
    dataset_routes,
    evaluation_routes,
    misc_routes,
    prompt_routes,
};

pub use env::ApiServerEnv;
pub use global_state::GlobalState;
pub use utils::setup_tracing;
pub use response::{AppError, AppSuccess, GenericResponse, ResponseStatus};
