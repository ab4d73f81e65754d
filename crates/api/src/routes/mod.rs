mod datasets;
mod evaluations;
mod misc;
mod prompts;

pub use datasets::dataset_routes;
pub use evaluations::evaluation_routes;
pub use misc::misc_routes;
pub use prompts::prompt_routes;
