mod dataset;
mod error;
mod evaluation;
mod metric;
mod node;
mod pagination;
mod prompt;

pub use error::{Result, RuntimeError};
pub use pagination::{Page, PageRequest, DEFAULT_PAGE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use prompt::{MessageContent, Prompt, PromptContent, PromptUpdate};
pub use node::{list_nodes, nodes_summary, NodeCount, NodeSummary};
pub use dataset::{
    is_csv_content_type, summarize_csv, CsvSummary, Dataset, DatasetBrief, DatasetDetail, DatasetFile,
    DatasetUpdate, CSV_CONTENT_TYPES,
};
pub use metric::{FixedScore, MetricInfo, MetricRegistry, MetricScorer};
pub use evaluation::{
    check_node_evaluation, request_node_evaluation, run_evaluation, EvaluationRequest, EvaluationResult,
    EvaluationStatus, NodeEvaluationInput, NodeResult, ResultFilter, VersionSelector,
};
