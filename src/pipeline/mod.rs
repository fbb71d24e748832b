//! The orchestration pipeline: state, retry wrapper, graph, and facade.

pub mod graph;
pub mod retry;
pub mod service;
pub mod state;

pub use graph::{Node, SummaryGraph};
pub use retry::{RetryPolicy, run_with_retries};
pub use service::{GenerateApi, GenerateOutcome, PipelineService};
pub use state::{PipelineState, SUMMARY_SENTINEL, UNRELATED_ANSWER, is_summary_query};
