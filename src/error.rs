use thiserror::Error;

use crate::api_connection::connection::ApiConnectionError;

/// Fatal workflow errors surfaced to the caller.
///
/// Everything else (empty retrieval, partial nutrition data, retry
/// exhaustion) is an ordinary value in the workflow state machine and
/// resolves into a structured failure response, never an `Err`.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("workflow invocation exceeded {timeout_secs}s ceiling")]
    Timeout { timeout_secs: u64 },

    #[error("recipe corpus error: {0}")]
    Corpus(String),

    #[error("LLM call failed with no safe default: {0}")]
    Llm(#[from] ApiConnectionError),
}
