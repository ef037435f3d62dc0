//! Error Types for the Math Tools

use thiserror::Error;

use solver_core::AgentError;

pub type Result<T> = std::result::Result<T, ToolkitError>;

#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("Wikipedia error: {0}")]
    Wikipedia(String),

    #[error("Invalid expression: {0}")]
    Expression(String),

    #[error("Could not translate problem into an expression: {0}")]
    Translation(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ToolkitError> for AgentError {
    fn from(err: ToolkitError) -> Self {
        Self::ToolExecution(err.to_string())
    }
}
