// turn-level errors surfaced to the user

use crate::agent::AgentError;
use crate::extractor::ExtractionError;

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("Please enter a destination")]
    MissingDestination,
    #[error("Please type a message first")]
    EmptyMessage,
    #[error("Invalid trip details: {0}")]
    InvalidForm(String),
    #[error("Could not read trip details: {0}")]
    ExtractionParse(ExtractionError),
    #[error("The travel agent is unavailable right now: {0}")]
    Agent(#[from] AgentError),
}

impl From<ExtractionError> for PlannerError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::Agent(inner) => PlannerError::Agent(inner),
            other => PlannerError::ExtractionParse(other),
        }
    }
}
