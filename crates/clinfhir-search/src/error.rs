use crate::validation::SearchIssue;
use clinfhir_core::CoreError;
use thiserror::Error;

/// Errors raised while translating a search request.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Invalid value for {parameter}: {message}")]
    InvalidParameter { parameter: String, message: String },

    #[error("search request rejected with {} issue(s)", .0.len())]
    Validation(Vec<SearchIssue>),
}

impl SearchError {
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Issues to report to the client, if this error carries any.
    pub fn issues(&self) -> Vec<SearchIssue> {
        match self {
            Self::Validation(issues) => issues.clone(),
            Self::InvalidParameter { parameter, message } => {
                vec![SearchIssue::invalid(parameter, message)]
            }
            Self::Core(_) => Vec::new(),
        }
    }
}
