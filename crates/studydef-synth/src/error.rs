//! Generation errors

use studydef_diagnostics::{SD0105, StudyError};
use thiserror::Error;

pub type SynthResult<T> = Result<T, SynthError>;

/// Reasons a study cannot be turned into a generator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynthError {
    #[error("Variable '{variable}' needs {needs} in its return expectations")]
    MissingExpectations { variable: String, needs: &'static str },

    #[error("Variable '{variable}' has unusable category ratios: {message}")]
    InvalidRatios { variable: String, message: String },
}

impl SynthError {
    pub fn variable(&self) -> &str {
        match self {
            Self::MissingExpectations { variable, .. } | Self::InvalidRatios { variable, .. } => variable,
        }
    }
}

impl From<SynthError> for StudyError {
    fn from(err: SynthError) -> Self {
        let variable = err.variable().to_string();
        StudyError::build(SD0105, err.to_string()).with_context(variable)
    }
}
