//! Build and evaluation errors

use std::path::PathBuf;
use studydef_diagnostics::{
    StudyError, SD0007, SD0100, SD0101, SD0102, SD0104, SD0105, SD0107, SD0200, SD0201, SD0202,
    SD0203, SD0401, SD0402,
};
use studydef_model::CodelistError;
use thiserror::Error;

/// Result type for per-patient evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Result type for study compilation
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors raised while evaluating one patient
///
/// These never abort a run: the patient's row is dropped and the reason
/// recorded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Type mismatch error
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Comparison between values of different types
    #[error("Cannot compare {left} with {right}")]
    IncomparableValues { left: String, right: String },

    /// Date arithmetic left the representable range
    #[error("Date arithmetic overflow in {operation}")]
    DateOverflow { operation: String },

    /// A name with neither an anchor nor a binding
    #[error("Unknown binding: {name}")]
    UnknownBinding { name: String },

    /// Internal error (should not happen)
    #[error("Internal evaluation error: {message}")]
    Internal { message: String },
}

impl EvalError {
    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an incomparable values error
    pub fn incomparable(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::IncomparableValues {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Create a date overflow error
    pub fn date_overflow(operation: impl Into<String>) -> Self {
        Self::DateOverflow {
            operation: operation.into(),
        }
    }

    /// Create an unknown binding error
    pub fn unknown_binding(name: impl Into<String>) -> Self {
        Self::UnknownBinding { name: name.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<EvalError> for StudyError {
    fn from(err: EvalError) -> Self {
        let code = match &err {
            EvalError::TypeMismatch { .. } | EvalError::IncomparableValues { .. } => SD0202,
            EvalError::DateOverflow { .. } => SD0201,
            EvalError::UnknownBinding { .. } => SD0203,
            EvalError::Internal { .. } => SD0200,
        };
        StudyError::evaluation(code, err.to_string())
    }
}

/// Errors raised while compiling a study definition
///
/// All of these are fatal and reported before any patient is processed.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to read study definition {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid study definition file: {0}")]
    Format(#[from] serde_json::Error),

    /// Expression syntax error inside a variable
    #[error("In '{variable}': {source}")]
    Expression {
        variable: String,
        #[source]
        source: StudyError,
    },

    #[error("Variable '{variable}' references unknown name '{reference}'")]
    UnknownReference { variable: String, reference: String },

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Name '{name}' is defined more than once")]
    DuplicateName { name: String },

    #[error("Codelist '{name}': {source}")]
    Codelist {
        name: String,
        #[source]
        source: CodelistError,
    },

    #[error("Variable '{variable}': {message}")]
    InvalidParameters { variable: String, message: String },

    #[error("Variable '{variable}' has invalid return expectations: {message}")]
    InvalidExpectations { variable: String, message: String },

    #[error("Variable '{variable}' has more than one DEFAULT rule")]
    MultipleDefaults { variable: String },

    #[error("Invalid anchor '{name}': {message}")]
    InvalidAnchor { name: String, message: String },
}

impl BuildError {
    /// Create an invalid parameters error
    pub fn invalid_parameters(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// Create an invalid expectations error
    pub fn invalid_expectations(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidExpectations {
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// Variable the error is about, if any
    pub fn variable(&self) -> Option<&str> {
        match self {
            Self::Expression { variable, .. }
            | Self::UnknownReference { variable, .. }
            | Self::InvalidParameters { variable, .. }
            | Self::InvalidExpectations { variable, .. }
            | Self::MultipleDefaults { variable } => Some(variable),
            Self::DuplicateName { name } | Self::Codelist { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl From<BuildError> for StudyError {
    fn from(err: BuildError) -> Self {
        let context = err.variable().map(str::to_string);
        let converted = match err {
            BuildError::Expression { source, .. } => return source,
            BuildError::Codelist { source, name } => {
                return StudyError::from(source).with_context(name);
            }
            BuildError::Io { .. } => StudyError::system(SD0401, err.to_string()),
            BuildError::Format(_) => StudyError::parse(SD0007, err.to_string(), ""),
            BuildError::UnknownReference { .. } => StudyError::build(SD0100, err.to_string()),
            BuildError::CyclicDependency { .. } => StudyError::build(SD0101, err.to_string()),
            BuildError::DuplicateName { .. } => StudyError::build(SD0102, err.to_string()),
            BuildError::InvalidParameters { .. } => StudyError::build(SD0104, err.to_string()),
            BuildError::InvalidExpectations { .. } => StudyError::build(SD0105, err.to_string()),
            BuildError::MultipleDefaults { .. } => StudyError::build(SD0107, err.to_string()),
            BuildError::InvalidAnchor { .. } => StudyError::system(SD0402, err.to_string()),
        };
        match context {
            Some(context) => converted.with_context(context),
            None => converted,
        }
    }
}
