//! Study definition error types

use crate::{ErrorCode, SourceLocation, Span};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// The study cannot be built
    Error,
    /// Probable authoring mistake; the build goes on
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

/// A message about one part of a study definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    /// Variable the diagnostic is about
    pub variable: Option<String>,
    /// Position inside the offending expression
    pub location: Option<SourceLocation>,
    pub help: Option<String>,
}

impl Diagnostic {
    fn with_severity(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            variable: None,
            location: None,
            help: None,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, code, message)
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, code, message)
    }

    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Whether this diagnostic blocks a build
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Multi-line rendering for terminals
    #[cfg(feature = "colored")]
    pub fn render_colored(&self) -> String {
        use colored::Colorize;

        let severity = match self.severity {
            Severity::Error => self.severity.to_string().red().bold(),
            Severity::Warning => self.severity.to_string().yellow().bold(),
        };
        let mut out = format!("{}[{}]: {}", severity, self.code, self.message);
        let position = match (&self.variable, &self.location) {
            (Some(variable), Some(location)) => Some(format!("{variable} at {location}")),
            (Some(variable), None) => Some(variable.clone()),
            (None, Some(location)) => Some(location.to_string()),
            (None, None) => None,
        };
        if let Some(position) = position {
            out.push_str(&format!("\n  {} {}", "-->".blue(), position));
        }
        if let Some(help) = self.help.as_deref().or(self.code.info().help) {
            out.push_str(&format!("\n  {} {}", "help:".cyan(), help));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.severity, self.code, self.message)?;
        if let Some(variable) = &self.variable {
            write!(f, " in '{variable}'")?;
        }
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}

/// Main study definition error type
#[derive(Debug, Clone, Error)]
pub enum StudyError {
    /// Parse error in an expression or in the study file
    #[error("{code}: {message}")]
    Parse {
        code: ErrorCode,
        message: String,
        expression: String,
        location: Option<SourceLocation>,
    },

    /// Build error (references, graph, codelists, expectations)
    #[error("{code}: {message}")]
    Build {
        code: ErrorCode,
        message: String,
        context: Option<String>,
    },

    /// Per-patient evaluation error
    #[error("{code}: {message}")]
    Evaluation {
        code: ErrorCode,
        message: String,
        context: Option<String>,
    },

    /// Patient data error
    #[error("{code}: {message}")]
    Data {
        code: ErrorCode,
        message: String,
        context: Option<String>,
    },

    /// System error
    #[error("{code}: {message}")]
    System {
        code: ErrorCode,
        message: String,
        context: Option<String>,
    },
}

impl StudyError {
    /// Create a parse error
    pub fn parse(code: ErrorCode, message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::Parse {
            code,
            message: message.into(),
            expression: expression.into(),
            location: None,
        }
    }

    /// Create a parse error pointing at a span of the expression
    pub fn parse_at(
        code: ErrorCode,
        message: impl Into<String>,
        expression: impl Into<String>,
        span: Span,
    ) -> Self {
        let expression = expression.into();
        let location = SourceLocation::from_span(span, &expression);
        Self::Parse {
            code,
            message: message.into(),
            expression,
            location: Some(location),
        }
    }

    /// Create a build error
    pub fn build(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Build {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Create an evaluation error
    pub fn evaluation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Evaluation {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Create a data error
    pub fn data(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Data {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Create a system error
    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::System {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Attach context (usually the variable or file being processed)
    pub fn with_context(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Build { context, .. }
            | Self::Evaluation { context, .. }
            | Self::Data { context, .. }
            | Self::System { context, .. } => *context = Some(value.into()),
            Self::Parse { .. } => {}
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { code, .. }
            | Self::Build { code, .. }
            | Self::Evaluation { code, .. }
            | Self::Data { code, .. }
            | Self::System { code, .. } => *code,
        }
    }

    /// Get the location if available
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::Parse { location, .. } => location.as_ref(),
            _ => None,
        }
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Parse { code, message, location, expression } => {
                let mut diag = Diagnostic::error(*code, message.clone())
                    .with_help(format!("in expression `{expression}`"));
                if let Some(loc) = location {
                    diag = diag.with_location(loc.clone());
                }
                diag
            }
            Self::Build { code, message, context }
            | Self::Evaluation { code, message, context }
            | Self::Data { code, message, context }
            | Self::System { code, message, context } => {
                let mut diag = Diagnostic::error(*code, message.clone());
                if let Some(ctx) = context {
                    diag = diag.with_variable(ctx.clone());
                }
                diag
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SD0001, SD0101, SD0106};

    #[test]
    fn test_parse_at_location() {
        let err = StudyError::parse_at(SD0001, "Unexpected ')'", "a AND )", Span::new(6, 7));
        assert_eq!(err.code(), SD0001);
        let loc = err.location().unwrap();
        assert_eq!((loc.line, loc.column), (1, 7));
    }

    #[test]
    fn test_context_only_on_non_parse_errors() {
        let err = StudyError::build(SD0101, "Cyclic dependency: a -> b -> a").with_context("a");
        let diag = err.to_diagnostic();
        assert_eq!(diag.variable.as_deref(), Some("a"));
        assert!(diag.is_error());
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::warning(SD0106, "Label 'TRUE' used by rules 1 and 2")
            .with_variable("cov_bin_carehome_status");

        let text = diag.to_string();
        assert!(text.starts_with("warning: SD0106"));
        assert!(text.contains("cov_bin_carehome_status"));
    }
}
