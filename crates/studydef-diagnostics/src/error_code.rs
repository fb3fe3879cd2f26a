//! Study definition error codes following a structured numbering system
//!
//! Error code ranges:
//! - SD0001-SD0099: Parse errors (expression syntax, study file syntax)
//! - SD0100-SD0199: Build errors (references, graph, expectations, codelists)
//! - SD0200-SD0299: Evaluation errors (per patient, recoverable)
//! - SD0300-SD0399: Data errors (patient source, records, events)
//! - SD0400-SD0499: System errors (I/O, configuration)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Error code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric code
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Get error information for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    /// Check if this is a parse error (0001-0099)
    pub const fn is_parse_error(&self) -> bool {
        self.0 >= 1 && self.0 < 100
    }

    /// Check if this is a build error (0100-0199)
    pub const fn is_build_error(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    /// Check if this is an evaluation error (0200-0299)
    pub const fn is_evaluation_error(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Check if this is a data error (0300-0399)
    pub const fn is_data_error(&self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Check if this is a system error (0400-0499)
    pub const fn is_system_error(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SD{:04}", self.0)
    }
}

/// Information about an error code
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Short description of the error
    pub description: &'static str,
    /// Detailed help text
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(description: &'static str) -> Self {
        Self {
            description,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new("Unknown error");

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Parse errors (0001-0099)
    map.insert(1, ErrorInfo::new("Unexpected token"));
    map.insert(2, ErrorInfo::new("Unexpected end of input"));
    map.insert(3, ErrorInfo::new("Invalid identifier"));
    map.insert(4, ErrorInfo::new("Invalid date literal"));
    map.insert(5, ErrorInfo::new("Unterminated string literal"));
    map.insert(6, ErrorInfo::new("Invalid time unit")
        .with_help("Use days, weeks, months or years"));
    map.insert(7, ErrorInfo::new("Invalid study definition file"));

    // Build errors (0100-0199)
    map.insert(100, ErrorInfo::new("Unknown reference")
        .with_help("Check that the variable is declared in the study or in the enclosing scope"));
    map.insert(101, ErrorInfo::new("Cyclic dependency"));
    map.insert(102, ErrorInfo::new("Duplicate variable name"));
    map.insert(103, ErrorInfo::new("Unknown codelist"));
    map.insert(104, ErrorInfo::new("Invalid query parameters"));
    map.insert(105, ErrorInfo::new("Invalid return expectations"));
    map.insert(106, ErrorInfo::new("Duplicate category label")
        .with_help("Rules sharing a label are still tested in order; merge them with OR if that was the intent"));
    map.insert(107, ErrorInfo::new("Multiple DEFAULT rules"));
    map.insert(108, ErrorInfo::new("Malformed codelist"));

    // Evaluation errors (0200-0299)
    map.insert(200, ErrorInfo::new("Evaluation failed"));
    map.insert(201, ErrorInfo::new("Date arithmetic overflow"));
    map.insert(202, ErrorInfo::new("Type mismatch"));
    map.insert(203, ErrorInfo::new("Unknown binding"));

    // Data errors (0300-0399)
    map.insert(300, ErrorInfo::new("Patient not found"));
    map.insert(301, ErrorInfo::new("Malformed patient record"));
    map.insert(302, ErrorInfo::new("Malformed timeline event"));

    // System errors (0400-0499)
    map.insert(400, ErrorInfo::new("Internal error"));
    map.insert(401, ErrorInfo::new("I/O error"));
    map.insert(402, ErrorInfo::new("Configuration error"));
    map.insert(404, ErrorInfo::new("File not found"));
    map.insert(406, ErrorInfo::new("Invalid format"));

    map
});

// Parse errors
pub const SD0001: ErrorCode = ErrorCode::new(1);
pub const SD0002: ErrorCode = ErrorCode::new(2);
pub const SD0003: ErrorCode = ErrorCode::new(3);
pub const SD0004: ErrorCode = ErrorCode::new(4);
pub const SD0005: ErrorCode = ErrorCode::new(5);
pub const SD0006: ErrorCode = ErrorCode::new(6);
pub const SD0007: ErrorCode = ErrorCode::new(7);

// Build errors
pub const SD0100: ErrorCode = ErrorCode::new(100);
pub const SD0101: ErrorCode = ErrorCode::new(101);
pub const SD0102: ErrorCode = ErrorCode::new(102);
pub const SD0103: ErrorCode = ErrorCode::new(103);
pub const SD0104: ErrorCode = ErrorCode::new(104);
pub const SD0105: ErrorCode = ErrorCode::new(105);
pub const SD0106: ErrorCode = ErrorCode::new(106);
pub const SD0107: ErrorCode = ErrorCode::new(107);
pub const SD0108: ErrorCode = ErrorCode::new(108);

// Evaluation errors
pub const SD0200: ErrorCode = ErrorCode::new(200);
pub const SD0201: ErrorCode = ErrorCode::new(201);
pub const SD0202: ErrorCode = ErrorCode::new(202);
pub const SD0203: ErrorCode = ErrorCode::new(203);

// Data errors
pub const SD0300: ErrorCode = ErrorCode::new(300);
pub const SD0301: ErrorCode = ErrorCode::new(301);
pub const SD0302: ErrorCode = ErrorCode::new(302);

// System errors
pub const SD0400: ErrorCode = ErrorCode::new(400);
pub const SD0401: ErrorCode = ErrorCode::new(401);
pub const SD0402: ErrorCode = ErrorCode::new(402);
pub const SD0404: ErrorCode = ErrorCode::new(404);
pub const SD0406: ErrorCode = ErrorCode::new(406);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(SD0001.to_string(), "SD0001");
        assert_eq!(SD0101.to_string(), "SD0101");
    }

    #[test]
    fn test_error_code_ranges() {
        assert!(SD0004.is_parse_error());
        assert!(SD0101.is_build_error());
        assert!(SD0201.is_evaluation_error());
        assert!(SD0302.is_data_error());
        assert!(SD0404.is_system_error());
    }

    #[test]
    fn test_error_info() {
        assert_eq!(SD0101.info().description, "Cyclic dependency");
        assert!(SD0106.info().help.is_some());
        assert_eq!(ErrorCode::new(999).info().description, "Unknown error");
    }
}
