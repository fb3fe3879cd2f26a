//! Study definition diagnostics and error handling
//!
//! This crate provides the error handling infrastructure shared by every
//! studydef crate: coded errors, source locations inside expression strings,
//! and lint diagnostics reported while a study definition is built.

mod error;
mod error_code;
mod span;

pub use error::*;
pub use error_code::*;
pub use span::*;

/// Result type for study definition operations
pub type Result<T> = std::result::Result<T, StudyError>;
