//! Declarative clinical study definitions for Rust
//!
//! A study definition names an index date, the codelists it uses, a
//! population filter and a list of variables. This crate ties the pieces
//! together:
//! - Parsing predicates and date expressions ([`parser`])
//! - Compiling a study file into an ordered set of typed variables ([`eval`])
//! - Extracting one row per patient from real data ([`Extractor`])
//! - Generating a synthetic dataset from return expectations ([`Generator`])
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use studydef::{Extractor, InMemorySource, Study};
//!
//! let study = Arc::new(Study::from_path("analysis/study_definition.json")?);
//! let source = InMemorySource::from_csv_paths("patients.csv", "events.csv")?;
//! let report = Extractor::new(study).extract(&source);
//! studydef::write_csv_path("output/input.csv", &report.columns, &report.rows)?;
//! ```

// Re-export all public APIs from internal crates
pub use studydef_ast as ast;
pub use studydef_diagnostics as diagnostics;
pub use studydef_eval as eval;
pub use studydef_model as model;
pub use studydef_parser as parser;
pub use studydef_synth as synth;
pub use studydef_types as types;

// Convenience re-exports
pub use studydef_diagnostics::{Diagnostic, Result, StudyError};
pub use studydef_eval::{
    ExtractionConfig, ExtractionReport, Extractor, Study, write_csv, write_csv_path,
};
pub use studydef_model::{Codelist, CodelistStore, InMemorySource, PatientSource};
pub use studydef_synth::{Generator, SyntheticConfig};

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;
