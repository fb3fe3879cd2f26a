//! Study definition evaluation engine
//!
//! This crate compiles a study definition and evaluates it patient by
//! patient:
//!
//! - **Study**: the JSON study definition, compiled into typed variable
//!   definitions over a closed set of query families
//! - **Dependency graph**: a stable topological order of the variables
//! - **Temporal resolver**: date expressions and windows anchored on the
//!   index date or on other variables
//! - **Predicates**: population filters, `satisfying` expressions and
//!   ordered categorisation rules
//! - **Matcher**: first/last/count/presence over a patient's event timeline
//! - **Extraction**: data-parallel evaluation over a patient source, with
//!   per-patient failure isolation, and CSV output
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use studydef_eval::{Extractor, Study};
//! use studydef_model::InMemorySource;
//!
//! let study = Arc::new(Study::from_path("analysis/study_definition.json")?);
//! let source = InMemorySource::from_csv_paths("patients.csv", "events.csv")?;
//! let report = Extractor::new(study).extract(&source);
//! studydef_eval::write_csv_path("output/input.csv", &report.columns, &report.rows)?;
//! ```
//!
//! # Missing values
//!
//! Predicates use two-valued logic: a null or unknown operand is false unless
//! tested with `IS NULL`. A query whose window cannot be resolved because an
//! anchoring variable is null returns its absent value (`false`, `0` or null).

pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod matcher;
pub mod output;
pub mod predicate;
pub mod query;
pub mod study;
pub mod temporal;

pub use context::{Anchors, Bindings, INDEX_DATE, TODAY};
pub use engine::{
    ExtractionConfig, ExtractionReport, Extractor, PatientFailure, PatientOutcome, Row, select_row,
};
pub use error::{BuildError, BuildResult, EvalError, EvalResult};
pub use graph::DependencyGraph;
pub use matcher::EventFilter;
pub use output::{OutputError, write_csv, write_csv_path};
pub use predicate::{CategoryRule, categorise, evaluate_category, evaluate_filter, lint_rules};
pub use query::{evaluate_query, resolved_window};
pub use study::{Study, VariableDefinition, VariableKind};
pub use temporal::{WindowSpec, resolve, within_window};
