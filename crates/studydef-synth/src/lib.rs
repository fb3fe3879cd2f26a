//! Synthetic data generation for study definitions
//!
//! Produces a dataset with the same columns as a real extraction, drawn from
//! each variable's `return_expectations`. The result is an
//! [`ExtractionReport`](studydef_eval::ExtractionReport), so it is written out
//! exactly like real output.
//!
//! ```ignore
//! use std::sync::Arc;
//! use studydef_eval::Study;
//! use studydef_synth::{Generator, SyntheticConfig};
//!
//! let study = Arc::new(Study::from_path("analysis/study_definition.json")?);
//! let config = SyntheticConfig::new().with_population_size(10_000).with_seed(42);
//! let report = Generator::new(study, config)?.generate();
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod sampling;

pub use config::SyntheticConfig;
pub use error::{SynthError, SynthResult};
pub use generator::Generator;
