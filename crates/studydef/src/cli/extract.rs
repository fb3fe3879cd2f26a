//! Extract command implementation

use super::{load_study, output};
use anyhow::{Context, Result};
use std::path::PathBuf;
use studydef_diagnostics::StudyError;
use studydef_eval::{ExtractionConfig, Extractor};
use studydef_model::InMemorySource;

/// Configuration for extract command
pub struct ExtractConfig {
    pub study: PathBuf,
    pub patients: PathBuf,
    pub events: PathBuf,
    pub extraction: ExtractionConfig,
    pub output_file: Option<PathBuf>,
}

/// Evaluate a study over patient CSV files
pub fn extract(config: ExtractConfig) -> Result<()> {
    let study = load_study(&config.study)?;
    let source = InMemorySource::from_csv_paths(&config.patients, &config.events)
        .map_err(StudyError::from)
        .context("Failed to load patient data")?;
    log::info!("Loaded {} patients", source.len());

    let report = Extractor::new(study)
        .with_config(config.extraction)
        .extract(&source);
    output::print_summary(&report);
    output::write_report(&report, config.output_file.as_deref())
}
