//! Generate command implementation

use super::{load_study, output};
use anyhow::{Context, Result};
use std::path::PathBuf;
use studydef_diagnostics::StudyError;
use studydef_synth::{Generator, SyntheticConfig};

/// Configuration for generate command
pub struct GenerateConfig {
    pub study: PathBuf,
    pub synthetic: SyntheticConfig,
    pub output_file: Option<PathBuf>,
}

/// Write a synthetic dataset for a study
pub fn generate(config: GenerateConfig) -> Result<()> {
    let study = load_study(&config.study)?;
    let generator = Generator::new(study, config.synthetic)
        .map_err(StudyError::from)
        .context("Study cannot be generated")?;
    if config.synthetic.seed.is_none() {
        eprintln!("Using random seed {}", generator.seed());
    }

    let report = generator.generate();
    output::print_summary(&report);
    output::write_report(&report, config.output_file.as_deref())
}
