//! CLI functionality for the studydef tool
//!
//! - `check`: build a study and report its lints
//! - `generate`: write a synthetic dataset
//! - `extract`: evaluate a study over patient CSV files
//! - Output formatting shared by the commands

pub mod check;
pub mod extract;
pub mod generate;
pub mod output;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use studydef_eval::Study;

/// Build a study file, printing its lints
fn load_study(path: &Path) -> Result<Arc<Study>> {
    let study = Study::from_path(path)
        .map_err(studydef_diagnostics::StudyError::from)
        .with_context(|| format!("Failed to build study {}", path.display()))?;
    for lint in study.lints() {
        eprintln!("{}", lint.render_colored());
    }
    Ok(Arc::new(study))
}
