//! Check command implementation

use super::{load_study, output};
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

/// Configuration for check command
pub struct CheckConfig {
    pub study: PathBuf,
    /// Treat lint warnings as errors
    pub strict: bool,
}

/// Build a study definition and report what it contains
pub fn check(config: CheckConfig) -> Result<()> {
    let study = load_study(&config.study)?;

    println!("{} {}", "✓".green().bold(), config.study.display().to_string().cyan());
    if let Some(index_date) = study.anchors().index_date() {
        println!("  index date: {index_date}");
    }
    println!("  codelists: {}", study.codelists().len());
    println!(
        "  variables: {} ({} output columns)",
        study.order().len(),
        study.columns().len()
    );
    if let Some(population) = study.population() {
        println!("  population: {population}");
    }
    for definition in study.ordered() {
        log::debug!(
            "{} := {} -> {}{}",
            definition.name,
            definition.query.name(),
            definition.kind,
            if definition.hidden { " (hidden)" } else { "" }
        );
    }

    let warnings = study.lints().len();
    if warnings == 0 {
        println!("{}", output::format_success("no warnings"));
        return Ok(());
    }

    let summary = format!("{warnings} warning(s)").yellow();
    if config.strict {
        anyhow::bail!("{summary} (strict mode treats warnings as errors)");
    }
    eprintln!("{}", output::format_warning(&summary.to_string()));
    Ok(())
}
