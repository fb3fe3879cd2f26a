//! Output formatting utilities

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, IsTerminal};
use std::path::Path;
use studydef_diagnostics::StudyError;
use studydef_eval::{ExtractionReport, write_csv, write_csv_path};

/// Number of failed patients listed individually in a run summary
const LISTED_FAILURES: usize = 10;

/// Set up color output based on user preference
pub fn setup_colors(mode: &str) {
    match mode.to_lowercase().as_str() {
        "always" => colored::control::set_override(true),
        "never" => colored::control::set_override(false),
        _ => colored::control::set_override(io::stderr().is_terminal()),
    }
}

/// Format an error for display
///
/// Study errors in the chain are rendered as diagnostics under the
/// outermost context.
pub fn format_error(error: &anyhow::Error) -> String {
    match error.chain().find_map(|cause| cause.downcast_ref::<StudyError>()) {
        Some(study_error) => format!(
            "{} {}\n{}",
            "Error:".red().bold(),
            error,
            study_error.to_diagnostic().render_colored()
        ),
        None => format!("{} {:#}", "Error:".red().bold(), error),
    }
}

/// Process exit code for a failed command
///
/// `2` for a study that does not parse or build, `3` for unreadable patient
/// data, `4` for evaluation failures, `5` for system errors and `1` otherwise.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    let Some(code) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StudyError>())
        .map(StudyError::code)
    else {
        return 1;
    };
    if code.is_parse_error() || code.is_build_error() {
        2
    } else if code.is_data_error() {
        3
    } else if code.is_evaluation_error() {
        4
    } else if code.is_system_error() {
        5
    } else {
        1
    }
}

/// Format a warning for display
pub fn format_warning(warning: &str) -> String {
    format!("{} {}", "Warning:".yellow().bold(), warning)
}

/// Format a success message for display
pub fn format_success(message: &str) -> String {
    format!("{} {}", "Success:".green().bold(), message)
}

/// Write the report rows as CSV to a file or stdout
pub fn write_report(report: &ExtractionReport, output_file: Option<&Path>) -> Result<()> {
    match output_file {
        Some(path) => {
            write_csv_path(path, &report.columns, &report.rows)
                .with_context(|| format!("Failed to write output file: {}", path.display()))?;
            eprintln!(
                "{}",
                format_success(&format!("{} rows written to {}", report.rows.len(), path.display()))
            );
        }
        None => write_csv(io::stdout().lock(), &report.columns, &report.rows)
            .context("Failed to write CSV to stdout")?,
    }
    Ok(())
}

/// Print counts and the first failures of a run to stderr
pub fn print_summary(report: &ExtractionReport) {
    eprintln!(
        "{} patients: {} rows, {} excluded by the population, {} failed",
        report.processed(),
        report.rows.len().to_string().green(),
        report.excluded,
        if report.failures.is_empty() {
            "0".normal()
        } else {
            report.failures.len().to_string().red()
        }
    );

    for failure in report.failures.iter().take(LISTED_FAILURES) {
        eprintln!(
            "  {} patient {}: {}",
            failure.code.to_string().red(),
            failure.patient_id,
            failure.reason
        );
    }
    if report.failures.len() > LISTED_FAILURES {
        eprintln!(
            "{}",
            format_warning(&format!("{} more failures not shown", report.failures.len() - LISTED_FAILURES))
        );
    }
}
