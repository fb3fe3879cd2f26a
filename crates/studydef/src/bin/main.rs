//! studydef command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use studydef::cli::{check, extract, generate, output};
use studydef::{ExtractionConfig, SyntheticConfig};

/// Study definition command-line tool
#[derive(Parser)]
#[command(name = "studydef")]
#[command(author, version, about = "Build, extract and generate data for study definitions", long_about = None)]
struct Cli {
    /// Verbose output (info-level logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output CSV file (default: stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    color: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a study definition and report lints
    Check {
        /// Study definition file (JSON)
        study: PathBuf,

        /// Strict mode (warnings as errors)
        #[arg(short, long)]
        strict: bool,
    },

    /// Generate a synthetic dataset from return expectations
    Generate {
        /// Study definition file (JSON)
        study: PathBuf,

        /// Number of patients
        #[arg(short = 'n', long, default_value_t = 1000)]
        size: usize,

        /// Random seed (random when omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Keep only patients inside the population
        #[arg(long)]
        apply_population: bool,
    },

    /// Extract one row per patient from CSV patient data
    Extract {
        /// Study definition file (JSON)
        study: PathBuf,

        /// Patients CSV (patient_id,sex,date_of_birth,healthcare_worker)
        #[arg(short, long)]
        patients: PathBuf,

        /// Events CSV (patient_id,date,kind,code,primary,value,end_date)
        #[arg(short, long)]
        events: PathBuf,

        /// Keep every patient, ignoring the population
        #[arg(long)]
        all_patients: bool,

        /// Evaluate patients on one thread
        #[arg(long)]
        sequential: bool,
    },
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    output::setup_colors(&cli.color);

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let result = match cli.command {
        Commands::Check { study, strict } => check::check(check::CheckConfig { study, strict }),

        Commands::Generate {
            study,
            size,
            seed,
            apply_population,
        } => {
            let mut synthetic = SyntheticConfig::new()
                .with_population_size(size)
                .with_population(apply_population);
            if let Some(seed) = seed {
                synthetic = synthetic.with_seed(seed);
            }
            generate::generate(generate::GenerateConfig {
                study,
                synthetic,
                output_file: cli.output,
            })
        }

        Commands::Extract {
            study,
            patients,
            events,
            all_patients,
            sequential,
        } => {
            let extraction = ExtractionConfig::new()
                .with_parallel(!sequential)
                .with_population(!all_patients);
            extract::extract(extract::ExtractConfig {
                study,
                patients,
                events,
                extraction,
                output_file: cli.output,
            })
        }
    };

    if let Err(e) = result {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(output::exit_code(&e));
    }
}
