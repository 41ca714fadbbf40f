use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use cohort_definition::config::{ExtractionConfig, OutputFormat};
use cohort_definition::definitions::{load_study_codelists, study_definition};
use cohort_definition::utils::logging::{print_cohort_summary, print_dependencies};
use cohort_definition::{DummyDataGenerator, Extractor, PatientStore, StudyDefinition, write_cohort};

#[derive(Parser)]
#[command(
    name = "generate-cohort",
    version,
    about = "Validate, plan and extract the SGSS-positive COVID-19 cohort"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file; command line flags override it
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory holding the codelist CSV files
    #[arg(long = "codelists", value_name = "DIR", global = true)]
    codelist_dir: Option<PathBuf>,

    /// Date used for "today" (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", global = true)]
    today: Option<NaiveDate>,

    /// Worker threads
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Hide progress bars
    #[arg(long = "no-progress", global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build and validate the study definition
    Check,
    /// Print the query plan as JSON
    Plan,
    /// Extract the cohort from Parquet tables
    Extract(ExtractArgs),
    /// Generate a dummy cohort from return expectations
    Dummy(DummyArgs),
}

#[derive(Args)]
struct OutputArgs {
    /// Output file
    #[arg(long, short, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format (taken from the file extension when omitted)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
}

#[derive(Args)]
struct ExtractArgs {
    /// Directory holding the patient tables
    #[arg(value_name = "INPUT_DIR")]
    input: PathBuf,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct DummyArgs {
    /// Number of patients to generate
    #[arg(long)]
    size: Option<usize>,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Parquet,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => Self::Csv,
            FormatArg::Parquet => Self::Parquet,
        }
    }
}

fn main() -> Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match &cli.command {
        Command::Check => {
            let study = build_study(&config)?;
            print_dependencies(&study);
            info!(
                "Study definition is valid: {} variables, {} output columns",
                study.variables().len(),
                study.columns().len() + 1
            );
        }
        Command::Plan => {
            let study = build_study(&config)?;
            let plan = serde_json::to_string_pretty(&study.plan())
                .context("Failed to serialise query plan")?;
            println!("{plan}");
        }
        Command::Extract(args) => {
            config.input_dir = Some(args.input.clone());
            apply_output(&mut config, &args.output);
            config.validate()?;
            info!("{config}");

            let study = build_study(&config)?;
            let start = Instant::now();
            let store = PatientStore::load_from_dir(&args.input, &config)
                .with_context(|| format!("Failed to load patient tables from {}", args.input.display()))?;
            let cohort = Extractor::new(&study, &config).extract(&store)?;
            write_cohort(&cohort, &config.output_path, config.output_format, config.batch_size)
                .with_context(|| format!("Failed to write {}", config.output_path.display()))?;
            print_cohort_summary(&cohort, start.elapsed());
        }
        Command::Dummy(args) => {
            config.dummy_data = true;
            if let Some(size) = args.size {
                config.population_size = size;
            }
            if args.seed.is_some() {
                config.seed = args.seed;
            }
            apply_output(&mut config, &args.output);
            config.validate()?;
            info!("{config}");

            let study = build_study(&config)?;
            let start = Instant::now();
            let cohort = DummyDataGenerator::new(&study, &config).generate()?;
            write_cohort(&cohort, &config.output_path, config.output_format, config.batch_size)
                .with_context(|| format!("Failed to write {}", config.output_path.display()))?;
            print_cohort_summary(&cohort, start.elapsed());
        }
    }

    Ok(())
}

/// Configuration file, then environment, then global flags
fn load_config(cli: &Cli) -> Result<ExtractionConfig> {
    let config = match &cli.config {
        Some(path) => ExtractionConfig::from_json_file(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?,
        None => ExtractionConfig::default(),
    };
    let mut config = config.with_env_overrides()?;

    if let Some(dir) = &cli.codelist_dir {
        config.codelist_dir.clone_from(dir);
    }
    if cli.today.is_some() {
        config.today = cli.today;
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if cli.no_progress {
        config.show_progress = false;
    }
    Ok(config)
}

fn apply_output(config: &mut ExtractionConfig, args: &OutputArgs) {
    if let Some(path) = &args.output {
        config.output_path.clone_from(path);
    }
    config.output_format = args
        .format
        .map(OutputFormat::from)
        .or_else(|| OutputFormat::from_path(&config.output_path))
        .unwrap_or(config.output_format);
}

fn build_study(config: &ExtractionConfig) -> Result<StudyDefinition> {
    let codelists = load_study_codelists(&config.codelist_dir).with_context(|| {
        format!("Failed to load codelists from {}", config.codelist_dir.display())
    })?;
    let study = study_definition(&codelists).context("Invalid study definition")?;
    Ok(study)
}
