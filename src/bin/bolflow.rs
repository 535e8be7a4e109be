//! bolflow - Metabolomic workflow CLI
//!
//! Command-line interface for joining measurement tables, computing group
//! statistics, removing duplicate features and threshold filtering.

use bolflow::data::{Classification, FeatureTable, GroupMembership};
use bolflow::dedup::{remove_duplicates_with, AmbiguityPolicy, WindowSpec};
use bolflow::error::{BolflowError, Result};
use bolflow::filter::{filter_by_threshold_with_stats, FilterSpec, DEFAULT_MAX_CV};
use bolflow::join::join_tables;
use bolflow::pipeline::{Pipeline, PipelineConfig};
use bolflow::stats::{compute_group_metrics_with, Dispersion, StatsConfig};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// CLI-friendly standard deviation estimator
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliDispersion {
    /// Sample standard deviation (n - 1)
    Sample,
    /// Population standard deviation (n)
    Population,
}

impl From<CliDispersion> for Dispersion {
    fn from(d: CliDispersion) -> Self {
        match d {
            CliDispersion::Sample => Dispersion::Sample,
            CliDispersion::Population => Dispersion::Population,
        }
    }
}

/// CLI-friendly duplicate ambiguity policy
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPolicy {
    /// Drop a duplicate only if it loses in every group it belongs to
    LoseEverywhere,
    /// Drop a duplicate as soon as it loses in any group
    LoseAnywhere,
}

impl From<CliPolicy> for AmbiguityPolicy {
    fn from(p: CliPolicy) -> Self {
        match p {
            CliPolicy::LoseEverywhere => AmbiguityPolicy::LoseEverywhere,
            CliPolicy::LoseAnywhere => AmbiguityPolicy::LoseAnywhere,
        }
    }
}

/// bolflow - Metabolomic workflow
#[derive(Parser)]
#[command(name = "bolflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase output verbosity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run workflow steps: 1-join files, 2-frequency/CV/max, 3-remove duplicates, 4-filter
    Run {
        /// Steps to run, e.g. 1234
        #[arg(short, long)]
        steps: String,

        /// Input table file(s)
        #[arg(short, long, num_args = 1.., required = true)]
        infiles: Vec<PathBuf>,

        /// Classification table
        #[arg(short, long)]
        classification: PathBuf,

        /// Output directory
        #[arg(short, long)]
        outdir: PathBuf,

        /// Base name of the output files
        #[arg(short = 'n', long, default_value = "bolflow")]
        outname: String,

        /// Step 3: JSON windows per group, e.g. '{"A":[0,5], "B":[4,10]}'
        #[arg(short = 'd', long)]
        rem_dup: Option<String>,

        /// Step 3: how losses in several groups combine
        #[arg(long, value_enum, default_value = "lose-everywhere")]
        policy: CliPolicy,

        /// Step 2: standard deviation estimator for CV
        #[arg(long, value_enum, default_value = "sample")]
        dispersion: CliDispersion,

        /// Step 4: group whose metrics decide retention, e.g. QC
        #[arg(short = 't', long)]
        ftype: Option<String>,

        /// Step 4: minimum frequency in percent
        #[arg(short = 'f', long)]
        fvalue: Option<f64>,

        /// Step 4: also filter by coefficient of variation
        #[arg(long)]
        cv: bool,

        /// Step 4: CV ceiling used with --cv
        #[arg(long, default_value_t = DEFAULT_MAX_CV)]
        max_cv: f64,
    },

    /// Run a pipeline from a YAML configuration file
    Pipeline {
        /// Path to pipeline configuration YAML
        #[arg(long)]
        config: PathBuf,

        /// Input table file(s), joined before the pipeline runs
        #[arg(short, long, num_args = 1.., required = true)]
        infiles: Vec<PathBuf>,

        /// Classification table
        #[arg(short, long)]
        classification: PathBuf,

        /// Output table path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Generate an example pipeline configuration
    Example {
        /// Output path for example YAML
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Options of the `run` command.
struct RunArgs {
    steps: String,
    infiles: Vec<PathBuf>,
    classification: PathBuf,
    outdir: PathBuf,
    outname: String,
    rem_dup: Option<String>,
    policy: AmbiguityPolicy,
    dispersion: Dispersion,
    ftype: Option<String>,
    fvalue: Option<f64>,
    cv: bool,
    max_cv: f64,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
    info!("start: {}", std::env::args().collect::<Vec<_>>().join(" "));

    let result = match cli.command {
        Commands::Run {
            steps,
            infiles,
            classification,
            outdir,
            outname,
            rem_dup,
            policy,
            dispersion,
            ftype,
            fvalue,
            cv,
            max_cv,
        } => cmd_run(RunArgs {
            steps,
            infiles,
            classification,
            outdir,
            outname,
            rem_dup,
            policy: policy.into(),
            dispersion: dispersion.into(),
            ftype,
            fvalue,
            cv,
            max_cv,
        }),

        Commands::Pipeline {
            config,
            infiles,
            classification,
            output,
        } => cmd_pipeline(&config, &infiles, &classification, &output),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    info!("end");
}

/// Output path of a step: `<outdir>/<outname>.<suffix>.csv`.
fn step_output(args: &RunArgs, suffix: &str) -> PathBuf {
    args.outdir.join(format!("{}.{}.csv", args.outname, suffix))
}

/// Suffix of the filter output, e.g. `filt_QC_50` or `filt_QC_50_cv`.
fn filter_suffix(ftype: &str, fvalue: f64, cv: bool) -> String {
    if cv {
        format!("filt_{}_{}_cv", ftype, fvalue)
    } else {
        format!("filt_{}_{}", ftype, fvalue)
    }
}

/// Input of a step: the previous step's table, or the first input file when
/// the previous step did not run.
fn step_input(
    previous: Option<FeatureTable>,
    args: &RunArgs,
    classification: &Classification,
) -> Result<FeatureTable> {
    match previous {
        Some(table) => Ok(table),
        None => {
            let path = &args.infiles[0];
            debug!("Reading {:?}", path);
            FeatureTable::from_path(path, classification)
        }
    }
}

/// Run the numbered workflow steps
fn cmd_run(args: RunArgs) -> Result<()> {
    if let Some(bad) = args.steps.chars().find(|c| !matches!(c, '1'..='4')) {
        return Err(BolflowError::InvalidParameter(format!(
            "unknown step '{}'; steps are 1, 2, 3 and 4",
            bad
        )));
    }
    let has_step = |n: char| args.steps.contains(n);

    // Conditional parameters are checked before any work
    let windows = match (&args.rem_dup, has_step('3')) {
        (Some(json), true) => Some(WindowSpec::from_json(json)?),
        (None, true) => {
            return Err(BolflowError::InvalidParameter(
                "step 3 requires the window specification (-d/--rem-dup)".to_string(),
            ))
        }
        _ => None,
    };
    let filter = if has_step('4') {
        match (&args.ftype, args.fvalue) {
            (Some(ftype), Some(fvalue)) => {
                let spec = FilterSpec::new(ftype, fvalue);
                let spec = if args.cv { spec.with_cv(args.max_cv) } else { spec };
                spec.validate()?;
                Some(spec)
            }
            _ => {
                return Err(BolflowError::InvalidParameter(
                    "step 4 requires the filter type (-t) and value (-f)".to_string(),
                ))
            }
        }
    } else {
        None
    };

    let classification = Classification::from_path(&args.classification)?;
    info!(
        "Loaded classification of {} samples ({} groups)",
        classification.n_samples(),
        classification.groups().len()
    );
    std::fs::create_dir_all(&args.outdir)?;

    let carried = if has_step('1') {
        let outfile = step_output(&args, "join");
        info!("step 1: {:?} > {:?}", args.infiles, outfile);
        let tables = args
            .infiles
            .iter()
            .map(|path| FeatureTable::from_path(path, &classification))
            .collect::<Result<Vec<_>>>()?;
        let joined = join_tables(&tables, &classification)?;
        joined.to_path(&outfile)?;
        Some(joined)
    } else {
        None
    };

    let carried = if has_step('2') {
        let outfile = step_output(&args, "f-cv");
        info!("step 2: > {:?}", outfile);
        let input = step_input(carried, &args, &classification)?;
        let config = StatsConfig {
            dispersion: args.dispersion,
        };
        let computed = compute_group_metrics_with(&input, &classification, &config)?;
        computed.to_path(&outfile)?;
        Some(computed)
    } else {
        None
    };

    let carried = match &windows {
        Some(windows) => {
            let outfile = step_output(&args, "rem");
            info!("step 3: > {:?}", outfile);
            let input = step_input(carried, &args, &classification)?;
            let deduped = remove_duplicates_with(&input, &classification, windows, args.policy)?;
            deduped.to_path(&outfile)?;
            Some(deduped)
        }
        None => None,
    };

    if let Some(spec) = &filter {
        let outfile = step_output(
            &args,
            &filter_suffix(&spec.group_type, spec.threshold_percent, spec.use_cv),
        );
        info!("step 4: > {:?}", outfile);
        let input = step_input(carried, &args, &classification)?;
        let (filtered, stats) = filter_by_threshold_with_stats(&input, &classification, spec)?;
        filtered.to_path(&outfile)?;
        eprint!("{}", stats);
    }

    Ok(())
}

/// Run a pipeline from configuration
fn cmd_pipeline(
    config_path: &Path,
    infiles: &[PathBuf],
    classification_path: &Path,
    output_path: &Path,
) -> Result<()> {
    info!("Loading pipeline configuration from {:?}", config_path);
    let config_str = std::fs::read_to_string(config_path)?;
    let config = PipelineConfig::from_yaml(&config_str)?;

    let classification = Classification::from_path(classification_path)?;
    let tables = infiles
        .iter()
        .map(|path| FeatureTable::from_path(path, &classification))
        .collect::<Result<Vec<_>>>()?;

    let pipeline = Pipeline::from_config(&config);
    let result = pipeline.run_tables(&tables, &classification)?;

    info!("Writing {} features to {:?}", result.n_features(), output_path);
    result.to_path(output_path)?;
    Ok(())
}

/// Generate example configuration
fn cmd_example(output_path: &Path) -> Result<()> {
    let pipeline = Pipeline::new()
        .name("example-bolflow")
        .compute_metrics(Dispersion::Sample)
        .remove_duplicates(
            WindowSpec::new()
                .with_window("A", 0.0, 5.0)
                .with_window("B", 4.0, 10.0),
        )
        .filter_threshold(FilterSpec::new("QC", 50.0));

    let config = pipeline.to_config(Some(
        "Group statistics, duplicate removal and a 50% QC frequency filter",
    ));
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example pipeline to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
