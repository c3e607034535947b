use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{WrapErr, bail};
use drawsim::population::{DEFAULT_PRIMARY_DRAWS, DEFAULT_WAITLIST_DRAWS};
use drawsim::{
    Coordinator, EngineConfig, LogTarget, PopulationFile, Report, init_logging, parse_cohort,
};
use drawsim_core::model::{Cohort, PopulationSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Yaml,
}

#[derive(Parser, Debug)]
#[command(name = "drawsim")]
#[command(about = "Estimate weighted lottery odds by Monte Carlo simulation")]
struct Args {
    /// Population file (YAML with cohorts and draw counts)
    #[arg(short, long, conflicts_with = "cohort")]
    population: Option<PathBuf>,

    /// Cohort as TICKETS:APPLICANTS; repeat for each cohort
    #[arg(short, long, value_parser = parse_cohort_arg)]
    cohort: Vec<Cohort>,

    /// Winners drawn in the primary phase
    #[arg(long)]
    primary_draws: Option<u32>,

    /// Winners drawn for the waitlist
    #[arg(long)]
    waitlist_draws: Option<u32>,

    /// Number of trials (default from config)
    #[arg(short, long)]
    trials: Option<u64>,

    /// Worker threads (default from config, then available parallelism)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Path to the data directory (default: ~/.drawsim/)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Write logs to drawsim.log in the data directory instead of stderr
    #[arg(long)]
    log_file: bool,

    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Show progress while the simulation runs
    #[arg(long)]
    progress: bool,
}

fn parse_cohort_arg(arg: &str) -> Result<Cohort, String> {
    parse_cohort(arg).map_err(|e| e.to_string())
}

fn build_snapshot(args: &Args) -> color_eyre::Result<PopulationSnapshot> {
    let mut file = match &args.population {
        Some(path) => PopulationFile::load(path)
            .wrap_err_with(|| format!("loading {}", path.display()))?,
        None if args.cohort.is_empty() => {
            bail!("no population given; pass --population FILE or --cohort TICKETS:APPLICANTS")
        }
        None => PopulationFile {
            cohorts: args.cohort.clone(),
            primary_draws: DEFAULT_PRIMARY_DRAWS,
            waitlist_draws: DEFAULT_WAITLIST_DRAWS,
        },
    };
    if let Some(n) = args.primary_draws {
        file.primary_draws = n;
    }
    if let Some(n) = args.waitlist_draws {
        file.waitlist_draws = n;
    }
    Ok(file.to_snapshot()?)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(EngineConfig::default_data_dir);

    let target = if args.log_file {
        LogTarget::File(data_dir.clone())
    } else {
        LogTarget::Stderr
    };
    init_logging(&target, &args.log_level)?;

    let mut config = EngineConfig::load_or_default(&data_dir);
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    let trials = args.trials.unwrap_or(config.default_trials);

    let snapshot = build_snapshot(&args)?;
    if snapshot.is_exhausted_by_draws() {
        tracing::warn!(
            applicants = snapshot.total_applicants(),
            draws = snapshot.draws().total_draws(),
            "Draws cover every applicant; everyone is drawn"
        );
    }

    let (mut coordinator, updates) = Coordinator::new(config);
    coordinator.request(&snapshot, trials);

    let result = if args.progress {
        let mut stderr = std::io::stderr();
        let result = loop {
            coordinator.pump(Instant::now());
            for update in updates.try_iter() {
                let _ = write!(
                    stderr,
                    "\r{:>6.1}% ({}/{} trials)",
                    update.progress() * 100.0,
                    update.trials_completed,
                    update.target_trials
                );
            }
            if coordinator.state().is_terminal() {
                break coordinator.run_to_completion();
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        let _ = writeln!(stderr);
        result
    } else {
        coordinator.run_to_completion()
    };
    let update = result?;

    let report = Report::new(&snapshot, &update.estimate);
    match args.format {
        Format::Table => print!("{}", report.to_table()),
        Format::Yaml => print!("{}", report.to_yaml()?),
    }

    tracing::info!(run = %update.run_id, trials = update.trials_completed, "Done");
    Ok(())
}
