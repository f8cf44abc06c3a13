//! ALTFUSE: closed-loop test bench for the altitude estimator.
//!
//! Flies the estimator against the deterministic synthetic flight pattern with a noisy synthetic barometer
//! and writes the per-tick results to CSV. Settings can come from a configuration file (TOML/JSON/YAML),
//! from command-line flags, or both, with flags taking precedence.
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use std::error::Error;
use std::path::PathBuf;

use altfuse::config::SimulationConfig;
use altfuse::params::{PARAM_GROUP, ParamRegistry};
use altfuse::sim::run_closed_loop;

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Closed-loop test bench for the altitude complementary filter.")]
struct Cli {
    /// Simulation configuration file (TOML/JSON/YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path, or a directory to hold altfuse.log (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "sim",
        about = "Run the estimator against the synthetic flight pattern",
        long_about = "Run the altitude estimator in closed loop with the synthetic flight pattern. The synthetic range sensor is always fresh unless --range-dropout is given, in which case it stops reporting at that time and the estimator holds its last range-based altitude."
    )]
    Sim(SimArgs),
    #[command(name = "config", about = "Generate a template configuration file")]
    CreateConfig(CreateConfigArgs),
    #[command(name = "params", about = "List the tunable parameters and their values")]
    Params,
}

#[derive(Args, Clone, Debug)]
struct SimArgs {
    /// Output CSV file path
    #[arg(short, long, value_parser)]
    output: PathBuf,

    /// Control loop period (s)
    #[arg(long)]
    dt: Option<f64>,

    /// Simulated duration (s)
    #[arg(long)]
    duration: Option<f64>,

    /// Barometer noise standard deviation (m)
    #[arg(long)]
    baro_noise: Option<f64>,

    /// Barometer offset from true altitude (m)
    #[arg(long)]
    baro_offset: Option<f64>,

    /// Time at which the range sensor stops reporting (s)
    #[arg(long)]
    range_dropout: Option<f64>,

    /// RNG seed for the barometer noise
    #[arg(long)]
    seed: Option<u64>,

    /// Parameter override as NAME=VALUE (repeatable), e.g. --set estAlphaZr=0.85
    #[arg(long = "set", value_name = "NAME=VALUE")]
    overrides: Vec<String>,
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output file path; the extension selects the format (.json, .yaml/.yml, or .toml)
    #[arg(short, long, value_parser)]
    output: PathBuf,
}

/// Log file name used when `--log-file` points at a directory
const DEFAULT_LOG_FILE_NAME: &str = "altfuse.log";

/// Set up logging for the bench.
///
/// The requested level applies to this crate only; dependencies are capped at `warn`. At `trace` the
/// estimator reports every held tick, which is one line per control tick during a range dropout, so a
/// file target is usually wanted. A `log_file` that is an existing directory gets [DEFAULT_LOG_FILE_NAME]
/// inside it.
fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let level: log::LevelFilter = log_level
        .parse()
        .map_err(|e| format!("invalid log level '{log_level}': {e}"))?;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level.min(log::LevelFilter::Warn));
    builder.filter_module("altfuse", level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    match log_file {
        Some(path) => {
            let path = if path.is_dir() {
                path.join(DEFAULT_LOG_FILE_NAME)
            } else {
                path.clone()
            };
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None if level == log::LevelFilter::Trace => {
            eprintln!("Tracing to stderr; held-tick diagnostics are logged every control tick");
        }
        None => {}
    }

    builder.try_init()?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SimulationConfig, Box<dyn Error>> {
    match path {
        Some(p) => {
            info!("Loading configuration from {}", p.display());
            Ok(SimulationConfig::from_file(p)?)
        }
        None => Ok(SimulationConfig::default()),
    }
}

fn run_sim(mut config: SimulationConfig, args: &SimArgs) -> Result<(), Box<dyn Error>> {
    if let Some(dt) = args.dt {
        config.dt = dt;
    }
    if let Some(duration) = args.duration {
        config.duration_s = duration;
    }
    if let Some(noise) = args.baro_noise {
        config.baro_noise_std_m = noise;
    }
    if let Some(offset) = args.baro_offset {
        config.baro_offset_m = offset;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.range_dropout.is_some() {
        config.range_dropout_s = args.range_dropout;
    }
    for assignment in &args.overrides {
        ParamRegistry::apply_assignment(&mut config.estimator.params, assignment)?;
    }

    let result = run_closed_loop(&config)?;
    if result.held_count() > 0 {
        warn!(
            "Estimate was held on a stale range sample for {} of {} ticks",
            result.held_count(),
            result.len()
        );
    }
    info!(
        "Altitude error: rms {:.4} m, max {:.4} m over {} ticks",
        result.rms_altitude_error(),
        result.max_altitude_error(),
        result.len()
    );
    if let Some(parent) = args.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    result.to_csv(&args.output)?;
    info!("Results written to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    let config = load_config(cli.config.as_ref())?;
    match &cli.command {
        Command::Sim(args) => {
            if let Err(e) = run_sim(config, args) {
                error!("Error running closed-loop simulation: {}", e);
                return Err(e);
            }
        }
        Command::CreateConfig(args) => {
            config.to_file(&args.output)?;
            info!("Template configuration written to {}", args.output.display());
        }
        Command::Params => {
            for entry in ParamRegistry::entries() {
                println!(
                    "{}.{:<14} {:>10} {}",
                    PARAM_GROUP,
                    entry.name,
                    (entry.get)(&config.estimator.params),
                    entry.description
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_rejects_unknown_level() {
        let err = init_logger("loud", None).unwrap_err();
        assert!(err.to_string().contains("invalid log level 'loud'"));
    }
}
