//! Entry point for the earthgrid application.
//! Handles CLI parsing, logging setup, and dispatches batch conversions and inspection.

use clap::Parser;
use earthgrid::batch::{discover_inputs, finish_batch, run_batch, BatchReport};
use earthgrid::config::{ConfigOverrides, ConvertConfig, DatasetKind};
use earthgrid::metadata::{describe_source, describe_variable, print_description, print_variable};
use earthgrid::parallel::ParallelInfo;
use earthgrid::pipeline::convert_currents_file;
use earthgrid::regrid::Regridder;
use earthgrid::wind::convert_wind_file;
use earthgrid::ConvertError;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{BatchArgs, Cli, Command};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    init_logging(args.verbose, args.json);

    if !args.json {
        println!(
            r#"
------------------------------------------------------------------
                  earthgrid: grids to earth JSON
------------------------------------------------------------------
"#
        );
    }

    match args.command {
        Command::Currents(currents) => {
            let config = load_config(DatasetKind::OceanCurrents, &currents.batch, currents.overrides())?;
            let regridder = Regridder::from_config(&config)?;
            let report = run_conversion(&currents.batch, "*.nc", |input, output_dir| {
                convert_currents_file(input, output_dir, &config, regridder.as_ref())
            })?;
            print_report(&report);
        }
        Command::Wind(wind) => {
            let config = load_config(DatasetKind::Wind, &wind.batch, wind.overrides())?;
            let report = run_conversion(&wind.batch, "*.json", |input, output_dir| {
                convert_wind_file(input, output_dir, &config)
            })?;
            print_report(&report);
        }
        Command::Inspect(inspect) => {
            let file = netcdf::open(&inspect.file)?;
            println!("Successfully opened NetCDF file: {}", inspect.file.display());
            match inspect.variable {
                Some(name) => print_variable(&describe_variable(&file, &name)?),
                None => print_description(&describe_source(&file)?),
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

/// Config file values first, command-line flags on top.
fn load_config(
    dataset: DatasetKind,
    batch: &BatchArgs,
    flags: ConfigOverrides,
) -> earthgrid::Result<ConvertConfig> {
    let file = match &batch.config {
        Some(path) => ConfigOverrides::from_json_file(path)?,
        None => ConfigOverrides::default(),
    };
    ConvertConfig::resolve(dataset, &file.merge(flags))
}

fn run_conversion<F>(
    batch: &BatchArgs,
    default_pattern: &str,
    job: F,
) -> earthgrid::Result<BatchReport>
where
    F: Fn(&std::path::Path, &std::path::Path) -> earthgrid::Result<earthgrid::pipeline::JobStatus>
        + Sync,
{
    let pattern = batch.pattern.as_deref().unwrap_or(default_pattern);
    let inputs = discover_inputs(&batch.input_dir, pattern)?;
    fs::create_dir_all(&batch.output_dir).map_err(|e| ConvertError::encode(&batch.output_dir, e))?;

    let parallel = batch.parallel();
    let info = ParallelInfo::for_config(&parallel);
    info!(
        inputs = inputs.len(),
        pattern,
        workers = info.workers,
        cores = info.available_cores,
        "Discovered input files"
    );

    let output_dir = batch.output_dir.as_path();
    let outcomes = run_batch(&inputs, &parallel, |input| job(input, output_dir))?;
    finish_batch(outcomes, output_dir, &batch.catalog_path())
}

fn print_report(report: &BatchReport) {
    println!("\n Batch Summary");
    println!("=================");
    println!("    Written: {}", report.written());
    println!("    Skipped: {}", report.skipped());
    println!("    Failed:  {}", report.failed());
    for (input, category) in report.failures() {
        println!("      - {} ({:?})", input.display(), category);
    }
    println!("    Catalog entries: {}", report.catalog.len());
}
