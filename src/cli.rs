//! Defines command-line interface options using `clap` for the earthgrid application.

use clap::{Args, Parser, Subcommand};
use earthgrid::calendar::{Calendar, TimeUnit};
use earthgrid::config::{ConfigOverrides, InterpolationMethod, Resolution};
use earthgrid::parallel::ParallelConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Convert gridded ocean current and wind data to earth JSON
#[derive(Parser, Debug)]
#[command(
    version,
    name = "earthgrid",
    about = "Batch converter from netCDF and grib2json output to earth visualization JSON"
)]
pub struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert ocean surface current netCDF files (e.g. OSCAR)
    Currents(CurrentsArgs),
    /// Post-process grib2json output of GFS wind files
    Wind(WindArgs),
    /// List dimensions and variables of a netCDF file
    Inspect(InspectArgs),
}

/// Options shared by every batch conversion
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Directory holding the input files
    #[arg(short, long)]
    pub input_dir: PathBuf,

    /// Glob pattern selecting input file names, e.g. `oscar_*.nc`
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Directory receiving the JSON files
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Catalog file. Defaults to `<output_dir>.catalog.json` next to the output directory.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// JSON file with configuration overrides; flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Replace existing output files
    #[arg(long, default_value_t = false)]
    pub over_write: bool,

    /// Label used in output file names instead of the resolution
    #[arg(long)]
    pub label: Option<String>,

    /// Number of files converted at once. Defaults to one less than the number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Convert files one after another
    #[arg(long, default_value_t = false, conflicts_with = "threads")]
    pub serial: bool,
}

impl BatchArgs {
    pub fn parallel(&self) -> ParallelConfig {
        ParallelConfig::new(self.threads, self.serial)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog.clone().unwrap_or_else(|| {
            let mut name = self
                .output_dir
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "output".into());
            name.push(".catalog.json");
            self.output_dir.with_file_name(name)
        })
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            resolution_label: self.label.clone(),
            over_write: self.over_write.then_some(true),
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CurrentsArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Name of the U variable
    #[arg(long)]
    pub u_name: Option<String>,

    /// Name of the V variable
    #[arg(long)]
    pub v_name: Option<String>,

    /// Only convert the U variable
    #[arg(long, default_value_t = false, conflicts_with = "v_name")]
    pub no_v: bool,

    /// Name of the longitude coordinate variable
    #[arg(long)]
    pub x_name: Option<String>,

    /// Name of the latitude coordinate variable
    #[arg(long)]
    pub y_name: Option<String>,

    /// Name of the time coordinate variable
    #[arg(long)]
    pub t_name: Option<String>,

    /// Longitude dimension, when it differs from the coordinate variable's
    #[arg(long)]
    pub x_dim: Option<String>,

    /// Latitude dimension, when it differs from the coordinate variable's
    #[arg(long)]
    pub y_dim: Option<String>,

    /// Time dimension, when it differs from the coordinate variable's
    #[arg(long)]
    pub t_dim: Option<String>,

    /// Calendar of the time axis (standard, proleptic_gregorian, julian, noleap, all_leap, 360_day)
    #[arg(long)]
    pub calendar: Option<Calendar>,

    /// Base date of the time axis, e.g. "1992-10-05 00:00:00"
    #[arg(long)]
    pub basedate: Option<String>,

    /// Unit of the time axis (days, hours, minutes, seconds)
    #[arg(long)]
    pub time_unit: Option<TimeUnit>,

    /// Constant added to every time value before decoding
    #[arg(long, allow_hyphen_values = true)]
    pub time_shift: Option<f64>,

    /// Index range of a dimension, formatted as <dim>:<start>:<end>; repeatable
    #[arg(long, value_parser = parse_clip_arg)]
    pub clip: Vec<(String, (usize, usize))>,

    /// Sentinel marking missing values
    #[arg(long, allow_hyphen_values = true)]
    pub nan_value: Option<f64>,

    /// Interpolated magnitudes above this become missing
    #[arg(long)]
    pub extranan: Option<f64>,

    /// Target grid step in degrees, or `native`
    #[arg(short, long)]
    pub resolution: Option<Resolution>,

    /// Interpolation used when regridding (linear, nearest)
    #[arg(long)]
    pub method: Option<InterpolationMethod>,
}

impl CurrentsArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        let clip = if self.clip.is_empty() {
            None
        } else {
            Some(self.clip.iter().cloned().collect::<BTreeMap<_, _>>())
        };
        ConfigOverrides {
            u_name: self.u_name.clone(),
            v_name: self.v_name.clone(),
            paired: self.no_v.then_some(false),
            x_name: self.x_name.clone(),
            y_name: self.y_name.clone(),
            t_name: self.t_name.clone(),
            x_dim: self.x_dim.clone(),
            y_dim: self.y_dim.clone(),
            t_dim: self.t_dim.clone(),
            calendar: self.calendar,
            basedate: self.basedate.clone(),
            time_unit: self.time_unit,
            time_shift: self.time_shift,
            clip,
            nan_value: self.nan_value,
            extranan: self.extranan,
            resolution: self.resolution,
            method: self.method,
            ..self.batch.overrides()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct WindArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

impl WindArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        self.batch.overrides()
    }
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Path to the netCDF file
    pub file: PathBuf,

    /// Only describe this variable
    #[arg(long)]
    pub variable: Option<String>,
}

fn parse_clip_arg(s: &str) -> Result<(String, (usize, usize)), String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [dim, start, end] = parts.as_slice() else {
        return Err("Invalid format: Expected '<dimension>:<start>:<end>'".to_string());
    };
    if dim.is_empty() {
        return Err("Dimension name must not be empty".to_string());
    }
    let start = start
        .parse::<usize>()
        .map_err(|_| format!("Invalid start index for dimension '{}'", dim))?;
    let end = end
        .parse::<usize>()
        .map_err(|_| format!("Invalid end index for dimension '{}'", dim))?;
    if start >= end {
        return Err(format!(
            "Start index must be smaller than end index for dimension '{}'",
            dim
        ));
    }
    Ok((dim.to_string(), (start, end)))
}
