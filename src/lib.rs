//! earthgrid: gridded ocean currents and wind to `earth` JSON
//!
//! A batch converter that turns gridded vector data into the JSON layout read
//! by the `earth` global visualization. Ocean surface currents come from
//! netCDF files (OSCAR and similar model output), wind comes from the JSON
//! that `grib2json` produces for GFS forecasts.
//!
//! ## Pipeline
//!
//! Every input file is an independent job:
//!
//! 1. [`netcdf_io`] reads the U and V variables into [`field::Field`]s, one per
//!    time step, decoding the time axis with [`calendar`]
//! 2. [`regrid`] optionally interpolates onto a regular global grid
//! 3. [`normalize`] rounds values and turns missing data into `null`
//! 4. [`encode`] builds the headers and writes the output file atomically
//!
//! [`batch`] discovers input files, runs the jobs on a Rayon pool and rebuilds
//! the catalog of output files afterwards. [`wind`] is the shorter path for
//! grib2json records, which only need rounding and renaming.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use earthgrid::prelude::*;
//! use std::path::Path;
//!
//! let config = ConvertConfig::resolve(DatasetKind::OceanCurrents, &ConfigOverrides::default())?;
//! let regridder = Regridder::from_config(&config)?;
//! let inputs = discover_inputs(Path::new("oscar"), "*.nc")?;
//! let outcomes = run_batch(&inputs, &ParallelConfig::default(), |input| {
//!     convert_currents_file(input, Path::new("oscar_json"), &config, regridder.as_ref())
//! })?;
//! let report = finish_batch(outcomes, Path::new("oscar_json"), Path::new("catalog.json"))?;
//! println!("{} written, {} failed", report.written(), report.failed());
//! # Ok::<(), earthgrid::ConvertError>(())
//! ```

pub mod batch;
pub mod calendar;
pub mod config;
pub mod encode;
pub mod errors;
pub mod field;
pub mod metadata;
pub mod netcdf_io;
pub mod normalize;
pub mod parallel;
pub mod pipeline;
pub mod regrid;
pub mod wind;

pub use errors::{ConvertError, ErrorCategory, Result};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::batch::{discover_inputs, finish_batch, run_batch, BatchReport, JobOutcome};
    pub use crate::calendar::{Calendar, CivilTime, TimeDecoder, TimeUnit};
    pub use crate::config::{
        ConfigOverrides, ConvertConfig, DatasetKind, InterpolationMethod, Resolution,
    };
    pub use crate::encode::{encode_records, GridHeader, OutputRecord, OCEAN_CURRENTS};
    pub use crate::errors::{ConvertError, Result};
    pub use crate::field::Field;
    pub use crate::netcdf_io::SourceFile;
    pub use crate::parallel::ParallelConfig;
    pub use crate::pipeline::{convert_currents_file, JobStatus, SkipReason};
    pub use crate::regrid::Regridder;
    pub use crate::wind::convert_wind_file;
}
