//! Single-file conversion: read, regrid, normalize, encode

use crate::calendar::CivilTime;
use crate::config::ConvertConfig;
use crate::encode::{encode_records, output_file_name, write_records, OCEAN_CURRENTS};
use crate::errors::{ConvertError, Result};
use crate::field::Field;
use crate::netcdf_io::SourceFile;
use crate::regrid::Regridder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of a job that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Output files created or replaced by this job
    Written(Vec<PathBuf>),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Every output already exists and overwriting is disabled
    OutputExists,
}

/// Output paths for each time step of `input`, in step order.
pub fn planned_outputs(
    input: &Path,
    output_dir: &Path,
    config: &ConvertConfig,
    steps: &[CivilTime],
) -> Result<Vec<PathBuf>> {
    let label = &config.resolution_label;
    if steps.len() == 1 {
        let name = output_file_name(input, config.dataset, label, None)?;
        return Ok(vec![output_dir.join(name)]);
    }
    let outputs = steps
        .iter()
        .map(|t| {
            output_file_name(input, config.dataset, label, Some(t)).map(|name| output_dir.join(name))
        })
        .collect::<Result<Vec<_>>>()?;
    let mut seen = HashSet::new();
    if let Some(dup) = outputs.iter().find(|p| !seen.insert(*p)) {
        return Err(ConvertError::SourceRead(format!(
            "{} has several time steps mapping to {}",
            input.display(),
            dup.display()
        )));
    }
    Ok(outputs)
}

/// Convert one netCDF file into one output file per selected time step.
pub fn convert_currents_file(
    input: &Path,
    output_dir: &Path,
    config: &ConvertConfig,
    regridder: Option<&Regridder>,
) -> Result<JobStatus> {
    let source = SourceFile::open(input)?;
    let steps = source.time_steps(config)?;
    if steps.is_empty() {
        return Err(ConvertError::SourceRead(format!(
            "{} has no time steps left after clipping",
            input.display()
        )));
    }
    let outputs = planned_outputs(input, output_dir, config, &steps)?;
    if !config.over_write && outputs.iter().all(|p| p.is_file()) {
        debug!(input = %input.display(), "All outputs exist, skipping");
        return Ok(JobStatus::Skipped(SkipReason::OutputExists));
    }

    let u = source.read_fields(&config.u_name, config)?;
    let v = match &config.v_name {
        Some(name) => Some(source.read_fields(name, config)?),
        None => None,
    };
    let (u, v) = match regridder {
        Some(r) => (
            regrid_all(r, &u)?,
            v.map(|fields| regrid_all(r, &fields)).transpose()?,
        ),
        None => (u, v),
    };

    let mut written = Vec::new();
    for (step, (u_field, out_path)) in u.iter().zip(&outputs).enumerate() {
        if !config.over_write && out_path.is_file() {
            debug!(output = %out_path.display(), "Output exists, skipping step");
            continue;
        }
        let v_field = v.as_ref().and_then(|fields| fields.get(step));
        let records = encode_records(&OCEAN_CURRENTS, u_field, v_field, config.nan_value)?;
        write_records(out_path, &records)?;
        written.push(out_path.clone());
    }

    info!(
        input = %input.display(),
        steps = steps.len(),
        written = written.len(),
        "Converted file"
    );
    Ok(JobStatus::Written(written))
}

fn regrid_all(regridder: &Regridder, fields: &[Field]) -> Result<Vec<Field>> {
    fields.iter().map(|f| regridder.regrid(f)).collect()
}
