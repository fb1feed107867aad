//! NetCDF reading: variable extraction, clipping and orientation
//!
//! This module turns one variable of a netCDF file into [`Field`]s, one per
//! time step left after clipping. Data is unpacked (`scale_factor`,
//! `add_offset`), fill values become the configured nan sentinel, the grid
//! is transposed to `(y, x)` and flipped so row 0 is the northernmost
//! latitude.

use crate::calendar::CivilTime;
use crate::config::ConvertConfig;
use crate::errors::{ConvertError, Result};
use crate::field::{normalize_longitudes, Field};
use ndarray::{s, Array3, ArrayD, Axis, IxDyn};
use netcdf::{AttributeValue, File, Variable};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An open netCDF source file
pub struct SourceFile {
    path: PathBuf,
    file: File,
}

/// Where the x, y and time axes sit in a variable's dimension list
struct AxisLayout {
    names: Vec<String>,
    ranges: Vec<Range<usize>>,
    x: usize,
    y: usize,
    t: Option<usize>,
}

impl SourceFile {
    /// Open a netCDF file for reading.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConvertError::SourceRead(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let file = netcdf::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn variable(&self, name: &str) -> Result<Variable<'_>> {
        self.file
            .variable(name)
            .ok_or_else(|| ConvertError::VariableNotFound {
                var: name.to_string(),
            })
    }

    /// Decoded timestamps of the time steps selected by the configuration.
    pub fn time_steps(&self, config: &ConvertConfig) -> Result<Vec<CivilTime>> {
        let t_var = self.variable(&config.t_name)?;
        let t_dim = coordinate_dimension(&t_var, config.t_dim.as_deref())?;
        let len = self.dimension_len(&t_dim)?;
        let range = clip_range(config, &t_dim, len)?;
        let raw = read_coordinate(&t_var, len)?;
        config.time_decoder()?.decode_all(&raw[range])
    }

    /// Read variable `var_name` as one field per selected time step.
    pub fn read_fields(&self, var_name: &str, config: &ConvertConfig) -> Result<Vec<Field>> {
        let var = self.variable(var_name)?;
        let x_var = self.variable(&config.x_name)?;
        let y_var = self.variable(&config.y_name)?;
        let x_dim = coordinate_dimension(&x_var, config.x_dim.as_deref())?;
        let y_dim = coordinate_dimension(&y_var, config.y_dim.as_deref())?;
        let t_var = self.variable(&config.t_name)?;
        let t_dim = coordinate_dimension(&t_var, config.t_dim.as_deref())?;

        let layout = axis_layout(&var, config, &x_dim, &y_dim, &t_dim)?;
        debug!(
            file = %self.path.display(),
            variable = var_name,
            dims = ?layout.names,
            ranges = ?layout.ranges,
            "Reading variable"
        );

        let mut x = read_coordinate(&x_var, self.dimension_len(&x_dim)?)?
            [layout.ranges[layout.x].clone()]
        .to_vec();
        let mut y = read_coordinate(&y_var, self.dimension_len(&y_dim)?)?
            [layout.ranges[layout.y].clone()]
        .to_vec();
        normalize_longitudes(&mut x);

        let times = self.time_steps(config)?;
        let steps = match layout.t {
            Some(t) => layout.ranges[t].len(),
            None => 1,
        };
        if times.len() != steps {
            return Err(ConvertError::SourceRead(format!(
                "Variable '{}' has {} time steps but the time axis decodes to {}",
                var_name,
                steps,
                times.len()
            )));
        }

        let cube = read_cube(&var, &layout, config.nan_value)?;

        // Stored south-up grids are flipped so row 0 is the northernmost latitude.
        let flip = y.len() > 1 && y[0] < y[y.len() - 1];
        if flip {
            y.reverse();
        }
        let dx = axis_spacing(&x, true);
        let dy = axis_spacing(&y, false);

        let fields = times
            .into_iter()
            .enumerate()
            .map(|(step, time)| {
                let grid = cube.index_axis(Axis(0), step);
                let data = if flip {
                    grid.slice(s![..;-1, ..]).to_owned()
                } else {
                    grid.to_owned()
                };
                Field {
                    name: var_name.to_string(),
                    x: x.clone(),
                    y: y.clone(),
                    data,
                    dx,
                    dy,
                    time,
                }
            })
            .collect();
        Ok(fields)
    }

    fn dimension_len(&self, name: &str) -> Result<usize> {
        self.file
            .dimension(name)
            .map(|d| d.len())
            .ok_or_else(|| ConvertError::SourceRead(format!("Dimension '{}' not found", name)))
    }
}

/// The dimension a 1-D coordinate variable runs along, unless overridden.
fn coordinate_dimension(var: &Variable, configured: Option<&str>) -> Result<String> {
    if let Some(dim) = configured {
        return Ok(dim.to_string());
    }
    match var.dimensions() {
        [dim] => Ok(dim.name().to_string()),
        dims => Err(ConvertError::SourceRead(format!(
            "Coordinate variable '{}' must be 1-D, found {} dimensions",
            var.name(),
            dims.len()
        ))),
    }
}

fn read_coordinate(var: &Variable, expected: usize) -> Result<Vec<f64>> {
    let values: Vec<f64> = var.get_values::<f64, _>(..)?;
    if values.len() != expected {
        return Err(ConvertError::SourceRead(format!(
            "Coordinate variable '{}' has {} values, its dimension has {}",
            var.name(),
            values.len(),
            expected
        )));
    }
    Ok(values)
}

fn clip_range(config: &ConvertConfig, dim: &str, len: usize) -> Result<Range<usize>> {
    match config.clip.get(dim) {
        Some(&(start, end)) => {
            if start >= len || end > len || start >= end {
                return Err(ConvertError::SourceRead(format!(
                    "Invalid clip range for dimension '{}': {}:{} (dimension size: {})",
                    dim, start, end, len
                )));
            }
            Ok(start..end)
        }
        None => Ok(0..len),
    }
}

fn axis_layout(
    var: &Variable,
    config: &ConvertConfig,
    x_dim: &str,
    y_dim: &str,
    t_dim: &str,
) -> Result<AxisLayout> {
    let names: Vec<String> = var
        .dimensions()
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    let position = |dim: &str| -> Result<usize> {
        names
            .iter()
            .position(|n| n == dim)
            .ok_or_else(|| ConvertError::DimensionNotFound {
                var: var.name().to_string(),
                dim: dim.to_string(),
            })
    };
    let x = position(x_dim)?;
    let y = position(y_dim)?;
    let t = names.iter().position(|n| n == t_dim);

    let mut ranges = Vec::with_capacity(names.len());
    for (idx, dim) in var.dimensions().iter().enumerate() {
        let range = clip_range(config, &names[idx], dim.len())?;
        if idx != x && idx != y && Some(idx) != t && range.len() != 1 {
            return Err(ConvertError::SourceRead(format!(
                "Dimension '{}' of '{}' selects {} entries; clip it to a single index",
                names[idx],
                var.name(),
                range.len()
            )));
        }
        ranges.push(range);
    }

    Ok(AxisLayout {
        names,
        ranges,
        x,
        y,
        t,
    })
}

/// Read the clipped hyperslab and reorder it to `(time, y, x)`.
fn read_cube(var: &Variable, layout: &AxisLayout, nan_value: f64) -> Result<Array3<f64>> {
    let r = &layout.ranges;
    let raw: Vec<f64> = match r.len() {
        2 => var.get_values::<f64, _>((r[0].clone(), r[1].clone()))?,
        3 => var.get_values::<f64, _>((r[0].clone(), r[1].clone(), r[2].clone()))?,
        4 => var.get_values::<f64, _>((
            r[0].clone(),
            r[1].clone(),
            r[2].clone(),
            r[3].clone(),
        ))?,
        n => {
            return Err(ConvertError::SourceRead(format!(
                "Variable '{}' has {} dimensions; 2 to 4 are supported",
                var.name(),
                n
            )))
        }
    };

    let unpacked = unpack(var, raw, nan_value);
    let shape: Vec<usize> = r.iter().map(|range| range.len()).collect();
    let array = ArrayD::from_shape_vec(IxDyn(&shape), unpacked)?;

    let mut order: Vec<usize> = layout.t.into_iter().collect();
    order.push(layout.y);
    order.push(layout.x);
    let rest: Vec<usize> = (0..shape.len()).filter(|i| !order.contains(i)).collect();
    order.extend(rest);

    let nt = layout.t.map_or(1, |t| shape[t]);
    let (ny, nx) = (shape[layout.y], shape[layout.x]);
    let cube = array
        .permuted_axes(IxDyn(&order))
        .as_standard_layout()
        .into_owned()
        .into_shape((nt, ny, nx))?;
    Ok(cube)
}

/// Apply packing attributes and replace fill values with the sentinel.
fn unpack(var: &Variable, raw: Vec<f64>, nan_value: f64) -> Vec<f64> {
    let fills: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| numeric_attribute(var, name))
        .collect();
    let scale = numeric_attribute(var, "scale_factor").unwrap_or(1.0);
    let offset = numeric_attribute(var, "add_offset").unwrap_or(0.0);

    raw.into_iter()
        .map(|v| {
            if v.is_nan() || fills.contains(&v) {
                nan_value
            } else {
                v * scale + offset
            }
        })
        .collect()
}

fn numeric_attribute(var: &Variable, name: &str) -> Option<f64> {
    let value = var.attribute(name)?.value().ok()?;
    match value {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Uint(v) => Some(f64::from(v)),
        _ => None,
    }
}

/// Spacing between the first two samples; longitudes wrap at 360.
fn axis_spacing(axis: &[f64], periodic: bool) -> f64 {
    match axis {
        [a, b, ..] if periodic => (b - a).rem_euclid(360.0),
        [a, b, ..] => (b - a).abs(),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_spacing() {
        assert_eq!(axis_spacing(&[350.0, 0.0, 10.0], true), 10.0);
        assert_eq!(axis_spacing(&[0.25, 0.5], true), 0.25);
        assert_eq!(axis_spacing(&[80.0, 79.75], false), 0.25);
        assert_eq!(axis_spacing(&[5.0], false), 0.0);
    }
}
