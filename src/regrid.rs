//! Resampling of fields onto a uniform global lon/lat grid
//!
//! The target grid spans longitude `[0, 360)` and latitude `[-80, 80]` at a
//! fixed step. Linear mode splits every source grid cell along its diagonal
//! and interpolates barycentrically inside the containing triangle, which is
//! linear scattered-data interpolation over that triangulation: targets
//! outside the source hull, or whose triangle touches a missing sample, get
//! no value. Target rows are interpolated in parallel.

use crate::config::{ConvertConfig, InterpolationMethod, Resolution};
use crate::errors::{ConvertError, Result};
use crate::field::Field;
use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

const LAT_MIN: f64 = -80.0;
const LAT_SPAN: f64 = 160.0;
const EPS: f64 = 1e-9;

/// Uniform global target grid, north-up
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    pub resolution: f64,
    /// `0, r, 2r, ...` below 360
    pub lon: Vec<f64>,
    /// Largest latitude first
    pub lat: Vec<f64>,
}

impl TargetGrid {
    pub fn global(resolution: f64) -> Result<Self> {
        if !resolution.is_finite() || resolution <= 0.0 || resolution > LAT_SPAN {
            return Err(ConvertError::Interpolation(format!(
                "Resolution {} is outside (0, 160]",
                resolution
            )));
        }
        let nx = (360.0 / resolution - EPS).ceil() as usize;
        let ny = (LAT_SPAN / resolution + EPS).floor() as usize + 1;
        let lon = (0..nx).map(|i| i as f64 * resolution).collect();
        let lat = (0..ny)
            .rev()
            .map(|j| LAT_MIN + j as f64 * resolution)
            .collect();
        Ok(Self {
            resolution,
            lon,
            lat,
        })
    }

    pub fn nx(&self) -> usize {
        self.lon.len()
    }

    pub fn ny(&self) -> usize {
        self.lat.len()
    }
}

/// Source samples sorted along both axes
struct SourceGrid<'a> {
    field: &'a Field,
    nan_value: f64,
    /// (coordinate, column in `field.data`), ascending
    xs: Vec<(f64, usize)>,
    /// (coordinate, row in `field.data`), ascending
    ys: Vec<(f64, usize)>,
}

impl<'a> SourceGrid<'a> {
    fn new(field: &'a Field, nan_value: f64) -> Result<Self> {
        Ok(Self {
            field,
            nan_value,
            xs: sorted_axis(&field.x, "longitude")?,
            ys: sorted_axis(&field.y, "latitude")?,
        })
    }

    fn sample(&self, xi: usize, yi: usize) -> Option<f64> {
        let v = self.field.data[[self.ys[yi].1, self.xs[xi].1]];
        (v.is_finite() && v != self.nan_value).then_some(v)
    }

    fn linear(&self, px: f64, py: f64) -> Option<f64> {
        let (i, u) = locate(&self.xs, px)?;
        let (j, v) = locate(&self.ys, py)?;
        let f00 = self.sample(i, j)?;
        let f11 = self.sample(i + 1, j + 1)?;
        if u >= v {
            let f10 = self.sample(i + 1, j)?;
            Some((1.0 - u) * f00 + (u - v) * f10 + v * f11)
        } else {
            let f01 = self.sample(i, j + 1)?;
            Some((1.0 - v) * f00 + (v - u) * f01 + u * f11)
        }
    }

    fn nearest(&self, px: f64, py: f64) -> Option<f64> {
        // Squared distance on a rectilinear grid separates per axis.
        let i = nearest_index(&self.xs, px);
        let j = nearest_index(&self.ys, py);
        self.sample(i, j)
    }
}

fn sorted_axis(values: &[f64], label: &str) -> Result<Vec<(f64, usize)>> {
    if values.len() < 2 {
        return Err(ConvertError::Interpolation(format!(
            "Need at least 2 {} samples, found {}",
            label,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ConvertError::Interpolation(format!(
            "Non-finite {} coordinate",
            label
        )));
    }
    let mut axis: Vec<(f64, usize)> = values.iter().copied().zip(0..).collect();
    axis.sort_by(|a, b| a.0.total_cmp(&b.0));
    if axis.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(ConvertError::Interpolation(format!(
            "Duplicate {} coordinates",
            label
        )));
    }
    Ok(axis)
}

/// Cell index and fractional position of `p`, or `None` outside the axis.
fn locate(axis: &[(f64, usize)], p: f64) -> Option<(usize, f64)> {
    let (first, last) = (axis[0].0, axis[axis.len() - 1].0);
    if p < first || p > last {
        return None;
    }
    let upper = axis.partition_point(|&(c, _)| c <= p);
    let i = upper.saturating_sub(1).min(axis.len() - 2);
    let (c0, c1) = (axis[i].0, axis[i + 1].0);
    Some((i, (p - c0) / (c1 - c0)))
}

fn nearest_index(axis: &[(f64, usize)], p: f64) -> usize {
    let upper = axis.partition_point(|&(c, _)| c < p);
    if upper == 0 {
        return 0;
    }
    if upper == axis.len() {
        return axis.len() - 1;
    }
    if (p - axis[upper - 1].0) <= (axis[upper].0 - p) {
        upper - 1
    } else {
        upper
    }
}

/// Resamples fields onto a [`TargetGrid`]
#[derive(Debug, Clone)]
pub struct Regridder {
    grid: TargetGrid,
    method: InterpolationMethod,
    nan_value: f64,
    extranan: Option<f64>,
}

impl Regridder {
    pub fn new(
        resolution: f64,
        method: InterpolationMethod,
        nan_value: f64,
        extranan: Option<f64>,
    ) -> Result<Self> {
        Ok(Self {
            grid: TargetGrid::global(resolution)?,
            method,
            nan_value,
            extranan,
        })
    }

    /// `None` when the configuration asks for native-resolution output.
    pub fn from_config(config: &ConvertConfig) -> Result<Option<Self>> {
        match config.resolution {
            Resolution::Native => Ok(None),
            Resolution::Degrees(r) => {
                Regridder::new(r, config.method, config.nan_value, config.extranan).map(Some)
            }
        }
    }

    pub fn grid(&self) -> &TargetGrid {
        &self.grid
    }

    pub fn regrid(&self, field: &Field) -> Result<Field> {
        let source = SourceGrid::new(field, self.nan_value)?;
        let (nx, ny) = (self.grid.nx(), self.grid.ny());
        debug!(
            variable = %field.name,
            from = ?field.data.dim(),
            to = ?(ny, nx),
            method = ?self.method,
            "Regridding field"
        );

        let values: Vec<f64> = self
            .grid
            .lat
            .par_iter()
            .flat_map_iter(|&lat| {
                let source = &source;
                self.grid.lon.iter().map(move |&lon| {
                    let value = match self.method {
                        InterpolationMethod::Linear => source.linear(lon, lat),
                        InterpolationMethod::Nearest => source.nearest(lon, lat),
                    };
                    self.clean(value)
                })
            })
            .collect();

        Ok(Field {
            name: field.name.clone(),
            x: self.grid.lon.clone(),
            y: self.grid.lat.clone(),
            data: Array2::from_shape_vec((ny, nx), values)?,
            dx: self.grid.resolution,
            dy: self.grid.resolution,
            time: field.time,
        })
    }

    fn clean(&self, value: Option<f64>) -> f64 {
        match value {
            Some(v) if v.is_nan() => self.nan_value,
            Some(v) if self.extranan.map_or(false, |limit| v.abs() > limit) => self.nan_value,
            Some(v) => v,
            None => self.nan_value,
        }
    }
}
