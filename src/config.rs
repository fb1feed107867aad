//! Conversion configuration
//!
//! A run is configured by layering [`ConfigOverrides`] (from an optional JSON
//! file, then from command-line flags) onto per-dataset defaults. The merge is
//! a pure function and [`ConvertConfig::resolve`] validates the result once;
//! after that the configuration is immutable and shared by every job.

use crate::calendar::{Calendar, CivilTime, TimeDecoder, TimeUnit};
use crate::errors::{ConvertError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default nan sentinel, the netCDF default fill value for doubles.
pub const DEFAULT_NAN_VALUE: f64 = 9.969209968386869e36;

/// Kind of dataset being converted; selects header constants and file names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    OceanCurrents,
    Wind,
}

impl DatasetKind {
    /// Fixed part of the output file name, between stem and resolution label.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            DatasetKind::OceanCurrents => "surface-currents-oscar",
            DatasetKind::Wind => "surface-level-gfs",
        }
    }
}

/// Target grid of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawResolution")]
pub enum Resolution {
    /// Keep the source grid
    Native,
    /// Regrid onto a global grid with this step, in degrees
    Degrees(f64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResolution {
    Degrees(f64),
    Named(String),
}

impl TryFrom<RawResolution> for Resolution {
    type Error = String;

    fn try_from(raw: RawResolution) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawResolution::Degrees(r) => Ok(Resolution::Degrees(r)),
            RawResolution::Named(s) => s.parse(),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("native") {
            return Ok(Resolution::Native);
        }
        s.parse::<f64>()
            .map(Resolution::Degrees)
            .map_err(|_| format!("Invalid resolution '{}': expected 'native' or degrees", s))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Native => write!(f, "native"),
            Resolution::Degrees(r) => write!(f, "{}", format_degrees(*r)),
        }
    }
}

/// `1` -> `1.0`, `0.25` -> `0.25`
pub fn format_degrees(r: f64) -> String {
    if r.fract() == 0.0 {
        format!("{:.1}", r)
    } else {
        format!("{}", r)
    }
}

/// Interpolation used by the regridder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum InterpolationMethod {
    /// Barycentric interpolation over the triangulated source grid
    Linear,
    Nearest,
}

impl FromStr for InterpolationMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" | "bilinear" => Ok(InterpolationMethod::Linear),
            "nearest" => Ok(InterpolationMethod::Nearest),
            other => Err(format!("Unknown interpolation method '{}'", other)),
        }
    }
}

impl TryFrom<String> for InterpolationMethod {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// Partial configuration; every field left as `None` falls back to the layer below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub u_name: Option<String>,
    pub v_name: Option<String>,
    /// `false` converts the U component alone
    pub paired: Option<bool>,
    pub x_name: Option<String>,
    pub y_name: Option<String>,
    pub t_name: Option<String>,
    pub x_dim: Option<String>,
    pub y_dim: Option<String>,
    pub t_dim: Option<String>,
    pub calendar: Option<Calendar>,
    pub basedate: Option<String>,
    pub time_unit: Option<TimeUnit>,
    pub time_shift: Option<f64>,
    pub clip: Option<BTreeMap<String, (usize, usize)>>,
    pub nan_value: Option<f64>,
    pub extranan: Option<f64>,
    pub resolution: Option<Resolution>,
    pub method: Option<InterpolationMethod>,
    pub resolution_label: Option<String>,
    pub over_write: Option<bool>,
}

impl ConfigOverrides {
    /// Load overrides from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ConvertError::Config(format!("Cannot parse {}: {}", path.display(), e))
        })
    }

    /// Layer `other` on top of `self`; values set in `other` win.
    pub fn merge(self, other: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            u_name: other.u_name.or(self.u_name),
            v_name: other.v_name.or(self.v_name),
            paired: other.paired.or(self.paired),
            x_name: other.x_name.or(self.x_name),
            y_name: other.y_name.or(self.y_name),
            t_name: other.t_name.or(self.t_name),
            x_dim: other.x_dim.or(self.x_dim),
            y_dim: other.y_dim.or(self.y_dim),
            t_dim: other.t_dim.or(self.t_dim),
            calendar: other.calendar.or(self.calendar),
            basedate: other.basedate.or(self.basedate),
            time_unit: other.time_unit.or(self.time_unit),
            time_shift: other.time_shift.or(self.time_shift),
            clip: other.clip.or(self.clip),
            nan_value: other.nan_value.or(self.nan_value),
            extranan: other.extranan.or(self.extranan),
            resolution: other.resolution.or(self.resolution),
            method: other.method.or(self.method),
            resolution_label: other.resolution_label.or(self.resolution_label),
            over_write: other.over_write.or(self.over_write),
        }
    }
}

/// Fully resolved, validated configuration for one batch run
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub dataset: DatasetKind,
    pub u_name: String,
    pub v_name: Option<String>,
    pub x_name: String,
    pub y_name: String,
    pub t_name: String,
    /// Dimension names; `None` means "the dimension of the coordinate variable"
    pub x_dim: Option<String>,
    pub y_dim: Option<String>,
    pub t_dim: Option<String>,
    pub calendar: Calendar,
    pub basedate: CivilTime,
    pub time_unit: TimeUnit,
    pub time_shift: f64,
    /// Half-open index ranges keyed by dimension name
    pub clip: BTreeMap<String, (usize, usize)>,
    pub nan_value: f64,
    /// Interpolated magnitudes above this are treated as missing
    pub extranan: Option<f64>,
    pub resolution: Resolution,
    pub method: InterpolationMethod,
    pub resolution_label: String,
    pub over_write: bool,
}

impl ConvertConfig {
    /// Apply `overrides` to the defaults of `dataset` and validate the result.
    pub fn resolve(dataset: DatasetKind, overrides: &ConfigOverrides) -> Result<Self> {
        let o = overrides.clone();
        let resolution = o.resolution.unwrap_or(Resolution::Native);
        let resolution_label = match (o.resolution_label, resolution) {
            (Some(label), _) => label,
            (None, Resolution::Native) => "0.25".to_string(),
            (None, Resolution::Degrees(r)) => format_degrees(r),
        };
        let v_name = if o.paired.unwrap_or(true) {
            Some(o.v_name.unwrap_or_else(|| "v".to_string()))
        } else {
            None
        };
        let basedate = CivilTime::parse(o.basedate.as_deref().unwrap_or("1990-01-01 00:00:00"))?;

        let config = ConvertConfig {
            dataset,
            u_name: o.u_name.unwrap_or_else(|| "u".to_string()),
            v_name,
            x_name: o.x_name.unwrap_or_else(|| "lon".to_string()),
            y_name: o.y_name.unwrap_or_else(|| "lat".to_string()),
            t_name: o.t_name.unwrap_or_else(|| "time".to_string()),
            x_dim: o.x_dim,
            y_dim: o.y_dim,
            t_dim: o.t_dim,
            calendar: o.calendar.unwrap_or(Calendar::Standard),
            basedate,
            time_unit: o.time_unit.unwrap_or(TimeUnit::Days),
            time_shift: o.time_shift.unwrap_or(0.0),
            clip: o.clip.unwrap_or_default(),
            nan_value: o.nan_value.unwrap_or(DEFAULT_NAN_VALUE),
            extranan: o.extranan,
            resolution,
            method: o.method.unwrap_or(InterpolationMethod::Linear),
            resolution_label,
            over_write: o.over_write.unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let names = [&self.u_name, &self.x_name, &self.y_name, &self.t_name];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(ConvertError::Config("Variable names must not be empty".into()));
        }
        if self.v_name.as_deref() == Some(self.u_name.as_str()) {
            return Err(ConvertError::Config(format!(
                "U and V both refer to variable '{}'",
                self.u_name
            )));
        }
        for (dim, &(start, end)) in &self.clip {
            if start >= end {
                return Err(ConvertError::Config(format!(
                    "Invalid clip for dimension '{}': {}:{}",
                    dim, start, end
                )));
            }
        }
        if !self.nan_value.is_finite() {
            return Err(ConvertError::Config("nan value must be a finite number".into()));
        }
        if let Some(limit) = self.extranan {
            if limit.is_nan() || limit <= 0.0 {
                return Err(ConvertError::Config(format!(
                    "extranan must be positive, got {}",
                    limit
                )));
            }
        }
        if let Resolution::Degrees(r) = self.resolution {
            if !r.is_finite() || r <= 0.0 || r > 160.0 {
                return Err(ConvertError::Config(format!(
                    "Resolution must be in (0, 160] degrees, got {}",
                    r
                )));
            }
        }
        if self.resolution_label.contains(['/', '\\']) {
            return Err(ConvertError::Config(format!(
                "Resolution label '{}' is not a valid file name component",
                self.resolution_label
            )));
        }
        // Catches base dates that do not exist in the chosen calendar.
        self.time_decoder()?;
        Ok(())
    }

    pub fn time_decoder(&self) -> Result<TimeDecoder> {
        TimeDecoder::new(self.calendar, self.time_unit, self.basedate, self.time_shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConvertConfig::resolve(DatasetKind::OceanCurrents, &ConfigOverrides::default())
            .unwrap();
        assert_eq!(config.u_name, "u");
        assert_eq!(config.v_name.as_deref(), Some("v"));
        assert_eq!(config.x_name, "lon");
        assert_eq!(config.calendar, Calendar::Standard);
        assert_eq!(config.basedate, CivilTime::new(1990, 1, 1, 0, 0, 0));
        assert_eq!(config.nan_value, DEFAULT_NAN_VALUE);
        assert_eq!(config.resolution, Resolution::Native);
        assert_eq!(config.resolution_label, "0.25");
        assert!(!config.over_write);
        assert!(config.clip.is_empty());
    }

    #[test]
    fn test_merge_prefers_later_layer() {
        let file = ConfigOverrides {
            u_name: Some("uo".into()),
            calendar: Some(Calendar::NoLeap),
            ..Default::default()
        };
        let cli = ConfigOverrides {
            u_name: Some("ug".into()),
            ..Default::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.u_name.as_deref(), Some("ug"));
        assert_eq!(merged.calendar, Some(Calendar::NoLeap));
    }

    #[test]
    fn test_json_overrides() {
        let o: ConfigOverrides = serde_json::from_str(
            r#"{"calendar": "365_day", "clip": {"depth": [0, 1]}, "resolution": 1, "method": "nearest"}"#,
        )
        .unwrap();
        assert_eq!(o.calendar, Some(Calendar::NoLeap));
        assert_eq!(o.clip.unwrap()["depth"], (0, 1));
        assert_eq!(o.resolution, Some(Resolution::Degrees(1.0)));
        assert_eq!(o.method, Some(InterpolationMethod::Nearest));

        let o: ConfigOverrides = serde_json::from_str(r#"{"resolution": "native"}"#).unwrap();
        assert_eq!(o.resolution, Some(Resolution::Native));

        assert!(serde_json::from_str::<ConfigOverrides>(r#"{"unknown": 1}"#).is_err());
    }

    #[test]
    fn test_regridded_label_follows_resolution() {
        let o = ConfigOverrides {
            resolution: Some(Resolution::Degrees(1.0)),
            ..Default::default()
        };
        let config = ConvertConfig::resolve(DatasetKind::OceanCurrents, &o).unwrap();
        assert_eq!(config.resolution_label, "1.0");
    }

    #[test]
    fn test_unpaired() {
        let o = ConfigOverrides {
            paired: Some(false),
            ..Default::default()
        };
        let config = ConvertConfig::resolve(DatasetKind::OceanCurrents, &o).unwrap();
        assert!(config.v_name.is_none());
    }

    #[test]
    fn test_validation_failures() {
        let bad = [
            ConfigOverrides {
                resolution: Some(Resolution::Degrees(0.0)),
                ..Default::default()
            },
            ConfigOverrides {
                clip: Some(BTreeMap::from([("time".to_string(), (2, 1))])),
                ..Default::default()
            },
            ConfigOverrides {
                v_name: Some("u".into()),
                ..Default::default()
            },
            ConfigOverrides {
                calendar: Some(Calendar::NoLeap),
                basedate: Some("2000-02-29".into()),
                ..Default::default()
            },
            ConfigOverrides {
                extranan: Some(-1.0),
                ..Default::default()
            },
        ];
        for overrides in &bad {
            let err = ConvertConfig::resolve(DatasetKind::OceanCurrents, overrides).unwrap_err();
            assert!(matches!(err, ConvertError::Config(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("native".parse::<Resolution>().unwrap(), Resolution::Native);
        assert_eq!("0.5".parse::<Resolution>().unwrap(), Resolution::Degrees(0.5));
        assert!("fine".parse::<Resolution>().is_err());
        assert_eq!(format_degrees(2.0), "2.0");
        assert_eq!(format_degrees(0.25), "0.25");
    }
}
