//! Output records in the `earth` JSON layout
//!
//! A converted file is a JSON array of one or two records (U, then V). Each
//! record pairs a GRIB-style header with the flattened data, north row first.
//! Files are written to a temporary sibling and renamed into place once
//! serialization succeeded, so a failed job never leaves a partial file.

use crate::calendar::CivilTime;
use crate::config::DatasetKind;
use crate::errors::{ConvertError, Result};
use crate::field::Field;
use crate::normalize::normalize_field;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Vector component a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    U,
    V,
}

/// Header constants describing a dataset class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderTemplate {
    pub discipline: i32,
    pub discipline_name: &'static str,
    pub center: i32,
    pub center_name: &'static str,
    pub significance_of_rt: i32,
    pub significance_of_rt_name: &'static str,
    pub parameter_category: i32,
    pub parameter_category_name: &'static str,
    pub u_parameter: (i32, &'static str),
    pub v_parameter: (i32, &'static str),
    pub parameter_unit: &'static str,
    pub surface1_type: i32,
    pub surface1_type_name: &'static str,
    pub surface1_value: f64,
    pub shape: i32,
    pub shape_name: &'static str,
}

/// Headers of the OSCAR-style surface current output
pub const OCEAN_CURRENTS: HeaderTemplate = HeaderTemplate {
    discipline: 10,
    discipline_name: "Oceanographic_products",
    center: -3,
    center_name: "Plymouth Marine Laboratory",
    significance_of_rt: 0,
    significance_of_rt_name: "Analysis",
    parameter_category: 1,
    parameter_category_name: "Currents",
    u_parameter: (2, "U_component_of_current"),
    v_parameter: (3, "V_component_of_current"),
    parameter_unit: "m.s-1",
    surface1_type: 160,
    surface1_type_name: "Depth below sea level",
    surface1_value: 15.0,
    shape: 0,
    shape_name: "Earth spherical with radius = 6,367,470 m",
};

/// Grid and parameter metadata of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridHeader {
    pub discipline: i32,
    pub discipline_name: String,
    pub center: i32,
    pub center_name: String,
    #[serde(rename = "significanceOfRT")]
    pub significance_of_rt: i32,
    #[serde(rename = "significanceOfRTName")]
    pub significance_of_rt_name: String,
    pub parameter_category: i32,
    pub parameter_category_name: String,
    pub parameter_number: i32,
    pub parameter_number_name: String,
    pub parameter_unit: String,
    pub forecast_time: i32,
    #[serde(rename = "surface1Type")]
    pub surface1_type: i32,
    #[serde(rename = "surface1TypeName")]
    pub surface1_type_name: String,
    #[serde(rename = "surface1Value")]
    pub surface1_value: f64,
    pub number_points: usize,
    pub shape: i32,
    pub shape_name: String,
    pub scan_mode: i32,
    pub nx: usize,
    pub ny: usize,
    pub lo1: f64,
    pub la1: f64,
    pub lo2: f64,
    pub la2: f64,
    pub dx: f64,
    pub dy: f64,
    pub ref_time: String,
}

impl GridHeader {
    pub fn new(template: &HeaderTemplate, component: Component, field: &Field) -> Self {
        let (parameter_number, parameter_number_name) = match component {
            Component::U => template.u_parameter,
            Component::V => template.v_parameter,
        };
        let bbox = field.bounding_box();
        Self {
            discipline: template.discipline,
            discipline_name: template.discipline_name.to_string(),
            center: template.center,
            center_name: template.center_name.to_string(),
            significance_of_rt: template.significance_of_rt,
            significance_of_rt_name: template.significance_of_rt_name.to_string(),
            parameter_category: template.parameter_category,
            parameter_category_name: template.parameter_category_name.to_string(),
            parameter_number,
            parameter_number_name: parameter_number_name.to_string(),
            parameter_unit: template.parameter_unit.to_string(),
            forecast_time: 0,
            surface1_type: template.surface1_type,
            surface1_type_name: template.surface1_type_name.to_string(),
            surface1_value: template.surface1_value,
            number_points: field.nx() * field.ny(),
            shape: template.shape,
            shape_name: template.shape_name.to_string(),
            scan_mode: 0,
            nx: field.nx(),
            ny: field.ny(),
            lo1: bbox.lo1,
            la1: bbox.la1,
            lo2: bbox.lo2,
            la2: bbox.la2,
            dx: field.dx,
            dy: field.dy,
            ref_time: field.time.ref_time(),
        }
    }
}

/// One element of an output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub header: GridHeader,
    pub data: Vec<Option<f64>>,
}

impl OutputRecord {
    pub fn from_field(
        template: &HeaderTemplate,
        component: Component,
        field: &Field,
        nan_value: f64,
    ) -> Self {
        Self {
            header: GridHeader::new(template, component, field),
            data: normalize_field(field, nan_value),
        }
    }
}

/// Records for a U field and an optional V field on the same grid.
pub fn encode_records(
    template: &HeaderTemplate,
    u: &Field,
    v: Option<&Field>,
    nan_value: f64,
) -> Result<Vec<OutputRecord>> {
    let mut records = vec![OutputRecord::from_field(template, Component::U, u, nan_value)];
    if let Some(v) = v {
        if !u.same_grid(v) {
            return Err(ConvertError::SourceRead(format!(
                "'{}' and '{}' are not on the same grid",
                u.name, v.name
            )));
        }
        records.push(OutputRecord::from_field(template, Component::V, v, nan_value));
    }
    Ok(records)
}

/// Serialize `records` to `path`, replacing it atomically.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let bytes = serde_json::to_vec(records).map_err(|e| ConvertError::encode(path, e))?;
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote output");
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| ConvertError::encode(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ConvertError::encode(path, e)
    })
}

/// Last `_`-separated token of the file stem, e.g. the date of
/// `oscar_currents_interim_20210101.nc`.
pub fn input_stem_token(input: &Path) -> Result<String> {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('_').next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ConvertError::SourceRead(format!("Cannot derive an output name from {}", input.display()))
        })
}

/// `<stem>[-<step>]-<suffix>-<label>.json`
pub fn output_file_name(
    input: &Path,
    dataset: DatasetKind,
    label: &str,
    step: Option<&CivilTime>,
) -> Result<String> {
    let stem = input_stem_token(input)?;
    Ok(match step {
        Some(t) => format!("{}-{}-{}-{}.json", stem, t.compact(), dataset.file_suffix(), label),
        None => format!("{}-{}-{}.json", stem, dataset.file_suffix(), label),
    })
}

/// Rewrite the catalog: a sorted JSON array of the output files in `output_dir`.
pub fn write_catalog(output_dir: &Path, catalog_path: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(output_dir).map_err(|e| ConvertError::encode(output_dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConvertError::encode(output_dir, e))?;
        let path = entry.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        if fs::canonicalize(&path).ok() == fs::canonicalize(catalog_path).ok() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();

    let bytes = serde_json::to_vec(&names).map_err(|e| ConvertError::encode(catalog_path, e))?;
    write_atomic(catalog_path, &bytes)?;
    info!(catalog = %catalog_path.display(), entries = names.len(), "Wrote catalog");
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NAN_VALUE;
    use ndarray::array;
    use tempfile::tempdir;

    fn field(name: &str, time: CivilTime) -> Field {
        Field {
            name: name.into(),
            x: vec![0.0, 0.25, 0.5],
            y: vec![10.25, 10.0],
            data: array![[0.123, DEFAULT_NAN_VALUE, 1.0], [2.0, 3.019, -4.5]],
            dx: 0.25,
            dy: 0.25,
            time,
        }
    }

    #[test]
    fn test_header_fields() {
        let f = field("u", CivilTime::new(2021, 1, 1, 0, 0, 0));
        let records = encode_records(&OCEAN_CURRENTS, &f, None, DEFAULT_NAN_VALUE).unwrap();
        assert_eq!(records.len(), 1);
        let h = &records[0].header;
        assert_eq!((h.nx, h.ny, h.number_points), (3, 2, 6));
        assert_eq!((h.lo1, h.la1, h.lo2, h.la2), (0.0, 10.25, 0.5, 10.0));
        assert_eq!(h.ref_time, "2021-01-01T00:00:00.000Z");
        assert_eq!(h.parameter_number_name, "U_component_of_current");
        assert_eq!(
            records[0].data,
            vec![Some(0.12), None, Some(1.0), Some(2.0), Some(3.02), Some(-4.5)]
        );
    }

    #[test]
    fn test_v_header_differs_only_in_parameter_and_time() {
        let u = field("u", CivilTime::new(2021, 1, 1, 0, 0, 0));
        let v = field("v", CivilTime::new(2021, 1, 2, 0, 0, 0));
        let records = encode_records(&OCEAN_CURRENTS, &u, Some(&v), DEFAULT_NAN_VALUE).unwrap();
        assert_eq!(records.len(), 2);
        let mut expected = records[0].header.clone();
        expected.parameter_number = 3;
        expected.parameter_number_name = "V_component_of_current".into();
        expected.ref_time = "2021-01-02T00:00:00.000Z".into();
        assert_eq!(records[1].header, expected);
    }

    #[test]
    fn test_mismatched_grids_rejected() {
        let u = field("u", CivilTime::new(2021, 1, 1, 0, 0, 0));
        let mut v = u.clone();
        v.x[0] = 359.75;
        assert!(encode_records(&OCEAN_CURRENTS, &u, Some(&v), DEFAULT_NAN_VALUE).is_err());
    }

    #[test]
    fn test_header_json_keys() {
        let f = field("u", CivilTime::new(2021, 1, 1, 0, 0, 0));
        let record = OutputRecord::from_field(
            &OCEAN_CURRENTS,
            Component::U,
            &f,
            DEFAULT_NAN_VALUE,
        );
        let json = serde_json::to_value(&record).unwrap();
        let header = json["header"].as_object().unwrap();
        for key in [
            "discipline",
            "disciplineName",
            "parameterCategory",
            "parameterNumber",
            "parameterNumberName",
            "parameterUnit",
            "numberPoints",
            "significanceOfRT",
            "surface1Type",
            "nx",
            "ny",
            "lo1",
            "la1",
            "lo2",
            "la2",
            "dx",
            "dy",
            "refTime",
        ] {
            assert!(header.contains_key(key), "missing {}", key);
        }
        assert!(json["data"][1].is_null());
    }

    #[test]
    fn test_output_names() {
        let input = Path::new("/data/oscar_currents_interim_20210101.nc");
        assert_eq!(
            output_file_name(input, DatasetKind::OceanCurrents, "0.25", None).unwrap(),
            "20210101-surface-currents-oscar-0.25.json"
        );
        let step = CivilTime::new(2021, 1, 1, 6, 0, 0);
        assert_eq!(
            output_file_name(input, DatasetKind::OceanCurrents, "1.0", Some(&step)).unwrap(),
            "20210101-20210101060000-surface-currents-oscar-1.0.json"
        );
        assert_eq!(input_stem_token(Path::new("plain.nc")).unwrap(), "plain");
        assert!(input_stem_token(Path::new("trailing_.nc")).is_err());
    }

    #[test]
    fn test_catalog_is_sorted_snapshot() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        for name in ["b.json", "a.json", "notes.txt"] {
            fs::write(out.join(name), "[]").unwrap();
        }
        let catalog = dir.path().join("catalog.json");
        fs::write(&catalog, "stale").unwrap();

        let names = write_catalog(&out, &catalog).unwrap();
        assert_eq!(names, vec!["a.json", "b.json"]);
        let written: Vec<String> =
            serde_json::from_str(&fs::read_to_string(&catalog).unwrap()).unwrap();
        assert_eq!(written, names);
    }
}
