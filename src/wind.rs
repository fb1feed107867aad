//! Post-processing of grib2json output for GFS wind
//!
//! The external `grib2json` tool turns a GFS GRIB2 file into a JSON array of
//! records that is already close to the `earth` layout. This module only
//! rounds the data to the output precision and gives the file a name that
//! encodes both the forecast date and cycle hour.

use crate::config::{ConvertConfig, DatasetKind};
use crate::encode::write_records;
use crate::errors::{ConvertError, Result};
use crate::normalize::round_nullable;
use crate::pipeline::{JobStatus, SkipReason};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One grib2json record; the header is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateRecord {
    pub header: Map<String, Value>,
    pub data: Vec<Option<f64>>,
}

/// Parse a grib2json file holding one or two records.
pub fn read_intermediate(path: &Path) -> Result<Vec<IntermediateRecord>> {
    if !path.is_file() {
        return Err(ConvertError::SourceRead(format!(
            "{} does not exist",
            path.display()
        )));
    }
    let text = fs::read_to_string(path)
        .map_err(|e| ConvertError::SourceRead(format!("Cannot read {}: {}", path.display(), e)))?;
    parse_intermediate(&text)
        .map_err(|msg| ConvertError::SourceRead(format!("{}: {}", path.display(), msg)))
}

fn parse_intermediate(text: &str) -> std::result::Result<Vec<IntermediateRecord>, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let items = value
        .as_array()
        .ok_or_else(|| "expected a JSON array of records".to_string())?;
    if !(1..=2).contains(&items.len()) {
        return Err(format!("expected 1 or 2 records, found {}", items.len()));
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item.clone())
                .map_err(|e| format!("record {} is not a header/data pair: {}", i, e))
        })
        .collect()
}

/// `<date>-<hour>-surface-level-gfs-<label>.json` for `wind_<date>_<hour>.<ext>`.
///
/// Inputs without an hour token drop that part of the name.
pub fn wind_output_name(input: &Path, label: &str) -> Result<String> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ConvertError::SourceRead(format!("Cannot derive an output name from {}", input.display()))
        })?;
    let tokens: Vec<&str> = stem.split('_').filter(|t| !t.is_empty()).collect();
    let suffix = DatasetKind::Wind.file_suffix();
    let name = match tokens.as_slice() {
        [] => {
            return Err(ConvertError::SourceRead(format!(
                "Cannot derive an output name from {}",
                input.display()
            )))
        }
        [date] | [_, date] => format!("{}-{}-{}.json", date, suffix, label),
        [.., date, hour] => format!("{}-{}-{}-{}.json", date, hour, suffix, label),
    };
    Ok(name)
}

/// Convert one grib2json file into `output_dir`.
pub fn convert_wind_file(input: &Path, output_dir: &Path, config: &ConvertConfig) -> Result<JobStatus> {
    let name = wind_output_name(input, &config.resolution_label)?;
    let out_path = output_dir.join(&name);
    if !config.over_write && out_path.is_file() {
        debug!(output = %out_path.display(), "Output exists, skipping");
        return Ok(JobStatus::Skipped(SkipReason::OutputExists));
    }

    let mut records = read_intermediate(input)?;
    for record in records.iter_mut() {
        round_nullable(&mut record.data);
    }
    write_records(&out_path, &records)?;
    info!(input = %input.display(), output = %name, "Converted wind file");
    Ok(JobStatus::Written(vec![out_path]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use serde_json::json;
    use tempfile::tempdir;

    fn wind_config(over_write: bool) -> ConvertConfig {
        let overrides = ConfigOverrides {
            over_write: Some(over_write),
            ..Default::default()
        };
        ConvertConfig::resolve(DatasetKind::Wind, &overrides).unwrap()
    }

    #[test]
    fn test_output_names() {
        assert_eq!(
            wind_output_name(Path::new("wind/wind_20210101_06.json"), "1.0").unwrap(),
            "20210101-06-surface-level-gfs-1.0.json"
        );
        assert_eq!(
            wind_output_name(Path::new("wind_20210101.json"), "0.25").unwrap(),
            "20210101-surface-level-gfs-0.25.json"
        );
        assert_eq!(
            wind_output_name(Path::new("20210101.json"), "0.25").unwrap(),
            "20210101-surface-level-gfs-0.25.json"
        );
        // Different cycles of one day no longer collide.
        assert_ne!(
            wind_output_name(Path::new("wind_20210101_00.json"), "1.0").unwrap(),
            wind_output_name(Path::new("wind_20210101_12.json"), "1.0").unwrap()
        );
    }

    #[test]
    fn test_malformed_intermediate() {
        assert!(parse_intermediate("{}").is_err());
        assert!(parse_intermediate("[]").is_err());
        assert!(parse_intermediate(r#"[{"header":{},"data":[]},{"header":{},"data":[]},{"header":{},"data":[]}]"#).is_err());
        assert!(parse_intermediate(r#"[{"header":[],"data":[]}]"#).is_err());
        assert!(parse_intermediate(r#"[{"header":{},"data":{}}]"#).is_err());
        assert_eq!(parse_intermediate(r#"[{"header":{"nx":2},"data":[1.0,null]}]"#).unwrap().len(), 1);
    }

    #[test]
    fn test_convert_rounds_and_keeps_headers() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("wind_20210101_00.json");
        let source = json!([
            {"header": {"parameterNumber": 2, "refTime": "2021-01-01T00:00:00.000Z"}, "data": [1.234, null, -5.678]},
            {"header": {"parameterNumber": 3, "refTime": "2021-01-01T00:00:00.000Z"}, "data": [0.007, 2.0, null]}
        ]);
        fs::write(&input, source.to_string()).unwrap();
        let out_dir = dir.path().join("out");
        fs::create_dir(&out_dir).unwrap();

        let status = convert_wind_file(&input, &out_dir, &wind_config(false)).unwrap();
        let written = match status {
            JobStatus::Written(paths) => paths,
            other => panic!("unexpected status {:?}", other),
        };
        assert_eq!(written, vec![out_dir.join("20210101-00-surface-level-gfs-0.25.json")]);

        let output: Value = serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(output[0]["header"], source[0]["header"]);
        assert_eq!(output[1]["header"], source[1]["header"]);
        assert_eq!(output[0]["data"], json!([1.23, null, -5.68]));
        assert_eq!(output[1]["data"], json!([0.01, 2.0, null]));

        let again = convert_wind_file(&input, &out_dir, &wind_config(false)).unwrap();
        assert!(matches!(again, JobStatus::Skipped(SkipReason::OutputExists)));
    }
}
