//! Batch driver: input discovery, job fan-out and the catalog
//!
//! Every input file is an independent job. Jobs never abort the batch: each
//! one ends as a [`JobOutcome`], failures are logged and counted, and the
//! catalog is rebuilt once after all jobs finished.

use crate::encode::write_catalog;
use crate::errors::{ConvertError, ErrorCategory, Result};
use crate::parallel::ParallelConfig;
use crate::pipeline::JobStatus;
use glob::Pattern;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// What happened to one input file
#[derive(Debug)]
pub struct JobOutcome {
    pub input: PathBuf,
    pub result: Result<JobStatus>,
}

impl JobOutcome {
    pub fn is_failed(&self) -> bool {
        self.result.is_err()
    }
}

/// Aggregated outcomes of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
    /// Catalog entries written after the batch
    pub catalog: Vec<String>,
}

impl BatchReport {
    pub fn written(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Ok(JobStatus::Written(_))))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Ok(JobStatus::Skipped(_))))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    /// Failed inputs with the category of their error.
    pub fn failures(&self) -> impl Iterator<Item = (&Path, ErrorCategory)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Err(e) => Some((o.input.as_path(), e.category())),
            Ok(_) => None,
        })
    }
}

/// Files directly inside `dir` whose name matches the glob `pattern`, sorted by path.
pub fn discover_inputs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(pattern).map_err(|e| {
        ConvertError::Config(format!("Invalid file pattern '{}': {}", pattern, e))
    })?;
    if !dir.is_dir() {
        return Err(ConvertError::Config(format!(
            "Input directory {} does not exist",
            dir.display()
        )));
    }
    let mut inputs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| ConvertError::SourceRead(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .map_or(false, |name| pattern.matches(name));
        if matches {
            inputs.push(entry.into_path());
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Run `job` over every input, serially or on a dedicated pool.
///
/// Outcomes come back in input order regardless of scheduling.
pub fn run_batch<F>(inputs: &[PathBuf], parallel: &ParallelConfig, job: F) -> Result<Vec<JobOutcome>>
where
    F: Fn(&Path) -> Result<JobStatus> + Sync,
{
    let run_one = |input: &PathBuf| {
        let result = job(input.as_path());
        if let Err(e) = &result {
            warn!(input = %input.display(), error = %e, "Conversion failed");
        }
        JobOutcome {
            input: input.clone(),
            result,
        }
    };

    if parallel.serial || inputs.len() <= 1 {
        return Ok(inputs.iter().map(run_one).collect());
    }
    let pool = parallel.build_pool()?;
    info!(workers = pool.current_num_threads(), jobs = inputs.len(), "Starting batch");
    Ok(pool.install(|| inputs.par_iter().map(run_one).collect()))
}

/// Rebuild the catalog and wrap everything up in a report.
pub fn finish_batch(
    outcomes: Vec<JobOutcome>,
    output_dir: &Path,
    catalog_path: &Path,
) -> Result<BatchReport> {
    let catalog = write_catalog(output_dir, catalog_path)?;
    let report = BatchReport { outcomes, catalog };
    info!(
        written = report.written(),
        skipped = report.skipped(),
        failed = report.failed(),
        "Batch finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SkipReason;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_inputs_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["b.nc", "a.nc", "c.json"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("sub.nc")).unwrap();
        let inputs = discover_inputs(dir.path(), "*.nc").unwrap();
        assert_eq!(inputs, vec![dir.path().join("a.nc"), dir.path().join("b.nc")]);
        assert_eq!(
            discover_inputs(dir.path(), "?.nc").unwrap(),
            vec![dir.path().join("a.nc"), dir.path().join("b.nc")]
        );
        assert!(discover_inputs(dir.path(), "x_*.nc").unwrap().is_empty());
        assert!(discover_inputs(&dir.path().join("missing"), "*").is_err());
        let err = discover_inputs(dir.path(), "[*.nc").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let inputs: Vec<PathBuf> = ["one", "two", "three", "four"].iter().map(PathBuf::from).collect();
        let job = |p: &Path| -> Result<JobStatus> {
            match p.to_str() {
                Some("two") => Err(ConvertError::SourceRead("broken".into())),
                Some("four") => Ok(JobStatus::Skipped(SkipReason::OutputExists)),
                _ => Ok(JobStatus::Written(vec![p.to_path_buf()])),
            }
        };
        for parallel in [ParallelConfig::serial(), ParallelConfig::with_threads(2)] {
            let outcomes = run_batch(&inputs, &parallel, job).unwrap();
            let order: Vec<&Path> = outcomes.iter().map(|o| o.input.as_path()).collect();
            assert_eq!(order, vec![Path::new("one"), Path::new("two"), Path::new("three"), Path::new("four")]);

            let report = BatchReport {
                outcomes,
                catalog: Vec::new(),
            };
            assert_eq!((report.written(), report.skipped(), report.failed()), (2, 1, 1));
            let failures: Vec<_> = report.failures().collect();
            assert_eq!(failures, vec![(Path::new("two"), ErrorCategory::SourceRead)]);
        }
    }
}
