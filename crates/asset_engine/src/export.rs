use std::path::{Path, PathBuf};

use harvest_logging::harvest_info;

use crate::filename::report_filename;
use crate::harvest::HarvestReport;
use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub candidate_count: usize,
    pub warning_count: usize,
    pub output_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

/// Pretty-printed JSON for `report`.
pub fn render_report(report: &HarvestReport) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Writes `report` to `<output_dir>/<subject>--<hash>.json`. The hash covers
/// the subject and the sorted source list, so re-running the same harvest
/// replaces its previous report.
pub fn write_report(
    output_dir: &Path,
    report: &HarvestReport,
    sources: &[String],
) -> Result<ExportSummary, ExportError> {
    let mut sorted: Vec<&str> = sources.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let key = std::iter::once(report.subject.as_str())
        .chain(sorted)
        .collect::<Vec<_>>()
        .join("\n");

    let mut json = render_report(report)?;
    json.push('\n');
    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    let output_path = writer.write(&report_filename(&report.subject, &key), json.as_bytes())?;
    harvest_info!("wrote report to {:?}", output_path);

    Ok(ExportSummary {
        candidate_count: report.candidates.len(),
        warning_count: report.warnings.len(),
        output_path,
    })
}
