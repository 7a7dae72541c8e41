use std::path::{Path, PathBuf};

use csv::WriterBuilder;

use crate::errors::{LangIdError, Result};
use crate::prediction::PredictionRecord;

pub const DEFAULT_OUTPUT_CSV: &str = "prediction.csv";
pub const CSV_HEADER: [&str; 2] = ["Filepath", "Language"];

/// Write the batch report: a `Filepath,Language` header, then one row per
/// record in the order given. The header is written even with no records.
pub fn write_predictions(output_csv: &Path, records: &[PredictionRecord]) -> Result<PathBuf> {
    let report_err = |source: csv::Error| LangIdError::Report {
        path: output_csv.to_path_buf(),
        source,
    };

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(output_csv)
        .map_err(report_err)?;

    writer.write_record(CSV_HEADER).map_err(report_err)?;
    for record in records {
        writer.serialize(record).map_err(report_err)?;
    }
    writer.flush().map_err(|e| report_err(e.into()))?;

    Ok(output_csv.to_path_buf())
}
