use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::executor::ExecutionReportRow;
use super::planner::ScoreCorrection;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV report: {0}")]
    Csv(#[from] csv::Error),
}

/// Reads a JSON array whose entries are bare step result ids or
/// `{ "step_result_id": ..., "score": ... }` objects.
pub fn read_corrections<R: Read>(reader: R) -> Result<Vec<ScoreCorrection>, FileError> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: W, value: &T) -> Result<(), FileError> {
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// Writes report rows with a header line.
pub fn write_report_csv<W: Write>(writer: W, rows: &[ExecutionReportRow]) -> Result<(), FileError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "action",
        "application_id",
        "title",
        "candidate_email",
        "candidate_name",
        "outcome",
    ])?;
    for row in rows {
        csv.write_record([
            row.action.label(),
            row.application_id.0.as_str(),
            row.title.as_deref().unwrap_or_default(),
            row.candidate_email.as_deref().unwrap_or_default(),
            row.candidate_name.as_deref().unwrap_or_default(),
            row.outcome.as_str(),
        ])?;
    }
    csv.flush().map_err(|source| FileError::Io {
        path: "csv report".to_string(),
        source,
    })?;
    Ok(())
}

pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, FileError> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

pub fn create(path: &Path) -> Result<BufWriter<File>, FileError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> FileError {
    FileError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::step_results::domain::{Action, ApplicationId, StepResultId};
    use std::io::Cursor;

    #[test]
    fn corrections_accept_bare_ids_and_scored_entries() {
        let corrections = read_corrections(Cursor::new(
            r#"["a0X1", {"step_result_id": "a0X2", "score": 85}, {"step_result_id": "a0X3"}]"#,
        ))
        .expect("parse corrections");

        assert_eq!(
            corrections,
            vec![
                ScoreCorrection::stored("a0X1"),
                ScoreCorrection::corrected("a0X2", 85.0),
                ScoreCorrection {
                    step_result_id: StepResultId("a0X3".to_string()),
                    score: None,
                },
            ]
        );
    }

    #[test]
    fn csv_report_has_header_and_blank_optionals() {
        let rows = vec![ExecutionReportRow {
            action: Action::NotifyHm,
            application_id: ApplicationId("006A".to_string()),
            title: Some("Senior Engineer".to_string()),
            candidate_email: None,
            candidate_name: Some("Ada".to_string()),
            outcome: "hiring manager to decide".to_string(),
        }];

        let mut buffer = Vec::new();
        write_report_csv(&mut buffer, &rows).expect("write csv");
        let text = String::from_utf8(buffer).expect("utf8");

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("action,application_id,title,candidate_email,candidate_name,outcome")
        );
        assert_eq!(
            lines.next(),
            Some("NotifyHM,006A,Senior Engineer,,Ada,hiring manager to decide")
        );
    }
}
