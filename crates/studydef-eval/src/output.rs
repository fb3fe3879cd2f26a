//! CSV output
//!
//! The header is `patient_id` followed by the declared columns in
//! declaration order. Dates are written as `YYYY-MM-DD`, flags as `0`/`1`
//! and nulls as empty cells.

use crate::engine::Row;
use std::io::Write;
use std::path::{Path, PathBuf};
use studydef_diagnostics::{SD0401, StudyError};
use thiserror::Error;

/// Name of the leading key column
pub const PATIENT_ID_COLUMN: &str = "patient_id";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write CSV output: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write CSV output: {0}")]
    Io(#[from] std::io::Error),
}

impl From<OutputError> for StudyError {
    fn from(err: OutputError) -> Self {
        StudyError::system(SD0401, err.to_string())
    }
}

/// Write rows as CSV to any writer
pub fn write_csv<W: Write>(writer: W, columns: &[String], rows: &[Row]) -> Result<(), OutputError> {
    let mut writer = csv::Writer::from_writer(writer);
    write_rows(&mut writer, columns, rows)
}

/// Write rows as CSV to a file
pub fn write_csv_path(path: impl AsRef<Path>, columns: &[String], rows: &[Row]) -> Result<(), OutputError> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).map_err(|source| OutputError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    write_rows(&mut writer, columns, rows)?;
    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

fn write_rows<W: Write>(writer: &mut csv::Writer<W>, columns: &[String], rows: &[Row]) -> Result<(), OutputError> {
    writer.write_record(std::iter::once(PATIENT_ID_COLUMN).chain(columns.iter().map(String::as_str)))?;
    for row in rows {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.patient_id.to_string());
        record.extend(row.values.iter().map(|value| value.to_cell()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use studydef_types::{PatientId, Value};

    #[test]
    fn test_cells() {
        let columns = vec!["death_date".to_string(), "has_died".to_string(), "sex".to_string()];
        let rows = vec![
            Row {
                patient_id: PatientId(1),
                values: vec![
                    Value::Date(NaiveDate::from_ymd_opt(2021, 9, 1).unwrap()),
                    Value::Boolean(true),
                    Value::from("F"),
                ],
            },
            Row {
                patient_id: PatientId(2),
                values: vec![Value::Null, Value::Boolean(false), Value::Null],
            },
        ];

        let mut buffer = Vec::new();
        write_csv(&mut buffer, &columns, &rows).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "patient_id,death_date,has_died,sex\n1,2021-09-01,1,F\n2,,0,\n"
        );
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        write_csv_path(&path, &["age".to_string()], &[Row {
            patient_id: PatientId(5),
            values: vec![Value::Integer(40)],
        }])
        .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "patient_id,age\n5,40\n");
    }
}
