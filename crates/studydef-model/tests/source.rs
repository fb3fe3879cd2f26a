//! CSV-backed patient source

use chrono::NaiveDate;
use std::fs;
use studydef_model::{EventKind, InMemorySource, PatientSource, SourceError};
use studydef_types::PatientId;
use tempfile::TempDir;

#[test]
fn test_load_from_files() {
    let dir = TempDir::new().unwrap();
    let patients = dir.path().join("patients.csv");
    let events = dir.path().join("events.csv");
    fs::write(
        &patients,
        "patient_id,sex,date_of_birth,healthcare_worker\n7,F,1990-01-01,yes\n",
    )
    .unwrap();
    fs::write(
        &events,
        "patient_id,date,kind,code,primary,value,end_date\n\
         7,2019-04-01,registration,,,London,2020-03-31\n\
         7,2020-04-01,registration,,,North East,\n",
    )
    .unwrap();

    let source = InMemorySource::from_csv_paths(&patients, &events).unwrap();
    assert_eq!(source.patient_ids(), vec![PatientId(7)]);

    let record = source.load(PatientId(7)).unwrap();
    assert!(record.healthcare_worker);
    let spans: Vec<_> = record.timeline.of_kind(EventKind::Registration).collect();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].1.end_date, NaiveDate::from_ymd_opt(2020, 3, 31));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = InMemorySource::from_csv_paths(dir.path().join("p.csv"), dir.path().join("e.csv"))
        .unwrap_err();
    assert!(matches!(err, SourceError::Read { .. }));
}

#[test]
fn test_invalid_patient_id_is_file_error() {
    let err = InMemorySource::from_csv_readers(
        "patient_id,sex\nabc,F\n".as_bytes(),
        "patient_id,date,kind\n".as_bytes(),
    )
    .unwrap_err();
    assert!(matches!(err, SourceError::MalformedFile(_)));
}
