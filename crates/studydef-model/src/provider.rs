//! Patient data sources
//!
//! The evaluation engine treats patient data as an opaque query service keyed
//! by patient id. [`InMemorySource`] is the CSV-backed implementation used by
//! the command-line tool and the tests.

use crate::record::{Event, EventKind, PatientRecord};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use studydef_diagnostics::{StudyError, SD0300, SD0301, SD0302, SD0401, SD0406};
use studydef_types::{DATE_FORMAT, PatientId};
use thiserror::Error;

/// Trait for providing patient records to the evaluation engine
pub trait PatientSource: Send + Sync {
    /// Patient ids in source order
    fn patient_ids(&self) -> Vec<PatientId>;

    /// Load one patient's record
    ///
    /// A malformed record fails only that patient.
    fn load(&self, id: PatientId) -> Result<PatientRecord, SourceError>;
}

/// Patient source error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Malformed patient data: {0}")]
    MalformedFile(String),

    #[error("Patient {0} not found")]
    PatientNotFound(PatientId),

    #[error("Malformed record for patient {patient}: {reason}")]
    MalformedRecord { patient: PatientId, reason: String },

    #[error("Malformed event for patient {patient} (event {index}): {reason}")]
    MalformedEvent {
        patient: PatientId,
        index: usize,
        reason: String,
    },
}

impl From<SourceError> for StudyError {
    fn from(err: SourceError) -> Self {
        let code = match &err {
            SourceError::Read { .. } => SD0401,
            SourceError::MalformedFile(_) => SD0406,
            SourceError::PatientNotFound(_) => SD0300,
            SourceError::MalformedRecord { .. } => SD0301,
            SourceError::MalformedEvent { .. } => SD0302,
        };
        match &err {
            SourceError::Read { .. } | SourceError::MalformedFile(_) => {
                StudyError::system(code, err.to_string())
            }
            SourceError::PatientNotFound(id)
            | SourceError::MalformedRecord { patient: id, .. }
            | SourceError::MalformedEvent { patient: id, .. } => {
                StudyError::data(code, err.to_string()).with_context(format!("patient {id}"))
            }
        }
    }
}

/// `patients.csv` row
#[derive(Debug, Deserialize)]
struct PatientRow {
    patient_id: String,
    #[serde(default)]
    sex: Option<String>,
    #[serde(default)]
    date_of_birth: Option<String>,
    #[serde(default)]
    healthcare_worker: Option<String>,
}

/// `events.csv` row
#[derive(Debug, Deserialize)]
struct EventRow {
    patient_id: String,
    date: String,
    kind: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    primary: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

/// Patient source held entirely in memory
///
/// Files are read once; each patient's rows are converted up front and a
/// patient whose rows do not convert keeps its error, returned by `load`.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    patients: IndexMap<PatientId, Result<PatientRecord, SourceError>>,
}

impl InMemorySource {
    /// Source over already-built records, in the given order
    pub fn from_records(records: impl IntoIterator<Item = PatientRecord>) -> Self {
        Self {
            patients: records.into_iter().map(|r| (r.id, Ok(r))).collect(),
        }
    }

    /// Read `patients.csv` and `events.csv`
    pub fn from_csv_paths(
        patients: impl AsRef<Path>,
        events: impl AsRef<Path>,
    ) -> Result<Self, SourceError> {
        let patients_path = patients.as_ref();
        let events_path = events.as_ref();
        let patient_rows = read_rows(csv_reader(patients_path)?, patients_path)?;
        let event_rows = read_rows(csv_reader(events_path)?, events_path)?;
        let source = Self::from_rows(patient_rows, event_rows)?;
        log::info!(
            "Loaded {} patients from {} and {}",
            source.len(),
            patients_path.display(),
            events_path.display()
        );
        Ok(source)
    }

    /// Read patient and event CSV data from readers
    pub fn from_csv_readers<P: Read, E: Read>(patients: P, events: E) -> Result<Self, SourceError> {
        let origin = Path::new("<reader>");
        let patient_rows = read_rows(reader_builder().from_reader(patients), origin)?;
        let event_rows = read_rows(reader_builder().from_reader(events), origin)?;
        Self::from_rows(patient_rows, event_rows)
    }

    fn from_rows(patient_rows: Vec<PatientRow>, event_rows: Vec<EventRow>) -> Result<Self, SourceError> {
        let mut rows: IndexMap<PatientId, (PatientRow, Vec<EventRow>)> = IndexMap::new();
        for row in patient_rows {
            let id = parse_id(&row.patient_id)?;
            if rows.insert(id, (row, Vec::new())).is_some() {
                return Err(SourceError::MalformedFile(format!(
                    "patient {id} is listed more than once"
                )));
            }
        }

        let mut orphans: HashMap<PatientId, usize> = HashMap::new();
        for row in event_rows {
            let id = parse_id(&row.patient_id)?;
            match rows.get_mut(&id) {
                Some((_, events)) => events.push(row),
                None => *orphans.entry(id).or_default() += 1,
            }
        }
        if !orphans.is_empty() {
            log::warn!(
                "Ignoring events for {} patient(s) missing from the patient file",
                orphans.len()
            );
        }

        let patients = rows
            .into_iter()
            .map(|(id, (patient, events))| (id, convert_record(id, &patient, &events)))
            .collect();
        Ok(Self { patients })
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

impl PatientSource for InMemorySource {
    fn patient_ids(&self) -> Vec<PatientId> {
        self.patients.keys().copied().collect()
    }

    fn load(&self, id: PatientId) -> Result<PatientRecord, SourceError> {
        self.patients
            .get(&id)
            .cloned()
            .unwrap_or(Err(SourceError::PatientNotFound(id)))
    }
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true).trim(csv::Trim::All);
    builder
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, SourceError> {
    reader_builder()
        .from_path(path)
        .map_err(|e| SourceError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn read_rows<R: Read, T: for<'de> Deserialize<'de>>(
    mut reader: csv::Reader<R>,
    path: &Path,
) -> Result<Vec<T>, SourceError> {
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| SourceError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn parse_id(raw: &str) -> Result<PatientId, SourceError> {
    raw.parse()
        .map_err(|_| SourceError::MalformedFile(format!("invalid patient id '{raw}'")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| format!("invalid date '{raw}'"))
}

fn parse_flag(raw: Option<&str>) -> Result<bool, String> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("" | "0" | "false" | "no" | "n") => Ok(false),
        Some("1" | "true" | "yes" | "y") => Ok(true),
        Some(other) => Err(format!("invalid flag '{other}'")),
    }
}

fn non_empty(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn convert_record(
    id: PatientId,
    patient: &PatientRow,
    events: &[EventRow],
) -> Result<PatientRecord, SourceError> {
    let malformed = |reason: String| SourceError::MalformedRecord { patient: id, reason };

    let date_of_birth = non_empty(&patient.date_of_birth)
        .map(|raw| parse_date(&raw))
        .transpose()
        .map_err(malformed)?;
    let healthcare_worker = parse_flag(patient.healthcare_worker.as_deref()).map_err(malformed)?;

    let events = events
        .iter()
        .enumerate()
        .map(|(index, row)| {
            convert_event(row).map_err(|reason| SourceError::MalformedEvent {
                patient: id,
                index,
                reason,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut record = PatientRecord::new(id)
        .healthcare_worker(healthcare_worker)
        .with_events(events);
    record.sex = non_empty(&patient.sex);
    record.date_of_birth = date_of_birth;
    Ok(record)
}

fn convert_event(row: &EventRow) -> Result<Event, String> {
    let kind = row.kind.parse::<EventKind>().map_err(|e| e.to_string())?;
    let date = parse_date(&row.date)?;
    let end_date = non_empty(&row.end_date)
        .map(|raw| parse_date(&raw))
        .transpose()?;
    if let Some(end) = end_date
        && end < date
    {
        return Err(format!("end date {end} precedes start date {date}"));
    }

    Ok(Event {
        date,
        end_date,
        kind,
        code: non_empty(&row.code),
        primary: parse_flag(row.primary.as_deref())?,
        value: non_empty(&row.value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PATIENTS: &str = "patient_id,sex,date_of_birth,healthcare_worker\n\
                            1,F,1980-03-02,0\n\
                            2,M,not-a-date,0\n\
                            3,M,1950-07-19,1\n";

    const EVENTS: &str = "patient_id,date,kind,code,primary,value,end_date\n\
                          1,2021-06-10,admission,U071,1,,\n\
                          1,2015-01-01,registration,,,London,\n\
                          3,2021-02-01,vaccination,,,SARS-2 CORONAVIRUS,\n\
                          3,2021-03-01,death,,,primary_care,\n\
                          9,2021-03-01,death,,,primary_care,\n";

    fn source() -> InMemorySource {
        InMemorySource::from_csv_readers(PATIENTS.as_bytes(), EVENTS.as_bytes()).unwrap()
    }

    #[test]
    fn test_source_order_is_kept() {
        assert_eq!(source().patient_ids(), vec![PatientId(1), PatientId(2), PatientId(3)]);
    }

    #[test]
    fn test_load_converts_rows() {
        let record = source().load(PatientId(1)).unwrap();
        assert_eq!(record.sex.as_deref(), Some("F"));
        assert_eq!(record.date_of_birth, NaiveDate::from_ymd_opt(1980, 3, 2));
        assert!(!record.healthcare_worker);

        let events = record.timeline.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Admission);
        assert!(events[0].primary);
        assert_eq!(events[0].code.as_deref(), Some("U071"));
        assert_eq!(events[1].value.as_deref(), Some("London"));
        assert_eq!(events[1].end_date, None);
    }

    #[test]
    fn test_malformed_record_fails_only_that_patient() {
        let source = source();
        assert!(matches!(
            source.load(PatientId(2)),
            Err(SourceError::MalformedRecord { patient: PatientId(2), .. })
        ));
        assert!(source.load(PatientId(3)).unwrap().healthcare_worker);
    }

    #[test]
    fn test_unknown_patient() {
        assert_eq!(
            source().load(PatientId(9)),
            Err(SourceError::PatientNotFound(PatientId(9)))
        );
    }

    #[test]
    fn test_inverted_span_is_malformed_event() {
        let events = "patient_id,date,kind,code,primary,value,end_date\n\
                      1,2021-06-10,registration,,,London,2021-01-01\n";
        let source = InMemorySource::from_csv_readers(PATIENTS.as_bytes(), events.as_bytes()).unwrap();
        assert!(matches!(
            source.load(PatientId(1)),
            Err(SourceError::MalformedEvent { index: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_patient_is_file_error() {
        let patients = "patient_id,sex\n1,F\n1,M\n";
        let err = InMemorySource::from_csv_readers(patients.as_bytes(), EVENTS.as_bytes()).unwrap_err();
        assert!(matches!(err, SourceError::MalformedFile(_)));
    }

    #[test]
    fn test_error_codes() {
        let err: StudyError = SourceError::PatientNotFound(PatientId(4)).into();
        assert_eq!(err.code(), SD0300);
    }
}
