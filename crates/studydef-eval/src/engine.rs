//! Extraction engine
//!
//! The [`Extractor`] evaluates a compiled study for every patient of a
//! [`PatientSource`]. Each patient is evaluated independently: variables are
//! computed in dependency order into the patient's bindings, the population
//! filter decides whether the patient is kept, and the output columns are
//! read back from the bindings.
//!
//! A failure for one patient (a malformed record, date overflow, a comparison
//! between incompatible values) drops that patient's row and is recorded in
//! the [`ExtractionReport`]; the run continues.

use crate::context::Bindings;
use crate::error::EvalResult;
use crate::predicate::evaluate_filter;
use crate::query::evaluate_query;
use crate::study::Study;
use rayon::prelude::*;
use std::sync::Arc;
use studydef_diagnostics::{ErrorCode, StudyError};
use studydef_model::{PatientRecord, PatientSource};
use studydef_types::{PatientId, Value};

/// Run configuration for an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionConfig {
    /// Evaluate patients on the rayon thread pool
    pub parallel: bool,
    /// Drop patients that do not satisfy the population filter
    pub apply_population: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            apply_population: true,
        }
    }
}

impl ExtractionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn with_population(mut self, apply: bool) -> Self {
        self.apply_population = apply;
        self
    }
}

/// One output row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub patient_id: PatientId,
    /// Values in column order
    pub values: Vec<Value>,
}

/// Result of evaluating one patient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientOutcome {
    Included(Row),
    /// Not in the study population
    Excluded,
}

/// A patient whose row was dropped because evaluation failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientFailure {
    pub patient_id: PatientId,
    pub code: ErrorCode,
    pub reason: String,
}

/// Everything an extraction run produced
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub columns: Vec<String>,
    /// Rows in source patient order
    pub rows: Vec<Row>,
    pub failures: Vec<PatientFailure>,
    /// Number of patients outside the population
    pub excluded: usize,
}

impl ExtractionReport {
    /// Number of patients the run looked at
    pub fn processed(&self) -> usize {
        self.rows.len() + self.failures.len() + self.excluded
    }

    /// Sort per-patient outcomes, kept in patient order, into a report
    pub fn from_outcomes(
        columns: Vec<String>,
        outcomes: impl IntoIterator<Item = (PatientId, Result<PatientOutcome, StudyError>)>,
    ) -> Self {
        let mut report = Self {
            columns,
            ..Self::default()
        };
        for (patient_id, outcome) in outcomes {
            match outcome {
                Ok(PatientOutcome::Included(row)) => report.rows.push(row),
                Ok(PatientOutcome::Excluded) => report.excluded += 1,
                Err(err) => {
                    log::warn!("Dropping patient {}: {}", patient_id, err);
                    report.failures.push(PatientFailure {
                        patient_id,
                        code: err.code(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        log::info!(
            "{} rows, {} excluded, {} failed",
            report.rows.len(),
            report.excluded,
            report.failures.len()
        );
        report
    }
}

/// Apply the population filter to a patient's bindings and read out the row
pub fn select_row(
    study: &Study,
    patient_id: PatientId,
    bindings: &Bindings,
    apply_population: bool,
) -> EvalResult<PatientOutcome> {
    if apply_population
        && let Some(population) = study.population()
        && !evaluate_filter(population, bindings)?
    {
        return Ok(PatientOutcome::Excluded);
    }

    let values = study
        .columns()
        .iter()
        .map(|column| bindings.get(column).cloned().unwrap_or_default())
        .collect();
    Ok(PatientOutcome::Included(Row { patient_id, values }))
}

/// Evaluates a compiled study per patient
#[derive(Debug, Clone)]
pub struct Extractor {
    study: Arc<Study>,
    config: ExtractionConfig,
}

impl Extractor {
    pub fn new(study: Arc<Study>) -> Self {
        Self {
            study,
            config: ExtractionConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    /// Evaluate every variable for one patient, in dependency order
    pub fn bind(&self, record: &PatientRecord) -> EvalResult<Bindings> {
        let anchors = self.study.anchors();
        let mut bindings = Bindings::new();
        for definition in self.study.ordered() {
            let value = evaluate_query(definition, record, anchors, &bindings)?;
            log::trace!("patient {}: {} = {}", record.id, definition.name, value);
            bindings.set(definition.name.clone(), value);
        }
        Ok(bindings)
    }

    /// Evaluate one patient into a row, or exclude them
    pub fn evaluate_patient(&self, record: &PatientRecord) -> EvalResult<PatientOutcome> {
        let bindings = self.bind(record)?;
        select_row(&self.study, record.id, &bindings, self.config.apply_population)
    }

    /// Run the study over every patient of a source
    pub fn extract(&self, source: &dyn PatientSource) -> ExtractionReport {
        let ids = source.patient_ids();
        log::info!(
            "Extracting {} patients ({})",
            ids.len(),
            if self.config.parallel { "parallel" } else { "sequential" }
        );

        let outcomes: Vec<(PatientId, Result<PatientOutcome, StudyError>)> = if self.config.parallel {
            ids.par_iter().map(|&id| (id, self.run(source, id))).collect()
        } else {
            ids.iter().map(|&id| (id, self.run(source, id))).collect()
        };

        ExtractionReport::from_outcomes(self.study.columns(), outcomes)
    }

    fn run(&self, source: &dyn PatientSource, id: PatientId) -> Result<PatientOutcome, StudyError> {
        let record = source.load(id)?;
        Ok(self.evaluate_patient(&record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use studydef_diagnostics::{SD0201, SD0300};
    use studydef_model::{Event, EventKind, InMemorySource, SourceError};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const STUDY: &str = r#"{
        "index_date": "2021-06-01",
        "today": "2022-03-31",
        "population": {
            "expression": "registered",
            "variables": {
                "registered": {"query": "registered_as_of", "date": "index_date"}
            }
        },
        "variables": {
            "vax_date": {
                "query": "with_tpp_vaccination_record",
                "target_disease_matches": "SARS-2 CORONAVIRUS",
                "on_or_after": "2020-12-08",
                "returning": "date"
            },
            "follow_up_end": {
                "query": "with_gp_consultations",
                "on_or_after": "vax_date + 9999999 years",
                "returning": "binary_flag"
            }
        }
    }"#;

    fn extractor(parallel: bool) -> Extractor {
        let study = Study::from_json_str(STUDY, Path::new(".")).unwrap();
        Extractor::new(Arc::new(study)).with_config(ExtractionConfig::new().with_parallel(parallel))
    }

    fn registered(id: u64) -> PatientRecord {
        PatientRecord::new(PatientId(id)).with_events(vec![Event::new(EventKind::Registration, date(2015, 1, 1))])
    }

    #[test]
    fn test_failures_are_isolated() {
        let vaccinated = registered(2).with_events(vec![
            Event::new(EventKind::Registration, date(2015, 1, 1)),
            Event::new(EventKind::Vaccination, date(2021, 1, 10)).with_value("SARS-2 CORONAVIRUS"),
        ]);
        let source = InMemorySource::from_records([registered(1), vaccinated, registered(3)]);

        for parallel in [true, false] {
            let report = extractor(parallel).extract(&source);
            assert_eq!(report.columns, vec!["vax_date", "follow_up_end"]);
            let ids: Vec<_> = report.rows.iter().map(|row| row.patient_id).collect();
            assert_eq!(ids, vec![PatientId(1), PatientId(3)]);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].patient_id, PatientId(2));
            assert_eq!(report.failures[0].code, SD0201);
            assert_eq!(report.processed(), 3);
        }
    }

    #[test]
    fn test_population_filter_excludes() {
        let unregistered = PatientRecord::new(PatientId(7));
        let extractor = extractor(false);
        assert_eq!(extractor.evaluate_patient(&unregistered).unwrap(), PatientOutcome::Excluded);

        let all = extractor.with_config(ExtractionConfig::new().with_population(false));
        let outcome = all.evaluate_patient(&unregistered).unwrap();
        assert_eq!(
            outcome,
            PatientOutcome::Included(Row {
                patient_id: PatientId(7),
                values: vec![Value::Null, Value::Boolean(false)],
            })
        );
    }

    struct MissingPatient;

    impl PatientSource for MissingPatient {
        fn patient_ids(&self) -> Vec<PatientId> {
            vec![PatientId(9)]
        }

        fn load(&self, id: PatientId) -> Result<PatientRecord, SourceError> {
            Err(SourceError::PatientNotFound(id))
        }
    }

    #[test]
    fn test_source_errors_are_recorded() {
        let report = extractor(true).extract(&MissingPatient);
        assert!(report.rows.is_empty());
        assert_eq!(report.failures[0].code, SD0300);
    }
}
