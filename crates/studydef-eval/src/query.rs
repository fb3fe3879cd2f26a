//! Per-patient query evaluation
//!
//! Turns one compiled variable into one value for one patient. Event queries
//! go through the matcher; rule-based queries go through the predicate
//! evaluator; dates and windows go through the temporal resolver.

use crate::context::{Anchors, Bindings};
use crate::error::EvalResult;
use crate::matcher::{
    EventFilter, binary_presence, continuous_registration, count_matches, covering_span,
    first_match, last_match, most_frequent_code,
};
use crate::predicate::{categorise, evaluate_category, evaluate_filter};
use crate::study::{
    DiagnosisPosition, FindMatch, Query, VariableDefinition, VariableKind,
};
use crate::temporal::{WindowSpec, resolve};
use chrono::NaiveDate;
use std::sync::Arc;
use studydef_ast::DateExpr;
use studydef_model::{Codelist, EventKind, PatientRecord};
use studydef_types::{DateWindow, Value};

/// Death source recorded for deaths registered by the practice
const PRIMARY_CARE_DEATH: &str = "primary_care";

/// Evaluate one variable for one patient
///
/// `bindings` must already hold every variable this one references.
pub fn evaluate_query(
    definition: &VariableDefinition,
    record: &PatientRecord,
    anchors: &Anchors,
    bindings: &Bindings,
) -> EvalResult<Value> {
    let absent = definition.kind.absent_value();
    let date = |expr: &DateExpr| resolve(expr, anchors, bindings);
    let window = |spec: &WindowSpec| spec.resolve(anchors, bindings);

    match &definition.query {
        Query::DiedFromAnyCause { window: spec } => {
            let Some(window) = window(spec)? else {
                return Ok(absent);
            };
            let filter = EventFilter::new(EventKind::Death).within(window);
            Ok(reduce(definition, record, &filter, None))
        }
        Query::DeathInPrimaryCare { window: spec } => {
            let Some(window) = window(spec)? else {
                return Ok(absent);
            };
            let filter = EventFilter::new(EventKind::Death)
                .within(window)
                .with_value(PRIMARY_CARE_DEATH);
            Ok(reduce(definition, record, &filter, None))
        }
        Query::RegisteredAsOf { date: on } => Ok(match date(on)? {
            Some(on) => Value::Boolean(covering_span(&record.timeline, EventKind::Registration, on).is_some()),
            None => absent,
        }),
        Query::RegisteredWithOnePracticeBetween { start, end } => {
            Ok(match (date(start)?, date(end)?) {
                (Some(start), Some(end)) => {
                    Value::Boolean(continuous_registration(&record.timeline, start, end))
                }
                _ => absent,
            })
        }
        Query::Sex => Ok(record.sex.clone().map_or(absent, Value::Text)),
        Query::AgeAsOf { date: on } => Ok(date(on)?
            .and_then(|on| record.age_on(on))
            .map_or(absent, Value::Integer)),
        Query::TestResult {
            pathogen,
            outcome,
            window: spec,
        } => {
            let Some(window) = window(spec)? else {
                return Ok(absent);
            };
            let mut filter = EventFilter::new(EventKind::TestResult)
                .within(window)
                .with_code(pathogen.as_str());
            if let Some(result) = outcome.required_value() {
                filter = filter.with_value(result);
            }
            Ok(reduce(definition, record, &filter, None))
        }
        Query::AdmittedToHospital {
            codelist,
            position,
            window: spec,
        } => {
            let Some(window) = window(spec)? else {
                return Ok(absent);
            };
            let mut filter = EventFilter::new(EventKind::Admission).within(window);
            if let Some(codelist) = codelist {
                filter = filter.with_codelist(Arc::clone(&codelist.codelist));
            }
            if *position == DiagnosisPosition::Primary {
                filter = filter.primary_only();
            }
            Ok(reduce(definition, record, &filter, None))
        }
        Query::RegisteredPracticeAsOf { date: on } => Ok(date(on)?
            .and_then(|on| covering_span(&record.timeline, EventKind::Registration, on))
            .and_then(|span| span.value.clone())
            .map_or(absent, Value::Text)),
        Query::Vaccination {
            target_disease,
            window: spec,
        } => {
            let Some(window) = window(spec)? else {
                return Ok(absent);
            };
            let mut filter = EventFilter::new(EventKind::Vaccination).within(window);
            if let Some(disease) = target_disease {
                filter = filter.with_value(disease.as_str());
            }
            Ok(reduce(definition, record, &filter, None))
        }
        Query::ClinicalEvents {
            codelist,
            window: spec,
        } => {
            let Some(window) = window(spec)? else {
                return Ok(absent);
            };
            let filter = EventFilter::new(EventKind::Clinical)
                .within(window)
                .with_codelist(Arc::clone(&codelist.codelist));
            Ok(reduce(definition, record, &filter, Some(codelist.codelist.as_ref())))
        }
        Query::GpConsultations { window: spec } => {
            let Some(window) = window(spec)? else {
                return Ok(absent);
            };
            let filter = EventFilter::new(EventKind::Consultation).within(window);
            Ok(reduce(definition, record, &filter, None))
        }
        Query::EthnicityFromSus => {
            let filter = EventFilter::new(EventKind::HospitalEthnicity);
            Ok(most_frequent_code(&record.timeline, &filter).map_or(absent, Value::Text))
        }
        Query::HealthcareWorker => Ok(Value::Boolean(record.healthcare_worker)),
        Query::CareHomeStatusAsOf { date: on, rules } => {
            let Some(on) = date(on)? else {
                return Ok(absent);
            };
            let intrinsic = care_home_bindings(record, on);
            Ok(evaluate_category(rules, &intrinsic)?.map_or(absent, Value::Text))
        }
        Query::CategorisedAs { rules } => {
            Ok(evaluate_category(rules, bindings)?.map_or(absent, Value::Text))
        }
        Query::Satisfying { expression } => Ok(Value::Boolean(evaluate_filter(expression, bindings)?)),
    }
}

/// Reduce the events matching `filter` to the variable's kind
fn reduce(
    definition: &VariableDefinition,
    record: &PatientRecord,
    filter: &EventFilter,
    categories: Option<&Codelist>,
) -> Value {
    let timeline = &record.timeline;
    let selected = || match definition.find {
        FindMatch::First => first_match(timeline, filter),
        FindMatch::Last => last_match(timeline, filter),
    };

    match definition.kind {
        VariableKind::Flag => Value::Boolean(binary_presence(timeline, filter)),
        VariableKind::Count => Value::Integer(count_matches(timeline, filter)),
        VariableKind::Date => selected().map_or(Value::Null, |event| Value::Date(event.date)),
        VariableKind::Category => categories
            .and_then(|codelist| categorise(selected().and_then(|e| e.code.as_deref()), codelist))
            .map_or(Value::Null, Value::Text),
        VariableKind::Numeric => Value::Null,
    }
}

/// Names the care home rules are evaluated against
///
/// `IsPotentialCareHome` is set when a care home span covers the date. The
/// nursing flags are `'Y'`/`'N'` when the span's code says `nursing` or
/// `residential`, and null otherwise.
fn care_home_bindings(record: &PatientRecord, on: NaiveDate) -> Bindings {
    let span = covering_span(&record.timeline, EventKind::CareHome, on);
    let nursing = span
        .and_then(|span| span.code.as_deref())
        .map(str::to_ascii_lowercase);

    let (requires, does_not_require) = match nursing.as_deref() {
        Some("nursing") => (Value::from("Y"), Value::from("N")),
        Some("residential") => (Value::from("N"), Value::from("Y")),
        _ => (Value::Null, Value::Null),
    };

    let mut bindings = Bindings::new();
    bindings.set("IsPotentialCareHome", Value::Boolean(span.is_some()));
    bindings.set("LocationRequiresNursing", requires);
    bindings.set("LocationDoesNotRequireNursing", does_not_require);
    bindings
}

/// Window of an event query for one patient, if it resolves
pub fn resolved_window(
    definition: &VariableDefinition,
    anchors: &Anchors,
    bindings: &Bindings,
) -> EvalResult<Option<DateWindow>> {
    match definition.query.window() {
        Some(spec) => spec.resolve(anchors, bindings),
        None => Ok(Some(DateWindow::unbounded())),
    }
}
