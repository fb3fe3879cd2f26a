//! Synthetic generation against whole study definitions

use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::Path;
use std::sync::Arc;
use studydef_eval::Study;
use studydef_synth::{Generator, SynthError, SyntheticConfig};
use studydef_types::Value;

const STUDY: &str = r#"{
    "index_date": "2021-06-01",
    "today": "2022-03-31",
    "default_expectations": {
        "date": {"earliest": "1900-01-01", "latest": "today"},
        "rate": "uniform",
        "incidence": 0.5
    },
    "codelists": {
        "covid_codes": {"system": "icd10", "codes": ["U071", "U072"]}
    },
    "population": {
        "expression": "NOT has_died AND registered",
        "variables": {
            "has_died": {
                "query": "died_from_any_cause",
                "on_or_before": "index_date",
                "returning": "binary_flag",
                "return_expectations": {"incidence": 0.1}
            },
            "registered": {
                "query": "registered_as_of",
                "date": "index_date",
                "return_expectations": {"incidence": 0.9}
            }
        }
    },
    "variables": {
        "exp_date_covid19_confirmed": {
            "query": "with_test_result_in_sgss",
            "pathogen": "SARS-CoV-2",
            "test_result": "positive",
            "returning": "date",
            "on_or_after": "index_date",
            "return_expectations": {
                "date": {"earliest": "index_date", "latest": "today"},
                "rate": "exponential_increase",
                "incidence": 0.3
            }
        },
        "sub_date_covid19_hospital": {
            "query": "admitted_to_hospital",
            "with_these_primary_diagnoses": "covid_codes",
            "returning": "date_admitted",
            "on_or_after": "exp_date_covid19_confirmed",
            "return_expectations": {"incidence": 0.6}
        },
        "sex": {
            "query": "sex",
            "return_expectations": {"rate": "universal", "category": {"ratios": {"M": 0.49, "F": 0.51}}}
        },
        "age": {
            "query": "age_as_of",
            "date": "index_date",
            "return_expectations": {"rate": "universal", "int": {"distribution": "population_ages"}}
        },
        "cov_num_consultation_rate": {
            "query": "with_gp_consultations",
            "between": ["2019-01-01", "2019-12-31"],
            "returning": "number_of_matches_in_period",
            "return_expectations": {"int": {"distribution": "poisson", "mean": 5}, "incidence": 1}
        },
        "age_band": {
            "query": "categorised_as",
            "rules": [
                {"label": "0-49", "when": "age < 50"},
                {"label": "50+", "when": "DEFAULT"}
            ]
        }
    }
}"#;

fn generator(size: usize, seed: u64) -> Generator {
    let study = Arc::new(Study::from_json_str(STUDY, Path::new(".")).unwrap());
    let config = SyntheticConfig::new().with_population_size(size).with_seed(seed);
    Generator::new(study, config).unwrap()
}

fn column(report: &studydef_eval::ExtractionReport, name: &str) -> Vec<Value> {
    let index = report.columns.iter().position(|c| c == name).unwrap();
    report.rows.iter().map(|row| row.values[index].clone()).collect()
}

#[test]
fn test_incidence_rate() {
    let report = generator(100_000, 2021).generate();
    assert_eq!(report.rows.len(), 100_000);

    let present = column(&report, "exp_date_covid19_confirmed")
        .iter()
        .filter(|value| !value.is_null())
        .count();
    let rate = present as f64 / 100_000.0;
    assert!((rate - 0.3).abs() <= 0.02, "observed incidence {rate}");
}

#[test]
fn test_conditioned_on_absent_ancestor_is_null() {
    let report = generator(5_000, 7).generate();
    let confirmed = column(&report, "exp_date_covid19_confirmed");
    let hospital = column(&report, "sub_date_covid19_hospital");

    for (confirmed, hospital) in confirmed.iter().zip(&hospital) {
        match (confirmed, hospital) {
            (Value::Null, other) => assert_eq!(other, &Value::Null),
            (Value::Date(test), Value::Date(admitted)) => assert!(admitted >= test),
            (Value::Date(_), Value::Null) => {}
            other => panic!("unexpected values {other:?}"),
        }
    }
    assert!(hospital.iter().any(|value| !value.is_null()));
}

#[test]
fn test_dates_stay_within_bounds() {
    let report = generator(2_000, 3).generate();
    let index_date = chrono::NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
    let today = chrono::NaiveDate::from_ymd_opt(2022, 3, 31).unwrap();
    for value in column(&report, "exp_date_covid19_confirmed") {
        if let Value::Date(date) = value {
            assert!(index_date <= date && date <= today, "{date} out of bounds");
        }
    }
}

#[test]
fn test_same_seed_same_dataset() {
    let first = generator(500, 99).generate();
    let second = generator(500, 99).generate();
    assert_eq!(first.rows, second.rows);

    let other = generator(500, 100).generate();
    assert_ne!(first.rows, other.rows);
}

#[test]
fn test_derived_and_universal_columns() {
    let report = generator(1_000, 11).generate();
    assert_eq!(
        report.columns,
        vec![
            "exp_date_covid19_confirmed",
            "sub_date_covid19_hospital",
            "sex",
            "age",
            "cov_num_consultation_rate",
            "age_band"
        ]
    );

    let ages = column(&report, "age");
    let bands = column(&report, "age_band");
    for (age, band) in ages.iter().zip(&bands) {
        let Value::Integer(age) = age else {
            panic!("universal age should always be present, got {age:?}");
        };
        let expected = if *age < 50 { "0-49" } else { "50+" };
        assert_eq!(band, &Value::from(expected));
    }
    assert!(column(&report, "sex").iter().all(|sex| matches!(sex, Value::Text(s) if s == "M" || s == "F")));
}

#[rstest]
#[case::kept_by_default(false)]
#[case::applied(true)]
fn test_population_filter(#[case] apply: bool) {
    let study = Arc::new(Study::from_json_str(STUDY, Path::new(".")).unwrap());
    let config = SyntheticConfig::new()
        .with_population_size(2_000)
        .with_seed(5)
        .with_population(apply);
    let report = Generator::new(study, config).unwrap().generate();

    assert_eq!(report.rows.len() + report.excluded, 2_000);
    if apply {
        // About 0.9 * 0.9 of patients are registered and alive
        assert!(report.excluded > 200, "only {} excluded", report.excluded);
    } else {
        assert_eq!(report.excluded, 0);
    }
}

#[test]
fn test_category_without_ratios_is_rejected() {
    let json = r#"{"index_date": "2021-06-01", "variables": {"sex": {"query": "sex"}}}"#;
    let study = Arc::new(Study::from_json_str(json, Path::new(".")).unwrap());
    let err = Generator::new(study, SyntheticConfig::default()).unwrap_err();
    assert!(matches!(err, SynthError::MissingExpectations { ref variable, needs: "category ratios" } if variable == "sex"));
}
