//! Compiled variable definitions

use crate::predicate::CategoryRule;
use crate::temporal::WindowSpec;
use std::fmt;
use std::sync::Arc;
use studydef_ast::{DateExpr, Expression};
use studydef_model::Codelist;
use studydef_types::Value;

/// Names bound by `care_home_status_as_of` for its rules
pub const CARE_HOME_BINDINGS: [&str; 3] = [
    "IsPotentialCareHome",
    "LocationRequiresNursing",
    "LocationDoesNotRequireNursing",
];

/// Shape of the value a variable produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Date,
    Flag,
    Category,
    Count,
    Numeric,
}

impl VariableKind {
    /// Value used when nothing matched or the variable is absent
    pub fn absent_value(&self) -> Value {
        match self {
            Self::Flag => Value::Boolean(false),
            Self::Count => Value::Integer(0),
            Self::Date | Self::Category | Self::Numeric => Value::Null,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Flag => "flag",
            Self::Category => "category",
            Self::Count => "count",
            Self::Numeric => "numeric",
        }
    }

    /// Kind selected by a `returning` keyword
    pub fn from_returning(returning: &str) -> Option<Self> {
        match returning {
            "binary_flag" => Some(Self::Flag),
            "date" | "date_admitted" | "date_of_death" => Some(Self::Date),
            "number_of_matches_in_period" => Some(Self::Count),
            "category" | "nuts1_region_name" | "group_6" | "group_16" => Some(Self::Category),
            _ => None,
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which matching event a date or category is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FindMatch {
    #[default]
    First,
    Last,
}

/// Diagnosis positions searched by a hospital admission query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosisPosition {
    #[default]
    Any,
    Primary,
}

/// Result a test-result query filters on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestOutcome {
    #[default]
    Any,
    Positive,
    Negative,
}

impl TestOutcome {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "any" => Some(Self::Any),
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }

    /// Event value required; `None` accepts any result
    pub fn required_value(&self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::Positive => Some("positive"),
            Self::Negative => Some("negative"),
        }
    }
}

/// A codelist bound to a variable, with the name it was declared under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodelistRef {
    pub name: String,
    pub codelist: Arc<Codelist>,
}

/// The closed set of query families
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    DiedFromAnyCause {
        window: WindowSpec,
    },
    DeathInPrimaryCare {
        window: WindowSpec,
    },
    RegisteredAsOf {
        date: DateExpr,
    },
    RegisteredWithOnePracticeBetween {
        start: DateExpr,
        end: DateExpr,
    },
    Sex,
    AgeAsOf {
        date: DateExpr,
    },
    TestResult {
        pathogen: String,
        outcome: TestOutcome,
        window: WindowSpec,
    },
    AdmittedToHospital {
        codelist: Option<CodelistRef>,
        position: DiagnosisPosition,
        window: WindowSpec,
    },
    RegisteredPracticeAsOf {
        date: DateExpr,
    },
    Vaccination {
        target_disease: Option<String>,
        window: WindowSpec,
    },
    ClinicalEvents {
        codelist: CodelistRef,
        window: WindowSpec,
    },
    GpConsultations {
        window: WindowSpec,
    },
    EthnicityFromSus,
    HealthcareWorker,
    CareHomeStatusAsOf {
        date: DateExpr,
        rules: Vec<CategoryRule>,
    },
    CategorisedAs {
        rules: Vec<CategoryRule>,
    },
    Satisfying {
        expression: Expression,
    },
}

impl Query {
    /// Name of the query family as written in a study definition
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DiedFromAnyCause { .. } => "died_from_any_cause",
            Self::DeathInPrimaryCare { .. } => "with_death_recorded_in_primary_care",
            Self::RegisteredAsOf { .. } => "registered_as_of",
            Self::RegisteredWithOnePracticeBetween { .. } => "registered_with_one_practice_between",
            Self::Sex => "sex",
            Self::AgeAsOf { .. } => "age_as_of",
            Self::TestResult { .. } => "with_test_result_in_sgss",
            Self::AdmittedToHospital { .. } => "admitted_to_hospital",
            Self::RegisteredPracticeAsOf { .. } => "registered_practice_as_of",
            Self::Vaccination { .. } => "with_tpp_vaccination_record",
            Self::ClinicalEvents { .. } => "with_these_clinical_events",
            Self::GpConsultations { .. } => "with_gp_consultations",
            Self::EthnicityFromSus => "with_ethnicity_from_sus",
            Self::HealthcareWorker => "with_healthcare_worker_flag_on_covid_vaccine_record",
            Self::CareHomeStatusAsOf { .. } => "care_home_status_as_of",
            Self::CategorisedAs { .. } => "categorised_as",
            Self::Satisfying { .. } => "satisfying",
        }
    }

    /// Window of an event query
    pub fn window(&self) -> Option<&WindowSpec> {
        match self {
            Self::DiedFromAnyCause { window }
            | Self::DeathInPrimaryCare { window }
            | Self::TestResult { window, .. }
            | Self::AdmittedToHospital { window, .. }
            | Self::Vaccination { window, .. }
            | Self::ClinicalEvents { window, .. }
            | Self::GpConsultations { window } => Some(window),
            _ => None,
        }
    }

    /// Date expressions that bound or position this query in time
    pub fn dates(&self) -> Vec<&DateExpr> {
        match self {
            Self::RegisteredAsOf { date }
            | Self::AgeAsOf { date }
            | Self::RegisteredPracticeAsOf { date }
            | Self::CareHomeStatusAsOf { date, .. } => vec![date],
            Self::RegisteredWithOnePracticeBetween { start, end } => vec![start, end],
            other => other.window().map(WindowSpec::bounds).unwrap_or_default(),
        }
    }

    /// Names this query reads
    ///
    /// The intrinsic names bound for care home rules are not included.
    pub fn references(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .dates()
            .into_iter()
            .filter_map(DateExpr::root_reference)
            .map(str::to_string)
            .collect();
        match self {
            Self::CategorisedAs { rules } => {
                names.extend(rules.iter().flat_map(|rule| rule.predicate.references()));
            }
            Self::Satisfying { expression } => names.extend(expression.references()),
            _ => {}
        }
        names
    }
}

/// Rate at which synthetic values are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rate {
    #[default]
    Uniform,
    /// Dates skewed towards the latest bound
    ExponentialIncrease,
    /// Present for every patient
    Universal,
}

/// Bounds for synthetic dates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateBounds {
    pub earliest: DateExpr,
    pub latest: DateExpr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntDistribution {
    Poisson { mean: f64 },
    /// Ages drawn from a fixed population curve
    PopulationAges,
}

/// How synthetic values of a variable are generated
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticValueSpec {
    pub rate: Rate,
    /// Probability that the variable is present, in `[0, 1]`
    pub incidence: f64,
    pub date: Option<DateBounds>,
    /// Category labels and their ratios, in authoring order
    pub category: Option<Vec<(String, f64)>>,
    pub int: Option<IntDistribution>,
}

impl Default for SyntheticValueSpec {
    fn default() -> Self {
        Self {
            rate: Rate::Uniform,
            incidence: 1.0,
            date: None,
            category: None,
            int: None,
        }
    }
}

impl SyntheticValueSpec {
    /// Names referenced by the date bounds
    pub fn references(&self) -> Vec<String> {
        self.date
            .iter()
            .flat_map(|bounds| [&bounds.earliest, &bounds.latest])
            .filter_map(DateExpr::root_reference)
            .map(str::to_string)
            .collect()
    }
}

/// A compiled, validated variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub query: Query,
    pub kind: VariableKind,
    pub find: FindMatch,
    pub expectations: SyntheticValueSpec,
    /// Scoped to the population filter or another variable; not an output column
    pub hidden: bool,
}

impl VariableDefinition {
    /// Every name this definition depends on, without repeats
    pub fn references(&self) -> Vec<String> {
        let mut names = self.query.references();
        names.extend(self.expectations.references());
        dedup(names)
    }

    /// Names whose absence makes this variable absent in synthetic data
    ///
    /// These are the names in the query's dates and windows and in the
    /// synthetic date bounds. Anchors may appear here.
    pub fn conditioning_references(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .query
            .dates()
            .into_iter()
            .filter_map(DateExpr::root_reference)
            .map(str::to_string)
            .collect();
        names.extend(self.expectations.references());
        dedup(names)
    }
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(names.len());
    for name in names {
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use studydef_types::DateUnit;

    #[test]
    fn test_returning_aliases() {
        assert_eq!(VariableKind::from_returning("date_of_death"), Some(VariableKind::Date));
        assert_eq!(VariableKind::from_returning("date_admitted"), Some(VariableKind::Date));
        assert_eq!(VariableKind::from_returning("group_6"), Some(VariableKind::Category));
        assert_eq!(VariableKind::from_returning("binary"), None);
    }

    #[test]
    fn test_references_and_conditioning() {
        let definition = VariableDefinition {
            name: "sub_cat_covid19_hospital".into(),
            query: Query::GpConsultations {
                window: WindowSpec::Between(
                    DateExpr::reference("exp_date_covid19_confirmed"),
                    DateExpr::reference("exp_date_covid19_confirmed").offset(28, DateUnit::Days),
                ),
            },
            kind: VariableKind::Flag,
            find: FindMatch::First,
            expectations: SyntheticValueSpec {
                date: Some(DateBounds {
                    earliest: DateExpr::reference("index_date"),
                    latest: DateExpr::reference("today"),
                }),
                ..SyntheticValueSpec::default()
            },
            hidden: false,
        };
        assert_eq!(
            definition.references(),
            vec!["exp_date_covid19_confirmed", "index_date", "today"]
        );
        assert_eq!(definition.conditioning_references(), definition.references());
    }

    #[test]
    fn test_satisfying_references_are_not_conditioning() {
        let definition = VariableDefinition {
            name: "registered".into(),
            query: Query::Satisfying {
                expression: Expression::ident("registered_at_start"),
            },
            kind: VariableKind::Flag,
            find: FindMatch::First,
            expectations: SyntheticValueSpec::default(),
            hidden: true,
        };
        assert_eq!(definition.references(), vec!["registered_at_start"]);
        assert!(definition.conditioning_references().is_empty());
    }

    #[test]
    fn test_absent_values() {
        assert_eq!(VariableKind::Flag.absent_value(), Value::Boolean(false));
        assert_eq!(VariableKind::Count.absent_value(), Value::Integer(0));
        assert_eq!(VariableKind::Date.absent_value(), Value::Null);
    }
}
