//! Compilation of authored variables into typed definitions

use super::definition::{
    CARE_HOME_BINDINGS, CodelistRef, DateBounds, DiagnosisPosition, FindMatch, IntDistribution,
    Query, Rate, SyntheticValueSpec, TestOutcome, VariableDefinition, VariableKind,
};
use super::format::{ExpectationsSpec, RateSpec, RuleSpec, VariableSpec};
use crate::context::Anchors;
use crate::error::{BuildError, BuildResult};
use crate::predicate::{CategoryRule, lint_rules};
use crate::temporal::WindowSpec;
use indexmap::IndexMap;
use studydef_ast::{DateExpr, Expression};
use studydef_diagnostics::Diagnostic;
use studydef_model::CodelistStore;
use studydef_parser::{parse_date_expression, parse_predicate};

const RATIO_TOLERANCE: f64 = 0.01;

/// Largest count mean a synthetic sampler accepts
const MAX_POISSON_MEAN: f64 = 10_000.0;

const WINDOW: [&str; 3] = ["on_or_before", "on_or_after", "between"];
const EVENT_RETURNS: [&str; 4] = [
    "returning",
    "find_first_match_in_period",
    "find_last_match_in_period",
    "date_format",
];

/// Compiles variables one at a time into a shared namespace
pub(crate) struct Compiler<'a> {
    anchors: &'a Anchors,
    codelists: &'a CodelistStore,
    defaults: &'a ExpectationsSpec,
    pub(crate) definitions: IndexMap<String, VariableDefinition>,
    pub(crate) lints: Vec<Diagnostic>,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(
        anchors: &'a Anchors,
        codelists: &'a CodelistStore,
        defaults: &'a ExpectationsSpec,
    ) -> Self {
        Self {
            anchors,
            codelists,
            defaults,
            definitions: IndexMap::new(),
            lints: Vec::new(),
        }
    }

    /// Compile a variable and, before it, the variables scoped to it
    pub(crate) fn compile(&mut self, name: &str, spec: &VariableSpec, hidden: bool) -> BuildResult<()> {
        for (scoped_name, scoped) in &spec.variables {
            self.compile(scoped_name, scoped, true)?;
        }

        if self.definitions.contains_key(name) || self.anchors.contains(name) {
            return Err(BuildError::DuplicateName {
                name: name.to_string(),
            });
        }

        let (query, kinds) = self.query(name, spec)?;
        let kind = select_kind(name, spec, &query, kinds)?;
        let find = find_match(name, spec)?;
        if let Some(format) = &spec.date_format
            && format != "YYYY-MM-DD"
        {
            return Err(BuildError::invalid_parameters(
                name,
                format!("unsupported date_format '{format}'; only YYYY-MM-DD is produced"),
            ));
        }
        let expectations = self.expectations(name, spec, kind)?;

        log::debug!("Compiled '{}' as {} returning {}", name, query.name(), kind);
        self.definitions.insert(
            name.to_string(),
            VariableDefinition {
                name: name.to_string(),
                query,
                kind,
                find,
                expectations,
                hidden,
            },
        );
        Ok(())
    }

    /// Build the query and the kinds it may return, default first
    fn query(&mut self, name: &str, spec: &VariableSpec) -> BuildResult<(Query, &'static [VariableKind])> {
        use VariableKind::{Category, Count, Date, Flag, Numeric};

        let query = match spec.query.as_str() {
            "died_from_any_cause" => {
                accept(name, spec, &[&WINDOW, &["returning", "date_format"]])?;
                let window = self.window(name, spec)?;
                (Query::DiedFromAnyCause { window }, &[Flag, Date][..])
            }
            "with_death_recorded_in_primary_care" => {
                accept(name, spec, &[&WINDOW, &["returning", "date_format"]])?;
                let window = self.window(name, spec)?;
                (Query::DeathInPrimaryCare { window }, &[Flag, Date][..])
            }
            "registered_as_of" => {
                accept(name, spec, &[&["date", "returning"]])?;
                let date = self.required_date(name, "date", spec.date.as_deref())?;
                (Query::RegisteredAsOf { date }, &[Flag][..])
            }
            "registered_with_one_practice_between" => {
                accept(name, spec, &[&["start_date", "end_date", "returning"]])?;
                let start = self.required_date(name, "start_date", spec.start_date.as_deref())?;
                let end = self.required_date(name, "end_date", spec.end_date.as_deref())?;
                (Query::RegisteredWithOnePracticeBetween { start, end }, &[Flag][..])
            }
            "sex" => {
                accept(name, spec, &[&["returning"]])?;
                (Query::Sex, &[Category][..])
            }
            "age_as_of" => {
                accept(name, spec, &[&["date"]])?;
                let date = self.required_date(name, "date", spec.date.as_deref())?;
                (Query::AgeAsOf { date }, &[Numeric][..])
            }
            "with_test_result_in_sgss" => {
                accept(name, spec, &[&WINDOW, &EVENT_RETURNS, &["pathogen", "test_result"]])?;
                let pathogen = spec.pathogen.clone().ok_or_else(|| missing(name, "pathogen"))?;
                let outcome = match &spec.test_result {
                    None => TestOutcome::Any,
                    Some(result) => TestOutcome::parse(result).ok_or_else(|| {
                        BuildError::invalid_parameters(
                            name,
                            format!("test_result must be any, positive or negative, not '{result}'"),
                        )
                    })?,
                };
                let window = self.window(name, spec)?;
                (
                    Query::TestResult {
                        pathogen,
                        outcome,
                        window,
                    },
                    &[Flag, Date, Count][..],
                )
            }
            "admitted_to_hospital" => {
                accept(
                    name,
                    spec,
                    &[
                        &WINDOW,
                        &EVENT_RETURNS,
                        &["with_these_diagnoses", "with_these_primary_diagnoses"],
                    ],
                )?;
                let (codelist, position) = match (
                    &spec.with_these_diagnoses,
                    &spec.with_these_primary_diagnoses,
                ) {
                    (Some(_), Some(_)) => {
                        return Err(BuildError::invalid_parameters(
                            name,
                            "give only one of with_these_diagnoses and with_these_primary_diagnoses",
                        ));
                    }
                    (Some(list), None) => (Some(self.codelist(list)?), DiagnosisPosition::Any),
                    (None, Some(list)) => (Some(self.codelist(list)?), DiagnosisPosition::Primary),
                    (None, None) => (None, DiagnosisPosition::Any),
                };
                let window = self.window(name, spec)?;
                (
                    Query::AdmittedToHospital {
                        codelist,
                        position,
                        window,
                    },
                    &[Flag, Date, Count][..],
                )
            }
            "registered_practice_as_of" => {
                accept(name, spec, &[&["date", "returning"]])?;
                let date = self.required_date(name, "date", spec.date.as_deref())?;
                (Query::RegisteredPracticeAsOf { date }, &[Category][..])
            }
            "with_tpp_vaccination_record" => {
                accept(name, spec, &[&WINDOW, &EVENT_RETURNS, &["target_disease_matches"]])?;
                let window = self.window(name, spec)?;
                (
                    Query::Vaccination {
                        target_disease: spec.target_disease_matches.clone(),
                        window,
                    },
                    &[Flag, Date, Count][..],
                )
            }
            "with_these_clinical_events" => {
                accept(name, spec, &[&WINDOW, &EVENT_RETURNS, &["codelist"]])?;
                let list = spec.codelist.as_deref().ok_or_else(|| missing(name, "codelist"))?;
                let codelist = self.codelist(list)?;
                let window = self.window(name, spec)?;
                (
                    Query::ClinicalEvents { codelist, window },
                    &[Flag, Date, Count, Category][..],
                )
            }
            "with_gp_consultations" => {
                accept(name, spec, &[&WINDOW, &EVENT_RETURNS])?;
                let window = self.window(name, spec)?;
                (Query::GpConsultations { window }, &[Flag, Date, Count][..])
            }
            "with_ethnicity_from_sus" => {
                accept(name, spec, &[&["returning", "use_most_frequent_code"]])?;
                if spec.use_most_frequent_code == Some(false) {
                    return Err(BuildError::invalid_parameters(
                        name,
                        "only the most frequent code can be returned",
                    ));
                }
                (Query::EthnicityFromSus, &[Category][..])
            }
            "with_healthcare_worker_flag_on_covid_vaccine_record" => {
                accept(name, spec, &[&["returning"]])?;
                (Query::HealthcareWorker, &[Flag][..])
            }
            "care_home_status_as_of" => {
                accept(name, spec, &[&["date", "rules"]])?;
                let date = self.required_date(name, "date", spec.date.as_deref())?;
                let rules = self.rules(name, spec)?;
                for reference in rules.iter().flat_map(|rule| rule.predicate.references()) {
                    if !CARE_HOME_BINDINGS.contains(&reference.as_str()) {
                        return Err(BuildError::UnknownReference {
                            variable: name.to_string(),
                            reference,
                        });
                    }
                }
                (Query::CareHomeStatusAsOf { date, rules }, &[Category][..])
            }
            "categorised_as" => {
                accept(name, spec, &[&["rules", "variables"]])?;
                let rules = self.rules(name, spec)?;
                (Query::CategorisedAs { rules }, &[Category][..])
            }
            "satisfying" => {
                accept(name, spec, &[&["expression", "variables"]])?;
                let source = spec
                    .expression
                    .as_deref()
                    .ok_or_else(|| missing(name, "expression"))?;
                let expression = predicate(name, source)?;
                if expression.is_default() {
                    return Err(BuildError::invalid_parameters(
                        name,
                        "DEFAULT is only meaningful as a categorisation rule",
                    ));
                }
                (Query::Satisfying { expression }, &[Flag][..])
            }
            other => {
                return Err(BuildError::invalid_parameters(
                    name,
                    format!("unknown query '{other}'"),
                ));
            }
        };
        Ok(query)
    }

    fn window(&self, name: &str, spec: &VariableSpec) -> BuildResult<WindowSpec> {
        match (&spec.on_or_before, &spec.on_or_after, &spec.between) {
            (None, None, None) => Ok(WindowSpec::Unbounded),
            (Some(end), None, None) => Ok(WindowSpec::OnOrBefore(date_expression(name, end)?)),
            (None, Some(start), None) => Ok(WindowSpec::OnOrAfter(date_expression(name, start)?)),
            (None, None, Some([start, end])) => Ok(WindowSpec::Between(
                date_expression(name, start)?,
                date_expression(name, end)?,
            )),
            _ => Err(BuildError::invalid_parameters(
                name,
                "give only one of on_or_before, on_or_after and between",
            )),
        }
    }

    fn required_date(&self, name: &str, parameter: &str, source: Option<&str>) -> BuildResult<DateExpr> {
        let source = source.ok_or_else(|| missing(name, parameter))?;
        date_expression(name, source)
    }

    fn codelist(&self, list: &str) -> BuildResult<CodelistRef> {
        let codelist = self
            .codelists
            .require(list)
            .map_err(|source| BuildError::Codelist {
                name: list.to_string(),
                source,
            })?;
        Ok(CodelistRef {
            name: list.to_string(),
            codelist: codelist.clone(),
        })
    }

    /// Parse and lint an ordered rule list
    fn rules(&mut self, name: &str, spec: &VariableSpec) -> BuildResult<Vec<CategoryRule>> {
        let authored: &[RuleSpec] = spec.rules.as_deref().ok_or_else(|| missing(name, "rules"))?;
        if authored.is_empty() {
            return Err(BuildError::invalid_parameters(name, "rules must not be empty"));
        }
        let rules = authored
            .iter()
            .map(|rule| Ok(CategoryRule::new(rule.label.clone(), predicate(name, &rule.when)?)))
            .collect::<BuildResult<Vec<_>>>()?;

        for diagnostic in lint_rules(name, &rules) {
            if diagnostic.is_error() {
                return Err(BuildError::MultipleDefaults {
                    variable: name.to_string(),
                });
            }
            log::warn!("{}: {}", name, diagnostic.message);
            self.lints.push(diagnostic);
        }
        Ok(rules)
    }

    /// Merge expectations over the study defaults and validate them
    fn expectations(
        &self,
        name: &str,
        spec: &VariableSpec,
        kind: VariableKind,
    ) -> BuildResult<SyntheticValueSpec> {
        let merged = spec
            .return_expectations
            .as_ref()
            .map_or_else(|| self.defaults.clone(), |own| own.merged_over(self.defaults));

        let rate = match merged.rate {
            None | Some(RateSpec::Uniform) => Rate::Uniform,
            Some(RateSpec::ExponentialIncrease) => Rate::ExponentialIncrease,
            Some(RateSpec::Universal) => Rate::Universal,
        };
        let incidence = if rate == Rate::Universal {
            1.0
        } else {
            merged.incidence.unwrap_or(1.0)
        };
        if !(0.0..=1.0).contains(&incidence) {
            return Err(BuildError::invalid_expectations(
                name,
                format!("incidence {incidence} is outside [0, 1]"),
            ));
        }

        // Date bounds only shape date values; other kinds ignore the
        // study-wide default so it adds no dependencies.
        let date = match (&merged.date, kind) {
            (Some(bounds), VariableKind::Date) => Some(DateBounds {
                earliest: date_expression(name, &bounds.earliest)?,
                latest: date_expression(name, &bounds.latest)?,
            }),
            _ => None,
        };

        let category = match &merged.category {
            Some(category) => Some(validate_ratios(name, &category.ratios)?),
            None => None,
        };

        let int = match &merged.int {
            None => None,
            Some(int) => Some(match int.distribution.as_str() {
                "poisson" => {
                    let mean = int.mean.ok_or_else(|| {
                        BuildError::invalid_expectations(name, "poisson distribution needs a mean")
                    })?;
                    if !mean.is_finite() || mean < 0.0 {
                        return Err(BuildError::invalid_expectations(
                            name,
                            format!("poisson mean {mean} must be a non-negative number"),
                        ));
                    }
                    if mean > MAX_POISSON_MEAN {
                        return Err(BuildError::invalid_expectations(
                            name,
                            format!("poisson mean {mean} exceeds {MAX_POISSON_MEAN}"),
                        ));
                    }
                    IntDistribution::Poisson { mean }
                }
                "population_ages" => IntDistribution::PopulationAges,
                other => {
                    return Err(BuildError::invalid_expectations(
                        name,
                        format!("unknown int distribution '{other}'"),
                    ));
                }
            }),
        };

        Ok(SyntheticValueSpec {
            rate,
            incidence,
            date,
            category,
            int,
        })
    }
}

fn validate_ratios(name: &str, ratios: &[(String, f64)]) -> BuildResult<Vec<(String, f64)>> {
    if ratios.is_empty() {
        return Err(BuildError::invalid_expectations(name, "category ratios are empty"));
    }
    if let Some((label, ratio)) = ratios.iter().find(|(_, r)| !r.is_finite() || *r < 0.0) {
        return Err(BuildError::invalid_expectations(
            name,
            format!("ratio {ratio} for '{label}' must be a non-negative number"),
        ));
    }
    let total: f64 = ratios.iter().map(|(_, r)| r).sum();
    if (total - 1.0).abs() > RATIO_TOLERANCE {
        return Err(BuildError::invalid_expectations(
            name,
            format!("category ratios sum to {total:.3}, expected 1"),
        ));
    }
    Ok(ratios.to_vec())
}

/// Reject parameters outside the accepted groups
fn accept(name: &str, spec: &VariableSpec, groups: &[&[&str]]) -> BuildResult<()> {
    let unexpected = spec
        .present_parameters()
        .into_iter()
        .find(|given| !groups.iter().any(|group| group.contains(given)));
    match unexpected {
        Some(parameter) => Err(BuildError::invalid_parameters(
            name,
            format!("parameter '{parameter}' is not accepted by {}", spec.query),
        )),
        None => Ok(()),
    }
}

fn select_kind(
    name: &str,
    spec: &VariableSpec,
    query: &Query,
    allowed: &[VariableKind],
) -> BuildResult<VariableKind> {
    let kind = match &spec.returning {
        None => allowed.first().copied().ok_or_else(|| {
            BuildError::invalid_parameters(name, format!("{} returns nothing", query.name()))
        })?,
        Some(returning) => {
            let kind = VariableKind::from_returning(returning).ok_or_else(|| {
                BuildError::invalid_parameters(name, format!("unknown returning value '{returning}'"))
            })?;
            if !allowed.contains(&kind) {
                return Err(BuildError::invalid_parameters(
                    name,
                    format!("{} cannot return '{returning}'", query.name()),
                ));
            }
            kind
        }
    };

    if let (Query::ClinicalEvents { codelist, .. }, VariableKind::Category) = (query, kind)
        && !codelist.codelist.has_categories()
    {
        return Err(BuildError::invalid_parameters(
            name,
            format!("codelist '{}' has no categories to return", codelist.name),
        ));
    }
    Ok(kind)
}

fn find_match(name: &str, spec: &VariableSpec) -> BuildResult<FindMatch> {
    match (spec.find_first_match_in_period, spec.find_last_match_in_period) {
        (Some(true), Some(true)) => Err(BuildError::invalid_parameters(
            name,
            "find_first_match_in_period and find_last_match_in_period are exclusive",
        )),
        (_, Some(true)) => Ok(FindMatch::Last),
        _ => Ok(FindMatch::First),
    }
}

fn missing(name: &str, parameter: &str) -> BuildError {
    BuildError::invalid_parameters(name, format!("missing required parameter '{parameter}'"))
}

fn date_expression(name: &str, source: &str) -> BuildResult<DateExpr> {
    parse_date_expression(source).map_err(|source| BuildError::Expression {
        variable: name.to_string(),
        source,
    })
}

pub(crate) fn predicate(name: &str, source: &str) -> BuildResult<Expression> {
    parse_predicate(source).map_err(|source| BuildError::Expression {
        variable: name.to_string(),
        source,
    })
}
