//! Synthetic dataset generation
//!
//! Values are drawn from each variable's return expectations, variable by
//! variable in dependency order, so a value can be conditioned on the values
//! drawn before it:
//!
//! 1. if a variable the query's dates or the date bounds refer to is null,
//!    the variable is absent
//! 2. presence is drawn with the variable's incidence
//! 3. a present value is drawn from the date bounds (clipped to the query
//!    window), the category ratios or the integer distribution
//!
//! `satisfying` variables, and `categorised_as` variables without ratios, are
//! computed from the values already drawn rather than sampled. Scoped helper
//! variables without expectations stay absent.
//!
//! Patient `i` draws from its own stream seeded by mixing `seed` and `i`, so
//! output is reproducible for a seed regardless of how rayon schedules the
//! patients, and nearby seeds do not share streams.

use crate::config::SyntheticConfig;
use crate::error::{SynthError, SynthResult};
use crate::sampling::{Categorical, exponential_date, poisson, population_age, uniform_date};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use studydef_ast::Expression;
use studydef_diagnostics::StudyError;
use studydef_eval::study::{DateBounds, IntDistribution, Query, Rate};
use studydef_eval::{
    Bindings, CategoryRule, EvalError, EvalResult, ExtractionReport, PatientOutcome, Study,
    VariableDefinition, VariableKind, evaluate_category, evaluate_filter, resolve, resolved_window,
    select_row,
};
use studydef_types::{PatientId, Value};

/// Seed of one patient's stream: a splitmix64 finaliser over the run seed
/// and the patient index
fn patient_seed(seed: u64, index: u64) -> u64 {
    let mut z = seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(index);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// How one variable's values are produced
#[derive(Debug, Clone)]
enum Plan {
    Date { bounds: DateBounds, rate: Rate },
    Present,
    Category(Categorical),
    Int(IntDistribution),
    Expression(Expression),
    Rules(Vec<CategoryRule>),
    /// Scoped helper without expectations; only its parent is generated
    Absent,
}

impl Plan {
    fn for_variable(definition: &VariableDefinition) -> SynthResult<Self> {
        let expectations = &definition.expectations;
        let missing = |needs| SynthError::MissingExpectations {
            variable: definition.name.clone(),
            needs,
        };

        match (&definition.query, definition.kind) {
            (Query::Satisfying { expression }, _) => return Ok(Self::Expression(expression.clone())),
            (Query::CategorisedAs { rules }, _) if expectations.category.is_none() => {
                return Ok(Self::Rules(rules.clone()));
            }
            _ => {}
        }

        match definition.kind {
            VariableKind::Flag => Ok(Self::Present),
            VariableKind::Date => {
                let bounds = expectations.date.clone().ok_or_else(|| missing("date bounds"))?;
                Ok(Self::Date {
                    bounds,
                    rate: expectations.rate,
                })
            }
            VariableKind::Category => {
                let ratios = expectations
                    .category
                    .as_deref()
                    .ok_or_else(|| missing("category ratios"))?;
                let categorical = Categorical::new(ratios).map_err(|e| SynthError::InvalidRatios {
                    variable: definition.name.clone(),
                    message: e.to_string(),
                })?;
                Ok(Self::Category(categorical))
            }
            VariableKind::Count | VariableKind::Numeric => expectations
                .int
                .map(Self::Int)
                .ok_or_else(|| missing("an int distribution")),
        }
    }
}

/// Draws synthetic patients for a compiled study
#[derive(Debug, Clone)]
pub struct Generator {
    study: Arc<Study>,
    config: SyntheticConfig,
    seed: u64,
    plans: IndexMap<String, Plan>,
}

impl Generator {
    /// Check that every variable can be generated and prepare its sampler
    pub fn new(study: Arc<Study>, config: SyntheticConfig) -> SynthResult<Self> {
        let plans = study
            .ordered()
            .map(|definition| -> SynthResult<(String, Plan)> {
                let plan = match Plan::for_variable(definition) {
                    Err(SynthError::MissingExpectations { .. }) if definition.hidden => {
                        log::debug!("'{}' has no expectations and is left absent", definition.name);
                        Plan::Absent
                    }
                    plan => plan?,
                };
                Ok((definition.name.clone(), plan))
            })
            .collect::<SynthResult<IndexMap<_, _>>>()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        log::debug!("Prepared {} samplers with seed {}", plans.len(), seed);
        Ok(Self {
            study,
            config,
            seed,
            plans,
        })
    }

    /// Seed in effect, including a randomly drawn one
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    /// Draw every variable for the patient at `index`
    pub fn bind(&self, index: u64) -> EvalResult<Bindings> {
        let mut rng = StdRng::seed_from_u64(patient_seed(self.seed, index));
        let mut bindings = Bindings::new();
        for definition in self.study.ordered() {
            let value = self.draw(definition, &bindings, &mut rng)?;
            bindings.set(definition.name.clone(), value);
        }
        Ok(bindings)
    }

    /// Generate the whole dataset
    pub fn generate(&self) -> ExtractionReport {
        let size = self.config.population_size as u64;
        log::info!("Generating {} synthetic patients (seed {})", size, self.seed);

        let outcomes: Vec<(PatientId, Result<PatientOutcome, StudyError>)> = (0..size)
            .into_par_iter()
            .map(|index| {
                let id = PatientId(index + 1);
                let outcome = self
                    .bind(index)
                    .and_then(|bindings| {
                        select_row(&self.study, id, &bindings, self.config.apply_population)
                    })
                    .map_err(StudyError::from);
                (id, outcome)
            })
            .collect();

        ExtractionReport::from_outcomes(self.study.columns(), outcomes)
    }

    fn draw(
        &self,
        definition: &VariableDefinition,
        bindings: &Bindings,
        rng: &mut StdRng,
    ) -> EvalResult<Value> {
        let absent = definition.kind.absent_value();
        let conditioned_out = definition
            .conditioning_references()
            .iter()
            .any(|name| bindings.get(name).is_some_and(Value::is_null));
        if conditioned_out {
            return Ok(absent);
        }

        let plan = self
            .plans
            .get(&definition.name)
            .ok_or_else(|| EvalError::internal(format!("no sampler for '{}'", definition.name)))?;

        match plan {
            Plan::Expression(expression) => {
                return Ok(Value::Boolean(evaluate_filter(expression, bindings)?));
            }
            Plan::Rules(rules) => {
                return Ok(evaluate_category(rules, bindings)?.map_or(absent, Value::Text));
            }
            Plan::Absent => return Ok(absent),
            _ => {}
        }

        if !rng.random_bool(definition.expectations.incidence) {
            return Ok(absent);
        }

        Ok(match plan {
            Plan::Date { bounds, rate } => self
                .draw_date(definition, bounds, *rate, bindings, rng)?
                .map_or(absent, Value::Date),
            Plan::Present => Value::Boolean(true),
            Plan::Category(categorical) => Value::from(categorical.sample(rng)),
            Plan::Int(IntDistribution::Poisson { mean }) => Value::Integer(poisson(rng, *mean)),
            Plan::Int(IntDistribution::PopulationAges) => Value::Integer(population_age(rng)),
            Plan::Expression(_) | Plan::Rules(_) | Plan::Absent => absent,
        })
    }

    /// A date inside both the expectation bounds and the query window
    fn draw_date(
        &self,
        definition: &VariableDefinition,
        bounds: &DateBounds,
        rate: Rate,
        bindings: &Bindings,
        rng: &mut StdRng,
    ) -> EvalResult<Option<chrono::NaiveDate>> {
        let anchors = self.study.anchors();
        let (Some(earliest), Some(latest)) = (
            resolve(&bounds.earliest, anchors, bindings)?,
            resolve(&bounds.latest, anchors, bindings)?,
        ) else {
            return Ok(None);
        };
        let Some(window) = resolved_window(definition, anchors, bindings)? else {
            return Ok(None);
        };

        let lower = window.start.map_or(earliest, |start| start.max(earliest));
        let upper = window.end.map_or(latest, |end| end.min(latest));
        Ok(match rate {
            Rate::ExponentialIncrease => exponential_date(rng, lower, upper),
            Rate::Uniform | Rate::Universal => uniform_date(rng, lower, upper),
        })
    }
}
