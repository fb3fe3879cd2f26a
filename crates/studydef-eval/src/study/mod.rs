//! Study definitions: file format, compilation and the compiled study
//!
//! A [`Study`] is built once from a study definition file and is immutable
//! afterwards. Building loads every codelist, compiles every variable into a
//! typed [`VariableDefinition`], checks references and orders the variables
//! so each one follows the variables it reads. Any failure here is fatal and
//! happens before a single patient is processed.

mod compile;
mod definition;
mod format;

pub use definition::*;
pub use format::{
    CategorySpec, CodelistSpec, DateBoundsSpec, ExpectationsSpec, IntSpec, PopulationSpec,
    RateSpec, RuleSpec, StudyFile, VariableSpec,
};

use crate::context::Anchors;
use crate::error::{BuildError, BuildResult};
use crate::graph::DependencyGraph;
use compile::Compiler;
use indexmap::IndexMap;
use std::path::Path;
use studydef_ast::{DateExpr, Expression};
use studydef_diagnostics::Diagnostic;
use studydef_model::{Codelist, CodelistStore, CodingSystem};

/// Name used in errors about the population filter
pub const POPULATION: &str = "population";

/// A compiled study definition
#[derive(Debug, Clone)]
pub struct Study {
    anchors: Anchors,
    codelists: CodelistStore,
    variables: IndexMap<String, VariableDefinition>,
    order: Vec<String>,
    population: Option<Expression>,
    lints: Vec<Diagnostic>,
}

impl Study {
    /// Read and compile a study definition file
    ///
    /// Codelist paths are resolved relative to the file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> BuildResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        log::info!("Building study {}", path.display());
        Self::from_json_str(&json, base_dir)
    }

    /// Compile a study definition held in memory
    pub fn from_json_str(json: &str, base_dir: &Path) -> BuildResult<Self> {
        let file: StudyFile = serde_json::from_str(json)?;
        Self::compile(&file, base_dir)
    }

    /// Compile a parsed study definition
    pub fn compile(file: &StudyFile, base_dir: &Path) -> BuildResult<Self> {
        let anchors = build_anchors(file)?;
        let codelists = load_codelists(file, base_dir)?;

        let mut compiler = Compiler::new(&anchors, &codelists, &file.default_expectations);
        let population = match &file.population {
            Some(population) => {
                for (name, spec) in &population.variables {
                    compiler.compile(name, spec, true)?;
                }
                Some(compile::predicate(POPULATION, &population.expression)?)
            }
            None => None,
        };
        for (name, spec) in &file.variables {
            compiler.compile(name, spec, false)?;
        }
        let Compiler {
            definitions: variables,
            lints,
            ..
        } = compiler;

        let mut graph = DependencyGraph::new();
        for definition in variables.values() {
            graph.add(definition.name.clone(), definition.references())?;
        }
        let order = graph.build(&anchors)?;
        check_date_references(&variables)?;

        if let Some(expression) = &population {
            if expression.is_default() {
                return Err(BuildError::invalid_parameters(
                    POPULATION,
                    "DEFAULT is only meaningful as a categorisation rule",
                ));
            }
            if let Some(reference) = expression
                .references()
                .into_iter()
                .find(|name| !variables.contains_key(name))
            {
                return Err(BuildError::UnknownReference {
                    variable: POPULATION.to_string(),
                    reference,
                });
            }
        }

        log::info!(
            "Study compiled: {} variables ({} output columns), {} codelists, {} warnings",
            variables.len(),
            variables.values().filter(|v| !v.hidden).count(),
            codelists.len(),
            lints.len()
        );

        Ok(Self {
            anchors,
            codelists,
            variables,
            order,
            population,
            lints,
        })
    }

    pub fn anchors(&self) -> &Anchors {
        &self.anchors
    }

    pub fn codelists(&self) -> &CodelistStore {
        &self.codelists
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.get(name)
    }

    /// Every definition, including scoped ones, in authoring order
    pub fn variables(&self) -> impl Iterator<Item = &VariableDefinition> {
        self.variables.values()
    }

    /// Definitions in evaluation order
    pub fn ordered(&self) -> impl Iterator<Item = &VariableDefinition> {
        self.order.iter().filter_map(|name| self.variables.get(name))
    }

    /// Variable names in evaluation order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Output column names in declaration order
    pub fn columns(&self) -> Vec<String> {
        self.variables
            .values()
            .filter(|definition| !definition.hidden)
            .map(|definition| definition.name.clone())
            .collect()
    }

    pub fn population(&self) -> Option<&Expression> {
        self.population.as_ref()
    }

    /// Warnings collected while building
    pub fn lints(&self) -> &[Diagnostic] {
        &self.lints
    }
}

/// Every date expression must be rooted at an anchor or a date variable
///
/// Anchor names cannot be variable names, so only variables are looked up.
fn check_date_references(variables: &IndexMap<String, VariableDefinition>) -> BuildResult<()> {
    let not_a_date = |root: &str| {
        variables
            .get(root)
            .filter(|target| target.kind != VariableKind::Date)
    };
    for definition in variables.values() {
        let query_roots = definition.query.dates().into_iter().filter_map(DateExpr::root_reference);
        if let Some(target) = query_roots.filter_map(not_a_date).next() {
            return Err(BuildError::invalid_parameters(
                &definition.name,
                format!("date refers to '{}', which returns {}, not a date", target.name, target.kind),
            ));
        }
        if let Some(target) = definition.expectations.references().iter().find_map(|r| not_a_date(r)) {
            return Err(BuildError::invalid_expectations(
                &definition.name,
                format!("date bound refers to '{}', which returns {}, not a date", target.name, target.kind),
            ));
        }
    }
    Ok(())
}

fn build_anchors(file: &StudyFile) -> BuildResult<Anchors> {
    let today = file
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let mut anchors = Anchors::new(file.index_date, today);
    for (name, date) in &file.anchors {
        if anchors.contains(name) {
            return Err(BuildError::InvalidAnchor {
                name: name.clone(),
                message: "anchor is defined more than once".to_string(),
            });
        }
        anchors.insert(name.clone(), *date);
    }
    Ok(anchors)
}

fn load_codelists(file: &StudyFile, base_dir: &Path) -> BuildResult<CodelistStore> {
    let mut store = CodelistStore::new();
    for (name, spec) in &file.codelists {
        let wrap = |source| BuildError::Codelist {
            name: name.clone(),
            source,
        };
        let codelist = match spec {
            CodelistSpec::Csv {
                csv,
                system,
                column,
                category_column,
            } => Codelist::from_csv_path(
                base_dir.join(csv),
                CodingSystem::from(system.as_str()),
                column,
                category_column.as_deref(),
            )
            .map_err(wrap)?,
            CodelistSpec::Combine { combine } => {
                let parts = combine
                    .iter()
                    .map(|part| store.require(part).map(|list| &**list))
                    .collect::<Result<Vec<&Codelist>, _>>()
                    .map_err(wrap)?;
                Codelist::combine(&parts).map_err(wrap)?
            }
            CodelistSpec::Filter { filter, categories } => {
                let categories: Vec<&str> = categories.iter().map(String::as_str).collect();
                store
                    .require(filter)
                    .map_err(wrap)?
                    .filter_by_category(&categories)
            }
            CodelistSpec::Inline { system, codes } => {
                Codelist::from_codes(CodingSystem::from(system.as_str()), codes.iter())
            }
        };
        log::debug!("Loaded codelist '{}' ({} codes)", name, codelist.len());
        store.insert(name.clone(), codelist).map_err(wrap)?;
    }
    Ok(store)
}
