//! Study definition file format
//!
//! A study definition is a JSON document. Object keys keep their authoring
//! order, and maps whose keys become names (variables, codelists, category
//! ratios) are read as ordered entry lists so a repeated key is reported
//! instead of silently overwritten.

use chrono::NaiveDate;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

/// Top-level study definition document
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyFile {
    pub index_date: NaiveDate,
    /// Date of extraction; the current date when omitted
    #[serde(default)]
    pub today: Option<NaiveDate>,
    /// Extra named dates usable in date expressions
    #[serde(default, deserialize_with = "ordered_entries")]
    pub anchors: Vec<(String, NaiveDate)>,
    #[serde(default)]
    pub default_expectations: ExpectationsSpec,
    #[serde(default, deserialize_with = "ordered_entries")]
    pub codelists: Vec<(String, CodelistSpec)>,
    #[serde(default)]
    pub population: Option<PopulationSpec>,
    #[serde(default, deserialize_with = "ordered_entries")]
    pub variables: Vec<(String, VariableSpec)>,
}

/// How a named codelist is obtained
///
/// Combinations and filters may only name codelists declared before them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CodelistSpec {
    /// Codes read from a CSV file, relative to the study file
    Csv {
        csv: PathBuf,
        system: String,
        column: String,
        #[serde(default)]
        category_column: Option<String>,
    },
    Combine {
        combine: Vec<String>,
    },
    Filter {
        filter: String,
        categories: Vec<String>,
    },
    Inline {
        system: String,
        codes: Vec<String>,
    },
}

/// Population filter with its scoped variables
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopulationSpec {
    pub expression: String,
    #[serde(default, deserialize_with = "ordered_entries")]
    pub variables: Vec<(String, VariableSpec)>,
}

/// One variable as authored
///
/// Parameters are flat; which of them a query accepts is checked when the
/// study is compiled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableSpec {
    pub query: String,
    pub date: Option<String>,
    pub on_or_before: Option<String>,
    pub on_or_after: Option<String>,
    pub between: Option<[String; 2]>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub codelist: Option<String>,
    pub with_these_diagnoses: Option<String>,
    pub with_these_primary_diagnoses: Option<String>,
    pub pathogen: Option<String>,
    pub test_result: Option<String>,
    pub target_disease_matches: Option<String>,
    pub returning: Option<String>,
    pub find_first_match_in_period: Option<bool>,
    pub find_last_match_in_period: Option<bool>,
    pub use_most_frequent_code: Option<bool>,
    pub date_format: Option<String>,
    pub expression: Option<String>,
    pub rules: Option<Vec<RuleSpec>>,
    #[serde(default, deserialize_with = "ordered_entries")]
    pub variables: Vec<(String, VariableSpec)>,
    pub return_expectations: Option<ExpectationsSpec>,
}

impl VariableSpec {
    /// Names of the optional parameters that were given
    pub fn present_parameters(&self) -> Vec<&'static str> {
        let given = [
            ("date", self.date.is_some()),
            ("on_or_before", self.on_or_before.is_some()),
            ("on_or_after", self.on_or_after.is_some()),
            ("between", self.between.is_some()),
            ("start_date", self.start_date.is_some()),
            ("end_date", self.end_date.is_some()),
            ("codelist", self.codelist.is_some()),
            ("with_these_diagnoses", self.with_these_diagnoses.is_some()),
            (
                "with_these_primary_diagnoses",
                self.with_these_primary_diagnoses.is_some(),
            ),
            ("pathogen", self.pathogen.is_some()),
            ("test_result", self.test_result.is_some()),
            ("target_disease_matches", self.target_disease_matches.is_some()),
            ("returning", self.returning.is_some()),
            (
                "find_first_match_in_period",
                self.find_first_match_in_period.is_some(),
            ),
            (
                "find_last_match_in_period",
                self.find_last_match_in_period.is_some(),
            ),
            ("use_most_frequent_code", self.use_most_frequent_code.is_some()),
            ("date_format", self.date_format.is_some()),
            ("expression", self.expression.is_some()),
            ("rules", self.rules.is_some()),
            ("variables", !self.variables.is_empty()),
        ];
        given
            .into_iter()
            .filter_map(|(name, present)| present.then_some(name))
            .collect()
    }
}

/// One categorisation rule: `{"label": "...", "when": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub label: String,
    pub when: String,
}

/// Synthetic value expectations as authored
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectationsSpec {
    pub date: Option<DateBoundsSpec>,
    pub rate: Option<RateSpec>,
    pub incidence: Option<f64>,
    pub category: Option<CategorySpec>,
    pub int: Option<IntSpec>,
}

impl ExpectationsSpec {
    /// Fill every key missing here from `defaults`
    ///
    /// Keys are merged one level deep: a variable's own `date` replaces the
    /// default `date` as a whole.
    pub fn merged_over(&self, defaults: &ExpectationsSpec) -> ExpectationsSpec {
        ExpectationsSpec {
            date: self.date.clone().or_else(|| defaults.date.clone()),
            rate: self.rate.or(defaults.rate),
            incidence: self.incidence.or(defaults.incidence),
            category: self.category.clone().or_else(|| defaults.category.clone()),
            int: self.int.clone().or_else(|| defaults.int.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateBoundsSpec {
    pub earliest: String,
    pub latest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSpec {
    Uniform,
    ExponentialIncrease,
    Universal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySpec {
    #[serde(deserialize_with = "ordered_entries")]
    pub ratios: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntSpec {
    pub distribution: String,
    #[serde(default)]
    pub mean: Option<f64>,
}

/// Read a JSON object as its `(key, value)` entries, in document order,
/// keeping repeated keys
fn ordered_entries<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct EntriesVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a JSON object")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, T>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor(PhantomData))
}
