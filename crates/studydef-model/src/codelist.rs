//! Codelists: named groupings of clinical codes
//!
//! A codelist is an ordered set of codes from one coding system, each code
//! optionally carrying a category (an ethnicity group, for example). Codelists
//! are loaded from CSV files, combined by union and filtered by category.
//! They are built once, collected into a [`CodelistStore`] and shared
//! read-only afterwards.

use indexmap::IndexMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studydef_diagnostics::{StudyError, SD0102, SD0103, SD0108, SD0401};
use thiserror::Error;

/// Coding system a codelist is drawn from
///
/// The tag is carried for documentation and to reject combinations across
/// systems; codes are never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CodingSystem {
    Icd10,
    Snomed,
    Ctv3,
    Other(String),
}

impl CodingSystem {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Icd10 => "icd10",
            Self::Snomed => "snomed",
            Self::Ctv3 => "ctv3",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for CodingSystem {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "icd10" => Self::Icd10,
            "snomed" | "snomedct" => Self::Snomed,
            "ctv3" => Self::Ctv3,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for CodingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codelist error
#[derive(Debug, Error)]
pub enum CodelistError {
    #[error("Failed to read codelist {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to read codelist CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed codelist: {0}")]
    Malformed(String),

    #[error("Cannot combine codelists from different systems ({first} and {other})")]
    MixedSystems {
        first: CodingSystem,
        other: CodingSystem,
    },

    #[error("Cannot combine an empty list of codelists")]
    EmptyCombination,

    #[error("Codelist '{0}' is defined more than once")]
    Duplicate(String),

    #[error("Unknown codelist '{0}'")]
    Unknown(String),
}

impl CodelistError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

impl From<CodelistError> for StudyError {
    fn from(err: CodelistError) -> Self {
        match &err {
            CodelistError::Read { .. } => StudyError::system(SD0401, err.to_string()),
            CodelistError::Duplicate(name) => {
                StudyError::build(SD0102, err.to_string()).with_context(name.clone())
            }
            CodelistError::Unknown(name) => {
                StudyError::build(SD0103, err.to_string()).with_context(name.clone())
            }
            CodelistError::Csv(_)
            | CodelistError::Malformed(_)
            | CodelistError::MixedSystems { .. }
            | CodelistError::EmptyCombination => StudyError::build(SD0108, err.to_string()),
        }
    }
}

/// A set of codes with optional categories, in insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codelist {
    system: CodingSystem,
    entries: IndexMap<String, Option<String>>,
}

impl Codelist {
    /// Create an empty codelist
    pub fn new(system: CodingSystem) -> Self {
        Self {
            system,
            entries: IndexMap::new(),
        }
    }

    /// Create an uncategorised codelist; repeated codes collapse
    pub fn from_codes<I, S>(system: CodingSystem, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new(system);
        for code in codes {
            list.entries.entry(code.into()).or_insert(None);
        }
        list
    }

    /// Create a codelist from `(code, category)` pairs
    pub fn from_entries<I, C, K>(system: CodingSystem, entries: I) -> Result<Self, CodelistError>
    where
        I: IntoIterator<Item = (C, Option<K>)>,
        C: Into<String>,
        K: Into<String>,
    {
        let mut list = Self::new(system);
        for (code, category) in entries {
            list.insert(code.into(), category.map(Into::into))?;
        }
        Ok(list)
    }

    /// Load a codelist from CSV data with a header row
    ///
    /// `code_column` names the column holding codes; `category_column`, when
    /// given, must exist and be filled in on every row.
    pub fn from_csv_reader<R: Read>(
        reader: R,
        system: CodingSystem,
        code_column: &str,
        category_column: Option<&str>,
    ) -> Result<Self, CodelistError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::from_csv(reader, system, code_column, category_column)
    }

    /// Load a codelist from a CSV file
    pub fn from_csv_path(
        path: impl AsRef<Path>,
        system: CodingSystem,
        code_column: &str,
        category_column: Option<&str>,
    ) -> Result<Self, CodelistError> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| CodelistError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let list = Self::from_csv(reader, system, code_column, category_column).map_err(
            |err| match err {
                CodelistError::Csv(source) => CodelistError::Read {
                    path: path.to_path_buf(),
                    source,
                },
                CodelistError::Malformed(reason) => {
                    CodelistError::Malformed(format!("{}: {}", path.display(), reason))
                }
                other => other,
            },
        )?;
        log::debug!(
            "Loaded {} codes ({}) from {}",
            list.len(),
            list.system,
            path.display()
        );
        Ok(list)
    }

    fn from_csv<R: Read>(
        mut reader: csv::Reader<R>,
        system: CodingSystem,
        code_column: &str,
        category_column: Option<&str>,
    ) -> Result<Self, CodelistError> {
        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| CodelistError::malformed(format!("column '{name}' not found")))
        };
        let code_idx = column(code_column)?;
        let category_idx = category_column.map(column).transpose()?;

        let mut list = Self::new(system);
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let line = row + 2;

            let code = record.get(code_idx).unwrap_or_default();
            if code.is_empty() {
                return Err(CodelistError::malformed(format!("empty code on line {line}")));
            }

            let category = match category_idx {
                Some(idx) => {
                    let category = record.get(idx).unwrap_or_default();
                    if category.is_empty() {
                        return Err(CodelistError::malformed(format!(
                            "empty category for code '{code}' on line {line}"
                        )));
                    }
                    Some(category.to_string())
                }
                None => None,
            };

            list.insert(code.to_string(), category).map_err(|err| match err {
                CodelistError::Malformed(reason) => {
                    CodelistError::Malformed(format!("{reason} (line {line})"))
                }
                other => other,
            })?;
        }
        Ok(list)
    }

    /// Add a code; an identical repeat is ignored, a conflicting one rejected
    fn insert(&mut self, code: String, category: Option<String>) -> Result<(), CodelistError> {
        match self.entries.get(&code) {
            Some(existing) if *existing == category => Ok(()),
            Some(existing) => Err(CodelistError::malformed(format!(
                "code '{}' listed with conflicting categories {} and {}",
                code,
                describe(existing.as_deref()),
                describe(category.as_deref())
            ))),
            None => {
                self.entries.insert(code, category);
                Ok(())
            }
        }
    }

    /// Union of codelists
    ///
    /// A code present in several inputs keeps the category from the first
    /// input, in argument order, that contains it. All inputs must share a
    /// coding system.
    pub fn combine(codelists: &[&Codelist]) -> Result<Self, CodelistError> {
        let first = codelists.first().ok_or(CodelistError::EmptyCombination)?;
        let mut combined = Self::new(first.system.clone());
        for list in codelists {
            if list.system != first.system {
                return Err(CodelistError::MixedSystems {
                    first: first.system.clone(),
                    other: list.system.clone(),
                });
            }
            for (code, category) in &list.entries {
                combined
                    .entries
                    .entry(code.clone())
                    .or_insert_with(|| category.clone());
            }
        }
        Ok(combined)
    }

    /// Codes whose category is one of `categories`
    pub fn filter_by_category(&self, categories: &[&str]) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(_, category)| {
                category
                    .as_deref()
                    .is_some_and(|category| categories.contains(&category))
            })
            .map(|(code, category)| (code.clone(), category.clone()))
            .collect();
        Self {
            system: self.system.clone(),
            entries,
        }
    }

    pub fn system(&self) -> &CodingSystem {
        &self.system
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a code is a member
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Category of a member code; `None` for non-members and uncategorised codes
    pub fn category_of(&self, code: &str) -> Option<&str> {
        self.entries.get(code).and_then(|category| category.as_deref())
    }

    /// Check whether any code carries a category
    pub fn has_categories(&self) -> bool {
        self.entries.values().any(Option::is_some)
    }

    /// Codes in insertion order
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(code, category)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(code, category)| (code.as_str(), category.as_deref()))
    }
}

fn describe(category: Option<&str>) -> String {
    category.map_or_else(|| "(none)".to_string(), |c| format!("'{c}'"))
}

/// Named codelists a study is compiled against
#[derive(Debug, Clone, Default)]
pub struct CodelistStore {
    lists: IndexMap<String, Arc<Codelist>>,
}

impl CodelistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codelist under a unique name
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        codelist: Codelist,
    ) -> Result<Arc<Codelist>, CodelistError> {
        let name = name.into();
        if self.lists.contains_key(&name) {
            return Err(CodelistError::Duplicate(name));
        }
        let codelist = Arc::new(codelist);
        self.lists.insert(name, Arc::clone(&codelist));
        Ok(codelist)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Codelist>> {
        self.lists.get(name)
    }

    /// Look up a codelist that must exist
    pub fn require(&self, name: &str) -> Result<&Arc<Codelist>, CodelistError> {
        self.lists
            .get(name)
            .ok_or_else(|| CodelistError::Unknown(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lists.contains_key(name)
    }

    /// Registered names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.lists.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ETHNICITY: &str = "Code,Description,Grouping_6\n\
                             XaJQv,White British,1\n\
                             XaJR3,Indian,3\n\
                             XaJRA,Caribbean,4\n";

    fn load(csv: &str, category: Option<&str>) -> Result<Codelist, CodelistError> {
        Codelist::from_csv_reader(csv.as_bytes(), CodingSystem::Ctv3, "Code", category)
    }

    #[test]
    fn test_load_with_categories() {
        let list = load(ETHNICITY, Some("Grouping_6")).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.category_of("XaJR3"), Some("3"));
        assert!(list.contains("XaJQv"));
        assert!(!list.contains("Y0000"));
        assert_eq!(list.codes().collect::<Vec<_>>(), vec!["XaJQv", "XaJR3", "XaJRA"]);
    }

    #[test]
    fn test_missing_code_column() {
        let err = Codelist::from_csv_reader(
            ETHNICITY.as_bytes(),
            CodingSystem::Ctv3,
            "code",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CodelistError::Malformed(ref msg) if msg.contains("'code'")));
    }

    #[test]
    fn test_missing_category_column() {
        let err = load(ETHNICITY, Some("Grouping_16")).unwrap_err();
        assert!(matches!(err, CodelistError::Malformed(_)));
    }

    #[test]
    fn test_empty_code_is_rejected() {
        let err = load("Code,Grouping_6\nXaJQv,1\n,2\n", Some("Grouping_6")).unwrap_err();
        assert!(matches!(err, CodelistError::Malformed(ref msg) if msg.contains("line 3")));
    }

    #[test]
    fn test_empty_category_is_rejected() {
        let err = load("Code,Grouping_6\nXaJQv,\n", Some("Grouping_6")).unwrap_err();
        assert!(matches!(err, CodelistError::Malformed(_)));
    }

    #[test]
    fn test_duplicates() {
        let list = load("Code,Grouping_6\nXaJQv,1\nXaJQv,1\n", Some("Grouping_6")).unwrap();
        assert_eq!(list.len(), 1);

        let err = load("Code,Grouping_6\nXaJQv,1\nXaJQv,2\n", Some("Grouping_6")).unwrap_err();
        assert!(matches!(err, CodelistError::Malformed(ref msg) if msg.contains("conflicting")));
    }

    #[test]
    fn test_uncategorised_codes() {
        let list = Codelist::from_codes(CodingSystem::Icd10, ["U071", "U072", "U071"]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.category_of("U071"), None);
        assert!(!list.has_categories());
    }

    #[test]
    fn test_combine_first_category_wins() {
        let a = Codelist::from_entries(CodingSystem::Snomed, [("1", Some("A")), ("2", Some("A"))])
            .unwrap();
        let b = Codelist::from_entries(CodingSystem::Snomed, [("2", Some("B")), ("3", Some("B"))])
            .unwrap();

        let combined = Codelist::combine(&[&a, &b]).unwrap();
        assert_eq!(
            combined.iter().collect::<Vec<_>>(),
            vec![("1", Some("A")), ("2", Some("A")), ("3", Some("B"))]
        );

        let reversed = Codelist::combine(&[&b, &a]).unwrap();
        assert_eq!(reversed.category_of("2"), Some("B"));
    }

    #[test]
    fn test_combine_rejects_mixed_systems() {
        let a = Codelist::from_codes(CodingSystem::Icd10, ["I26"]);
        let b = Codelist::from_codes(CodingSystem::Snomed, ["I26"]);
        assert!(matches!(
            Codelist::combine(&[&a, &b]),
            Err(CodelistError::MixedSystems { .. })
        ));
        assert!(matches!(
            Codelist::combine(&[]),
            Err(CodelistError::EmptyCombination)
        ));
    }

    #[test]
    fn test_filter_by_category() {
        let list = load(ETHNICITY, Some("Grouping_6")).unwrap();
        let filtered = list.filter_by_category(&["1", "4"]);
        assert_eq!(filtered.codes().collect::<Vec<_>>(), vec!["XaJQv", "XaJRA"]);
        assert_eq!(filtered.system(), &CodingSystem::Ctv3);
    }

    #[test]
    fn test_coding_system_names() {
        assert_eq!(CodingSystem::from("ICD10"), CodingSystem::Icd10);
        assert_eq!(CodingSystem::from("snomed"), CodingSystem::Snomed);
        assert_eq!(CodingSystem::from("read2").to_string(), "read2");
    }

    #[test]
    fn test_store() {
        let mut store = CodelistStore::new();
        store
            .insert("covid_codes", Codelist::from_codes(CodingSystem::Icd10, ["U071"]))
            .unwrap();

        assert!(matches!(
            store.insert("covid_codes", Codelist::new(CodingSystem::Icd10)),
            Err(CodelistError::Duplicate(_))
        ));
        assert!(store.require("covid_codes").unwrap().contains("U071"));
        assert!(matches!(store.require("pe_icd10"), Err(CodelistError::Unknown(_))));

        let err: StudyError = store.require("pe_icd10").unwrap_err().into();
        assert_eq!(err.code(), SD0103);
    }
}
