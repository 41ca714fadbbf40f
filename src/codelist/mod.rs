//! Codelists
//!
//! A codelist is an immutable, named set of clinical codes from a single
//! coding system, optionally carrying a category label per code (smoking
//! status, ethnicity group). Codelists are loaded once while a study
//! definition is built and shared behind `Arc` afterwards.

pub mod registry;

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};

pub use registry::{CodelistRegistry, CodelistSpec};

/// Coding system a codelist is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeSystem {
    /// Clinical Terms Version 3 (Read v3)
    Ctv3,
    /// SNOMED CT
    Snomed,
    /// NHS Dictionary of medicines and devices
    Dmd,
    /// ICD-10
    Icd10,
    /// OPCS-4
    Opcs4,
}

impl CodeSystem {
    /// Name used in codelist metadata
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ctv3 => "ctv3",
            Self::Snomed => "snomed",
            Self::Dmd => "dmd",
            Self::Icd10 => "icd10",
            Self::Opcs4 => "opcs4",
        }
    }
}

impl fmt::Display for CodeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A code with its optional category label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntry {
    /// The code
    pub code: String,
    /// Category label, when the codelist is categorised
    pub category: Option<String>,
}

/// An immutable named set of clinical codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codelist {
    name: String,
    system: CodeSystem,
    entries: Vec<CodeEntry>,
    index: FxHashMap<String, usize>,
}

impl Codelist {
    fn from_entries(name: String, system: CodeSystem, raw: Vec<CodeEntry>) -> Self {
        let mut entries = Vec::with_capacity(raw.len());
        let mut index = FxHashMap::default();
        for entry in raw {
            if entry.code.is_empty() || index.contains_key(&entry.code) {
                continue;
            }
            index.insert(entry.code.clone(), entries.len());
            entries.push(entry);
        }
        Self {
            name,
            system,
            entries,
            index,
        }
    }

    /// Codelist name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Coding system
    #[must_use]
    pub fn system(&self) -> CodeSystem {
        self.system
    }

    /// Entries in declaration order
    #[must_use]
    pub fn entries(&self) -> &[CodeEntry] {
        &self.entries
    }

    /// Number of codes
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the codelist holds no codes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `code` is in this codelist
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    /// Category of `code`, if the code is present and categorised
    #[must_use]
    pub fn category_of(&self, code: &str) -> Option<&str> {
        self.index
            .get(code)
            .and_then(|&i| self.entries[i].category.as_deref())
    }

    /// Whether any code carries a category
    #[must_use]
    pub fn is_categorised(&self) -> bool {
        self.entries.iter().any(|e| e.category.is_some())
    }

    /// Distinct categories in first-seen order
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut seen = Vec::<String>::new();
        for category in self.entries.iter().filter_map(|e| e.category.as_ref()) {
            if !seen.contains(category) {
                seen.push(category.clone());
            }
        }
        seen
    }
}

/// Build a codelist from literal codes
pub fn codelist<I, S>(name: &str, codes: I, system: CodeSystem) -> Arc<Codelist>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let entries = codes
        .into_iter()
        .map(|code| CodeEntry {
            code: code.into(),
            category: None,
        })
        .collect();
    Arc::new(Codelist::from_entries(name.to_string(), system, entries))
}

/// Build a categorised codelist from literal `(code, category)` pairs
pub fn categorised_codelist<I, S, C>(name: &str, codes: I, system: CodeSystem) -> Arc<Codelist>
where
    I: IntoIterator<Item = (S, C)>,
    S: Into<String>,
    C: Into<String>,
{
    let entries = codes
        .into_iter()
        .map(|(code, category)| CodeEntry {
            code: code.into(),
            category: Some(category.into()),
        })
        .collect();
    Arc::new(Codelist::from_entries(name.to_string(), system, entries))
}

/// Load a codelist from a CSV file with a header row
///
/// # Arguments
/// * `path` - CSV file
/// * `system` - Coding system of the codes
/// * `column` - Header of the code column
/// * `category_column` - Header of the category column, for categorised lists
pub fn codelist_from_csv(
    path: &Path,
    system: CodeSystem,
    column: &str,
    category_column: Option<&str>,
) -> Result<Arc<Codelist>> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("codelist")
        .to_string();
    let file = std::fs::File::open(path).map_err(|e| StudyError::io(path, e))?;
    codelist_from_reader(&name, file, system, column, category_column)
}

/// Load a codelist from any CSV reader; see [`codelist_from_csv`]
pub fn codelist_from_reader<R: Read>(
    name: &str,
    reader: R,
    system: CodeSystem,
    column: &str,
    category_column: Option<&str>,
) -> Result<Arc<Codelist>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let code_idx = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| StudyError::codelist(name, format!("missing column '{column}'")))?;
    let category_idx = match category_column {
        Some(col) => Some(
            headers
                .iter()
                .position(|h| h == col)
                .ok_or_else(|| StudyError::codelist(name, format!("missing column '{col}'")))?,
        ),
        None => None,
    };

    let mut entries = Vec::new();
    for row in csv_reader.records() {
        let row = row?;
        let code = row.get(code_idx).unwrap_or_default().to_string();
        if code.is_empty() {
            continue;
        }
        let category = category_idx
            .and_then(|i| row.get(i))
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        entries.push(CodeEntry { code, category });
    }

    log::debug!("Loaded codelist {name} with {} rows", entries.len());
    Ok(Arc::new(Codelist::from_entries(
        name.to_string(),
        system,
        entries,
    )))
}

/// Union of several codelists from the same coding system
pub fn combine_codelists(name: &str, lists: &[&Arc<Codelist>]) -> Result<Arc<Codelist>> {
    let Some(first) = lists.first() else {
        return Err(StudyError::codelist(name, "nothing to combine"));
    };
    let system = first.system();
    if let Some(other) = lists.iter().find(|l| l.system() != system) {
        return Err(StudyError::codelist(
            name,
            format!(
                "cannot combine {} codelist '{}' with {} codelist '{}'",
                other.system(),
                other.name(),
                system,
                first.name()
            ),
        ));
    }
    let entries = lists
        .iter()
        .flat_map(|l| l.entries().iter().cloned())
        .collect();
    Ok(Arc::new(Codelist::from_entries(
        name.to_string(),
        system,
        entries,
    )))
}

/// Keep only the codes whose category is in `include`
pub fn filter_codes_by_category(list: &Arc<Codelist>, include: &[&str]) -> Arc<Codelist> {
    let entries = list
        .entries()
        .iter()
        .filter(|e| e.category.as_deref().is_some_and(|c| include.contains(&c)))
        .cloned()
        .collect();
    let name = format!("{}[{}]", list.name(), include.join(","));
    Arc::new(Codelist::from_entries(name, list.system(), entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMOKING_CSV: &str = "\
CTV3Code,Description,Category
1371.,Never smoked tobacco,N
137J.,Cigar smoker,S
137S.,Ex smoker,E
137R.,Current smoker,S
137R.,Current smoker duplicate,E
,blank row,N
";

    #[test]
    fn test_codelist_from_reader_with_categories() {
        let list = codelist_from_reader(
            "smoking",
            SMOKING_CSV.as_bytes(),
            CodeSystem::Ctv3,
            "CTV3Code",
            Some("Category"),
        )
        .unwrap();

        assert_eq!(list.len(), 4);
        assert!(list.contains("137S."));
        assert_eq!(list.category_of("137R."), Some("S"));
        assert_eq!(list.categories(), vec!["N", "S", "E"]);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let err = codelist_from_reader(
            "smoking",
            SMOKING_CSV.as_bytes(),
            CodeSystem::Ctv3,
            "snomed_id",
            None,
        )
        .unwrap_err();
        assert!(err.is_definition_error());
    }

    #[test]
    fn test_filter_codes_by_category() {
        let list = codelist_from_reader(
            "smoking",
            SMOKING_CSV.as_bytes(),
            CodeSystem::Ctv3,
            "CTV3Code",
            Some("Category"),
        )
        .unwrap();
        let ever = filter_codes_by_category(&list, &["S", "E"]);
        assert_eq!(ever.len(), 3);
        assert!(!ever.contains("1371."));
        assert_eq!(ever.categories(), vec!["S", "E"]);
    }

    #[test]
    fn test_combine_codelists() {
        let a = codelist("a", ["Y20d1", "Y23f7"], CodeSystem::Ctv3);
        let b = codelist("b", ["Y23f7", "Y240b"], CodeSystem::Ctv3);
        let combined = combine_codelists("ab", &[&a, &b]).unwrap();
        assert_eq!(combined.len(), 3);
        assert!(combined.contains("Y240b"));

        let c = codelist("c", ["840539006"], CodeSystem::Snomed);
        assert!(combine_codelists("ac", &[&a, &c]).is_err());
    }
}
