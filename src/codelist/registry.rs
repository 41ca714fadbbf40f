//! Codelist registry
//!
//! Resolves codelist names to loaded codelists. A study definition asks the
//! registry for every codelist it uses, so a missing file or name surfaces
//! as a definition error before any data is read.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::codelist::{CodeSystem, Codelist, codelist_from_csv};
use crate::error::{Result, StudyError};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Where and how to load one codelist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodelistSpec {
    /// Name the study refers to
    pub name: &'static str,
    /// CSV file relative to the codelist directory
    pub file: &'static str,
    /// Coding system
    pub system: CodeSystem,
    /// Header of the code column
    pub column: &'static str,
    /// Header of the category column
    pub category_column: Option<&'static str>,
}

/// Name to codelist lookup
#[derive(Debug, Clone, Default)]
pub struct CodelistRegistry {
    lists: BTreeMap<String, Arc<Codelist>>,
}

impl CodelistRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every codelist in `specs` from `dir`
    pub fn load_from_dir(dir: &Path, specs: &[CodelistSpec]) -> Result<Self> {
        let start = std::time::Instant::now();
        log_operation_start("Loading codelists from", dir);

        let mut registry = Self::new();
        for spec in specs {
            let path = dir.join(spec.file);
            let list = codelist_from_csv(&path, spec.system, spec.column, spec.category_column)
                .map_err(|e| match e {
                    StudyError::IoError { .. } => StudyError::codelist(
                        spec.name,
                        format!("cannot read {}", path.display()),
                    ),
                    other => other,
                })?;
            if list.is_empty() {
                log::warn!("Codelist {} loaded from {} is empty", spec.name, path.display());
            }
            registry.insert(spec.name, list);
        }

        log_operation_complete("loaded", dir, registry.len(), Some(start.elapsed()));
        Ok(registry)
    }

    /// Register a codelist under `name`, replacing any previous one
    pub fn insert(&mut self, name: &str, list: Arc<Codelist>) {
        self.lists.insert(name.to_string(), list);
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with(mut self, name: &str, list: Arc<Codelist>) -> Self {
        self.insert(name, list);
        self
    }

    /// Look up a codelist by name
    pub fn get(&self, name: &str) -> Result<Arc<Codelist>> {
        self.lists
            .get(name)
            .cloned()
            .ok_or_else(|| StudyError::UnknownCodelist(name.to_string()))
    }

    /// Names of all registered codelists
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.lists.keys().map(String::as_str)
    }

    /// Number of registered codelists
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
