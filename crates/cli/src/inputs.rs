//! File-backed collaborators: the catalog file, the exclusion list and
//! the registry credential.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use taxalign_recon::exclusions::{load_exclusions, ExclusionSet};
use taxalign_recon::registry::{parse_catalog, CatalogSource};
use taxalign_recon::TaxalignError;

use crate::CliError;

/// Catalog Source read from a local file on demand.
pub struct FileCatalog {
    path: PathBuf,
    column: Option<String>,
}

impl FileCatalog {
    pub fn new(path: PathBuf, column: Option<String>) -> Self {
        Self { path, column }
    }

    /// Fail early, before anything is looked up or written.
    pub fn check_readable(&self) -> Result<(), CliError> {
        std::fs::metadata(&self.path)
            .map(|_| ())
            .map_err(|e| CliError::config(format!("cannot read catalog {}: {e}", self.path.display())))
    }
}

impl CatalogSource for FileCatalog {
    fn list_distinct_names(&self) -> Result<BTreeSet<String>, TaxalignError> {
        let label = self.path.display().to_string();
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| TaxalignError::Catalog(format!("cannot read {label}: {e}")))?;
        parse_catalog(&label, &data, self.column.as_deref())
    }
}

/// Load the exclusion list. A configured but unreadable list is fatal.
pub fn read_exclusions(path: &Path, column: &str) -> Result<ExclusionSet, CliError> {
    let label = path.display().to_string();
    let data = std::fs::read_to_string(path)
        .map_err(|e| CliError::config(format!("cannot read exclusion list {label}: {e}")))?;
    load_exclusions(&label, &data, column).map_err(|e| CliError::config(e.to_string()))
}

/// Read the registry credential from the environment.
pub fn resolve_api_key(env_var: &str) -> Result<String, CliError> {
    if let Ok(key) = std::env::var(env_var) {
        let trimmed = key.trim().to_string();
        if !trimmed.is_empty() {
            return Ok(trimmed);
        }
    }

    Err(CliError::config(format!("missing registry API key (set {env_var})"))
        .with_hint(format!("export {env_var}=<subscription key>")))
}
