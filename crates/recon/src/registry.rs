//! Collaborator interfaces: the Taxonomic Registry and the Catalog Source.
//!
//! The engine only talks to these traits. The HTTP registry and the file
//! catalog live in the CLI crate; tests use in-memory implementations.

use std::collections::BTreeSet;
use std::time::Instant;

use serde::Serialize;

use crate::config::{HierarchyConfig, RegistryConfig};
use crate::error::{RegistryError, TaxalignError};
use crate::model::{MatchCandidate, TaxonId, TaxonRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupOptions {
    pub return_all_candidates: bool,
    /// End of the batch. A lookup still retrying at this point gives up
    /// with [`RegistryError::DeadlineExceeded`].
    pub deadline: Option<Instant>,
}

impl From<&RegistryConfig> for LookupOptions {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            return_all_candidates: config.return_all_candidates,
            deadline: None,
        }
    }
}

/// Expansion flags for bulk record retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    pub include_synonyms: bool,
    pub include_descendants: bool,
    pub fill_missing_ancestors: bool,
}

impl From<&HierarchyConfig> for FetchOptions {
    fn from(config: &HierarchyConfig) -> Self {
        Self {
            include_synonyms: config.include_synonyms,
            include_descendants: config.include_descendants,
            fill_missing_ancestors: config.fill_missing_ancestors,
        }
    }
}

/// Authoritative taxonomic registry.
///
/// Implementations must be shareable across lookup worker threads.
pub trait TaxonRegistry: Send + Sync {
    /// Candidate matches for one name, best first. An empty list means no
    /// match, which is not an error.
    fn lookup(&self, name: &str, options: LookupOptions) -> Result<Vec<MatchCandidate>, RegistryError>;

    /// Full records for `ids` plus whatever the expansion flags pull in.
    fn fetch_records(
        &self,
        ids: &[TaxonId],
        options: FetchOptions,
    ) -> Result<Vec<TaxonRecord>, RegistryError>;
}

/// Source of the free-text names currently in use.
pub trait CatalogSource {
    fn list_distinct_names(&self) -> Result<BTreeSet<String>, TaxalignError>;
}

/// Parse catalog data: one name per line, or a delimited table with a
/// header row when `column` is given.
pub fn parse_catalog(
    source: &str,
    data: &str,
    column: Option<&str>,
) -> Result<BTreeSet<String>, TaxalignError> {
    let Some(column) = column else {
        return Ok(data
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect());
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(sniff_delimiter(data))
        .flexible(true)
        .from_reader(data.as_bytes());

    let idx = reader
        .headers()
        .map_err(|e| TaxalignError::Io(format!("{source}: {e}")))?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| TaxalignError::MissingColumn {
            source: source.into(),
            column: column.into(),
        })?;

    let mut names = BTreeSet::new();
    for record in reader.records() {
        let record = record.map_err(|e| TaxalignError::Io(format!("{source}: {e}")))?;
        if let Some(value) = record.get(idx) {
            if !value.trim().is_empty() {
                names.insert(value.to_string());
            }
        }
    }
    Ok(names)
}

/// Tab if the header line has one, comma otherwise.
pub(crate) fn sniff_delimiter(data: &str) -> u8 {
    match data.lines().next() {
        Some(header) if header.contains('\t') => b'\t',
        _ => b',',
    }
}
