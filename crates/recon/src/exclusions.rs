use std::collections::BTreeSet;

use crate::error::TaxalignError;
use crate::model::TaxonId;
use crate::registry::sniff_delimiter;

/// Taxon identifiers suppressed for the whole run, regardless of match
/// quality. Loaded once and never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    ids: BTreeSet<TaxonId>,
}

impl ExclusionSet {
    pub fn contains(&self, id: &TaxonId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<TaxonId> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = TaxonId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Load an exclusion table (TSV or CSV, header required) keyed by `column`.
/// Blank cells are skipped; other columns are ignored.
pub fn load_exclusions(
    source: &str,
    data: &str,
    column: &str,
) -> Result<ExclusionSet, TaxalignError> {
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

    let mut ids = BTreeSet::new();
    for record in reader.records() {
        let record = record.map_err(|e| TaxalignError::Io(format!("{source}: {e}")))?;
        match record.get(idx).map(str::trim) {
            Some(value) if !value.is_empty() => {
                ids.insert(TaxonId::new(value));
            }
            _ => {}
        }
    }

    log::debug!("{source}: {} excluded taxon ids", ids.len());
    Ok(ExclusionSet { ids })
}
