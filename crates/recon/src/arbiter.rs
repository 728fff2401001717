//! Match arbitration: exclusion filtering, accepted identifiers, duplicate
//! detection and unmatched extraction.
//!
//! Each step is an independent function over the match records; none of
//! them depends on another's output except `accepted_ids`, which takes the
//! filtered list.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::DuplicateScope;
use crate::exclusions::ExclusionSet;
use crate::model::{DuplicateRow, ExcludedMatch, MatchRecord, TaxonId, UnmatchedRow};

#[derive(Debug, Default)]
pub struct ArbiterOutput {
    pub filtered: Vec<MatchRecord>,
    pub accepted: BTreeSet<TaxonId>,
    pub excluded: Vec<ExcludedMatch>,
    pub duplicates: Vec<DuplicateRow>,
    pub unmatched: Vec<UnmatchedRow>,
}

pub fn arbitrate(
    records: &[MatchRecord],
    exclusions: &ExclusionSet,
    scope: DuplicateScope,
) -> ArbiterOutput {
    let filtered = filter_excluded(records, exclusions);
    let accepted = accepted_ids(&filtered);
    ArbiterOutput {
        accepted,
        excluded: excluded_matches(records, exclusions),
        duplicates: problem_duplicates(records, scope),
        unmatched: unmatched(records),
        filtered,
    }
}

/// Records whose identifier is not on the Exclusion List. Unmatched records
/// pass through; they carry no identifier to exclude.
pub fn filter_excluded(records: &[MatchRecord], exclusions: &ExclusionSet) -> Vec<MatchRecord> {
    records
        .iter()
        .filter(|r| !r.taxon_id().is_some_and(|id| exclusions.contains(id)))
        .cloned()
        .collect()
}

/// The records removed by [`filter_excluded`].
pub fn excluded_matches(records: &[MatchRecord], exclusions: &ExclusionSet) -> Vec<ExcludedMatch> {
    records
        .iter()
        .filter_map(|r| {
            let id = r.taxon_id()?;
            exclusions.contains(id).then(|| ExcludedMatch {
                query_name: r.query_name().to_string(),
                taxon_id: id.clone(),
            })
        })
        .collect()
}

/// Distinct identifiers to retrieve.
pub fn accepted_ids(filtered: &[MatchRecord]) -> BTreeSet<TaxonId> {
    filtered.iter().filter_map(|r| r.taxon_id().cloned()).collect()
}

/// Records with no registry match.
pub fn unmatched(records: &[MatchRecord]) -> Vec<UnmatchedRow> {
    records
        .iter()
        .filter(|r| !r.is_matched())
        .map(|r| UnmatchedRow {
            query_name: r.query_name().to_string(),
        })
        .collect()
}

/// Naming conflicts that need a human decision.
///
/// 1. group by best match, keep groups with more than one row;
/// 2. within those, keep rows whose (best match, identifier) pair occurs
///    exactly once;
/// 3. group the survivors by valid name, keep groups with more than one
///    row.
///
/// Rows without a valid name cannot conflict over one and are dropped in
/// step 3. Output is grouped by valid name, then ordered by best match,
/// identifier and query name.
pub fn problem_duplicates(records: &[MatchRecord], scope: DuplicateScope) -> Vec<DuplicateRow> {
    let rows = duplicate_rows(records, scope);

    // Step 1
    let mut by_best: BTreeMap<&str, Vec<&MatchRecord>> = BTreeMap::new();
    for row in &rows {
        if let Some(best) = row.best_match() {
            by_best.entry(best).or_default().push(row);
        }
    }

    // Step 2
    let mut survivors: Vec<&MatchRecord> = Vec::new();
    for group in by_best.values().filter(|g| g.len() > 1) {
        let mut pair_counts: HashMap<(&str, Option<&TaxonId>), usize> = HashMap::new();
        for row in group {
            *pair_counts.entry(pair_key(row)).or_insert(0) += 1;
        }
        survivors.extend(
            group
                .iter()
                .filter(|row| pair_counts[&pair_key(row)] == 1)
                .copied(),
        );
    }

    // Step 3
    let mut by_valid: BTreeMap<&str, Vec<&MatchRecord>> = BTreeMap::new();
    for row in survivors {
        if let Some(valid) = row.valid_name() {
            by_valid.entry(valid).or_default().push(row);
        }
    }

    let mut out = Vec::new();
    for (valid, group) in by_valid.into_iter().filter(|(_, g)| g.len() > 1) {
        let mut group_rows: Vec<DuplicateRow> = group
            .into_iter()
            .filter_map(|row| {
                Some(DuplicateRow {
                    valid_name: valid.to_string(),
                    query_name: row.query_name().to_string(),
                    best_match: row.best_match()?.to_string(),
                    taxon_id: row.taxon_id()?.clone(),
                    author: row.author().map(str::to_string),
                })
            })
            .collect();
        group_rows.sort_by(|a, b| {
            (&a.best_match, &a.taxon_id, &a.query_name).cmp(&(&b.best_match, &b.taxon_id, &b.query_name))
        });
        out.extend(group_rows);
    }
    out
}

fn pair_key(row: &MatchRecord) -> (&str, Option<&TaxonId>) {
    (row.best_match().unwrap_or_default(), row.taxon_id())
}

/// Rows fed to duplicate detection: matched records as they are, or one
/// single-candidate record per returned candidate.
fn duplicate_rows(records: &[MatchRecord], scope: DuplicateScope) -> Vec<MatchRecord> {
    match scope {
        DuplicateScope::BestMatch => records.iter().filter(|r| r.is_matched()).cloned().collect(),
        DuplicateScope::AllCandidates => records
            .iter()
            .flat_map(|r| {
                r.candidates()
                    .iter()
                    .map(|c| MatchRecord::from_candidates(r.query_name(), vec![c.clone()]))
            })
            .collect(),
    }
}
