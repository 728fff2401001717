use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::config::HierarchyConfig;
use crate::exclusions::ExclusionSet;
use crate::model::{RetrievalGap, StructuralIssue, TaxonId, TaxonRecord};
use crate::normalize::scrub_field;
use crate::registry::{FetchOptions, TaxonRegistry};

/// Ranks that own a classification column, in column order.
const CLASSIFICATION_RANKS: [&str; 7] = ["kingdom", "phylum", "class", "order", "family", "genus", "species"];

#[derive(Debug, Default)]
pub struct AssemblyOutput {
    /// Final table, one row per `taxonId`, sorted by identifier.
    pub table: Vec<TaxonRecord>,
    pub gaps: Vec<RetrievalGap>,
    pub issues: Vec<StructuralIssue>,
}

/// Retrieve full records for the accepted identifiers and assemble the
/// taxonomy table.
///
/// Retrieval is batched; a failed batch turns each of its identifiers into
/// a retrieval gap and the run continues.
pub fn assemble(
    registry: &dyn TaxonRegistry,
    accepted: &BTreeSet<TaxonId>,
    exclusions: &ExclusionSet,
    config: &HierarchyConfig,
    batch_size: usize,
) -> AssemblyOutput {
    if accepted.is_empty() {
        log::info!("no accepted identifiers; taxonomy table is empty");
        return AssemblyOutput::default();
    }

    let options = FetchOptions::from(config);
    let ids: Vec<TaxonId> = accepted.iter().cloned().collect();
    let mut rows = Vec::new();
    let mut failed: HashMap<TaxonId, String> = HashMap::new();

    for (n, batch) in ids.chunks(batch_size.max(1)).enumerate() {
        match registry.fetch_records(batch, options) {
            Ok(records) => {
                log::debug!("batch {}: {} ids -> {} records", n + 1, batch.len(), records.len());
                rows.extend(records);
            }
            Err(e) => {
                log::warn!("batch {}: retrieval of {} ids failed: {e}", n + 1, batch.len());
                for id in batch {
                    failed.insert(id.clone(), e.to_string());
                }
            }
        }
    }

    build_table(rows, accepted, exclusions, config.max_depth, &failed)
}

/// Turn raw registry rows into the final table and its findings.
///
/// `failed` carries the reason for identifiers whose retrieval request
/// failed outright.
pub fn build_table(
    rows: Vec<TaxonRecord>,
    accepted: &BTreeSet<TaxonId>,
    exclusions: &ExclusionSet,
    max_depth: usize,
    failed: &HashMap<TaxonId, String>,
) -> AssemblyOutput {
    let fetched = rows.len();
    let mut table: BTreeMap<TaxonId, TaxonRecord> = BTreeMap::new();
    for row in rows {
        table.entry(row.taxon_id.clone()).or_insert(row);
    }
    if table.len() < fetched {
        log::debug!("{} duplicate registry rows collapsed", fetched - table.len());
    }

    let before = table.len();
    table.retain(|id, _| !exclusions.contains(id));
    if table.len() < before {
        log::info!("{} excluded taxa removed after expansion", before - table.len());
    }

    for record in table.values_mut() {
        scrub_record(record);
    }
    fill_classification(&mut table);

    let gaps: Vec<RetrievalGap> = accepted
        .iter()
        .filter(|id| !table.contains_key(*id))
        .map(|id| RetrievalGap {
            taxon_id: id.clone(),
            reason: failed
                .get(id)
                .cloned()
                .unwrap_or_else(|| "not returned by registry".into()),
        })
        .collect();
    for gap in &gaps {
        log::warn!("retrieval gap: {} ({})", gap.taxon_id, gap.reason);
    }

    let issues = check_structure(&table, max_depth);
    for issue in &issues {
        log::warn!("structural issue: {issue:?}");
    }

    AssemblyOutput {
        table: table.into_values().collect(),
        gaps,
        issues,
    }
}

/// Uniform text cleanup across all columns; blank values become nulls.
fn scrub_record(record: &mut TaxonRecord) {
    for field in record.text_fields_mut() {
        if let Some(value) = field.as_deref() {
            let cleaned = scrub_field(value);
            *field = (!cleaned.is_empty()).then_some(cleaned);
        }
    }
}

fn rank_column(rank: &str) -> Option<usize> {
    CLASSIFICATION_RANKS
        .iter()
        .position(|r| r.eq_ignore_ascii_case(rank.trim()))
}

/// Fill empty classification columns from the record itself and its
/// ancestry. Records without a parent (synonyms, usually) borrow the
/// lineage of their accepted taxon. The nearest ancestor of a rank wins.
fn fill_classification(table: &mut BTreeMap<TaxonId, TaxonRecord>) {
    let lineages: Vec<(TaxonId, [Option<String>; 7])> = table
        .keys()
        .map(|id| (id.clone(), lineage_names(table, id)))
        .collect();

    for (id, names) in lineages {
        if let Some(record) = table.get_mut(&id) {
            for (slot, name) in record.classification_mut().into_iter().zip(names) {
                if slot.is_none() {
                    *slot = name;
                }
            }
        }
    }
}

fn lineage_names(table: &BTreeMap<TaxonId, TaxonRecord>, start: &TaxonId) -> [Option<String>; 7] {
    let mut names: [Option<String>; 7] = Default::default();
    let mut seen: HashSet<&TaxonId> = HashSet::new();
    let mut current = table.get(start);

    while let Some(record) = current {
        if !seen.insert(&record.taxon_id) {
            break;
        }
        let column = record.taxon_rank.as_deref().and_then(rank_column);
        if let (Some(col), Some(name)) = (column, record.scientific_name.as_ref()) {
            if names[col].is_none() {
                names[col] = Some(name.clone());
            }
        }
        let next = record
            .parent_name_usage_id
            .as_ref()
            .or_else(|| record.accepted_name_usage_id.as_ref().filter(|a| **a != record.taxon_id));
        current = next.and_then(|id| table.get(id));
    }
    names
}

#[derive(Debug, Clone, Copy)]
enum Walk {
    Depth(usize),
    Cycle,
}

/// Dangling references, parent cycles and over-deep chains.
///
/// Every record's parent chain is resolved once; chains that leave the
/// table end at the dangling reference, which is reported on its own.
pub fn check_structure(table: &BTreeMap<TaxonId, TaxonRecord>, max_depth: usize) -> Vec<StructuralIssue> {
    let mut issues = Vec::new();

    for record in table.values() {
        if let Some(parent) = &record.parent_name_usage_id {
            if !table.contains_key(parent) {
                issues.push(StructuralIssue::DanglingParent {
                    taxon_id: record.taxon_id.clone(),
                    parent_id: parent.clone(),
                });
            }
        }
        if let Some(accepted) = &record.accepted_name_usage_id {
            if !table.contains_key(accepted) {
                issues.push(StructuralIssue::DanglingAccepted {
                    taxon_id: record.taxon_id.clone(),
                    accepted_id: accepted.clone(),
                });
            }
        }
    }

    let mut state: HashMap<&TaxonId, Walk> = HashMap::new();
    let mut cycle_members: BTreeSet<&TaxonId> = BTreeSet::new();

    for start in table.keys() {
        if state.contains_key(start) {
            continue;
        }

        let mut path: Vec<&TaxonId> = Vec::new();
        let mut on_path: HashMap<&TaxonId, usize> = HashMap::new();
        let mut current = start;
        // Walk of the parent of the last path element; None = no parent.
        let above: Option<Walk> = loop {
            if let Some(known) = state.get(current) {
                break Some(*known);
            }
            if let Some(&pos) = on_path.get(current) {
                for id in path.drain(pos..) {
                    cycle_members.insert(id);
                    state.insert(id, Walk::Cycle);
                }
                break Some(Walk::Cycle);
            }
            on_path.insert(current, path.len());
            path.push(current);
            let parent = table
                .get(current)
                .and_then(|r| r.parent_name_usage_id.as_ref())
                .filter(|p| table.contains_key(*p));
            match parent {
                Some(p) => current = p,
                None => break None,
            }
        };

        let mut below = above;
        for id in path.into_iter().rev() {
            let walk = match below {
                None => Walk::Depth(0),
                Some(Walk::Depth(d)) => Walk::Depth(d + 1),
                Some(Walk::Cycle) => Walk::Cycle,
            };
            state.insert(id, walk);
            below = Some(walk);
        }
    }

    for id in &cycle_members {
        issues.push(StructuralIssue::ParentCycle { taxon_id: (*id).clone() });
    }
    for id in table.keys() {
        if let Some(Walk::Depth(d)) = state.get(id) {
            if *d > max_depth {
                issues.push(StructuralIssue::DepthExceeded {
                    taxon_id: id.clone(),
                    max_depth,
                });
            }
        }
    }

    issues
}
