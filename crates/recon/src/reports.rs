use std::collections::BTreeSet;

use crate::model::{
    GenusEntry, Issue, IssueKind, LookupFailure, RetrievalGap, StructuralIssue, TaxonRecord,
};

/// Distinct genus names in the assembled table, sorted.
pub fn genus_whitelist(table: &[TaxonRecord]) -> Vec<GenusEntry> {
    let names: BTreeSet<&str> = table
        .iter()
        .filter(|r| r.taxon_rank.as_deref().is_some_and(|rank| rank.eq_ignore_ascii_case("genus")))
        .filter_map(|r| r.scientific_name.as_deref())
        .collect();

    names
        .into_iter()
        .map(|name| GenusEntry {
            scientific_name: name.to_string(),
            rank: "genus",
        })
        .collect()
}

/// Combined issues report: failed lookups, retrieval gaps and structural
/// findings, ordered by kind then subject.
pub fn issue_rows(
    failures: &[LookupFailure],
    gaps: &[RetrievalGap],
    structural: &[StructuralIssue],
) -> Vec<Issue> {
    let mut rows: Vec<Issue> = Vec::with_capacity(failures.len() + gaps.len() + structural.len());

    for f in failures {
        rows.push(Issue {
            kind: if f.timed_out { IssueKind::LookupTimeout } else { IssueKind::LookupFailure },
            subject: f.query_name.clone(),
            detail: f.reason.clone(),
        });
    }
    for g in gaps {
        rows.push(Issue {
            kind: IssueKind::RetrievalGap,
            subject: g.taxon_id.to_string(),
            detail: g.reason.clone(),
        });
    }
    for s in structural {
        rows.push(structural_row(s));
    }

    rows.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.subject.cmp(&b.subject))
            .then_with(|| a.detail.cmp(&b.detail))
    });
    rows
}

fn structural_row(issue: &StructuralIssue) -> Issue {
    let (kind, detail) = match issue {
        StructuralIssue::DanglingParent { parent_id, .. } => (
            IssueKind::DanglingParent,
            format!("parentNameUsageID {parent_id} not in table"),
        ),
        StructuralIssue::DanglingAccepted { accepted_id, .. } => (
            IssueKind::DanglingAccepted,
            format!("acceptedNameUsageID {accepted_id} not in table"),
        ),
        StructuralIssue::ParentCycle { .. } => {
            (IssueKind::ParentCycle, "parent chain loops back on itself".to_string())
        }
        StructuralIssue::DepthExceeded { max_depth, .. } => (
            IssueKind::DepthExceeded,
            format!("parent chain deeper than {max_depth}"),
        ),
    };
    Issue {
        kind,
        subject: issue.taxon_id().to_string(),
        detail,
    }
}
