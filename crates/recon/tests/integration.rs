use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use serde::Deserialize;

use taxalign_recon::config::{DuplicateScope, TaxalignConfig};
use taxalign_recon::engine::run;
use taxalign_recon::exclusions::{load_exclusions, ExclusionSet};
use taxalign_recon::export::{write_genus_whitelist, write_taxa};
use taxalign_recon::model::{IssueKind, MatchCandidate, PipelineResult, TaxonId, TaxonRecord};
use taxalign_recon::registry::{parse_catalog, CatalogSource, FetchOptions, LookupOptions, TaxonRegistry};
use taxalign_recon::{RegistryError, TaxalignError};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn read_fixture(name: &str) -> String {
    let path = fixtures_dir().join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}

// -------------------------------------------------------------------------
// Fixture collaborators
// -------------------------------------------------------------------------

struct FileCatalog {
    data: String,
}

impl CatalogSource for FileCatalog {
    fn list_distinct_names(&self) -> Result<BTreeSet<String>, TaxalignError> {
        parse_catalog("catalog.txt", &self.data, None)
    }
}

/// Registry answering from `registry.json`. Bulk retrieval mimics the
/// expansion flags: children of requested ids, synonyms pointing at them,
/// and the full ancestor chain.
#[derive(Deserialize)]
struct FixtureRegistry {
    matches: HashMap<String, Vec<MatchCandidate>>,
    #[serde(default)]
    failing: Vec<String>,
    records: Vec<TaxonRecord>,
}

impl FixtureRegistry {
    fn load() -> Self {
        serde_json::from_str(&read_fixture("registry.json")).unwrap()
    }

    fn record(&self, id: &TaxonId) -> Option<&TaxonRecord> {
        self.records.iter().find(|r| &r.taxon_id == id)
    }
}

impl TaxonRegistry for FixtureRegistry {
    fn lookup(&self, name: &str, _options: LookupOptions) -> Result<Vec<MatchCandidate>, RegistryError> {
        if self.failing.iter().any(|f| f == name) {
            return Err(RegistryError::Upstream("HTTP 503 Service Unavailable after 3 attempts".into()));
        }
        Ok(self.matches.get(name).cloned().unwrap_or_default())
    }

    fn fetch_records(
        &self,
        ids: &[TaxonId],
        options: FetchOptions,
    ) -> Result<Vec<TaxonRecord>, RegistryError> {
        let mut out = Vec::new();
        for id in ids {
            let Some(rec) = self.record(id) else { continue };
            out.push(rec.clone());
            if options.fill_missing_ancestors {
                let mut parent = rec.parent_name_usage_id.as_ref();
                while let Some(p) = parent {
                    let Some(ancestor) = self.record(p) else { break };
                    out.push(ancestor.clone());
                    parent = ancestor.parent_name_usage_id.as_ref();
                }
            }
            for other in &self.records {
                let child = options.include_descendants && other.parent_name_usage_id.as_ref() == Some(id);
                let synonym = options.include_synonyms
                    && other.taxon_id != *id
                    && other.accepted_name_usage_id.as_ref() == Some(id);
                if child || synonym {
                    out.push(other.clone());
                }
            }
        }
        Ok(out)
    }
}

fn load_config() -> TaxalignConfig {
    TaxalignConfig::from_toml(&read_fixture("diatoms.taxalign.toml")).unwrap()
}

fn fixture_exclusions(config: &TaxalignConfig) -> ExclusionSet {
    let excl = config.exclusions.as_ref().unwrap();
    load_exclusions(&excl.file, &read_fixture(&excl.file), &excl.column).unwrap()
}

fn run_fixture(config: &TaxalignConfig) -> PipelineResult {
    let catalog = FileCatalog { data: read_fixture(&config.catalog.file) };
    let exclusions = fixture_exclusions(config);
    run(config, &catalog, &FixtureRegistry::load(), &exclusions).unwrap()
}

fn ids(result: &PipelineResult) -> Vec<&str> {
    result.table.iter().map(|r| r.taxon_id.as_str()).collect()
}

fn render_taxa(table: &[TaxonRecord]) -> String {
    let mut buf = Vec::new();
    write_taxa(&mut buf, table).unwrap();
    String::from_utf8(buf).unwrap()
}

// -------------------------------------------------------------------------
// Pipeline
// -------------------------------------------------------------------------

#[test]
fn full_run_summary() {
    let result = run_fixture(&load_config());

    assert_eq!(result.meta.config_name, "Diatom catalog");
    assert_eq!(result.summary.total_names, 6);
    assert_eq!(result.summary.matched, 3);
    assert_eq!(result.summary.excluded, 1);
    assert_eq!(result.summary.unmatched, 2);
    assert_eq!(result.summary.accepted_ids, 3);
    assert_eq!(result.summary.lookup_failures, 1);
    assert_eq!(result.summary.retrieval_gaps, 0);
    assert_eq!(result.summary.structural_issues, 0);
    assert!(result.summary.has_issues());
}

#[test]
fn every_name_accounted_for_once() {
    let result = run_fixture(&load_config());
    let s = &result.summary;
    assert_eq!(s.matched + s.excluded + s.unmatched, s.total_names);

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for u in &result.reports.unmatched {
        assert!(seen.insert(u.query_name.as_str()));
    }
    for e in &result.excluded {
        assert!(seen.insert(e.query_name.as_str()));
    }
    assert!(seen.contains("UnknownSpeciesXYZ"));
    assert!(seen.contains("Navicula"));
    assert!(seen.contains("Gomphonema"));
}

#[test]
fn table_expanded_and_sorted() {
    let result = run_fixture(&load_config());
    // 103 is a descendant of 101 but on the exclusion list.
    assert_eq!(ids(&result), vec!["1", "2", "100", "101", "102", "105", "200", "201"]);

    let unique: BTreeSet<&str> = ids(&result).into_iter().collect();
    assert_eq!(unique.len(), result.table.len());
}

#[test]
fn no_excluded_id_in_table() {
    let config = load_config();
    let result = run_fixture(&config);
    let exclusions = fixture_exclusions(&config);
    assert!(result.table.iter().all(|r| !exclusions.contains(&r.taxon_id)));
}

#[test]
fn classification_filled_from_ancestors() {
    let result = run_fixture(&load_config());
    let acicularis = result.table.iter().find(|r| r.taxon_id.as_str() == "102").unwrap();
    assert_eq!(acicularis.kingdom.as_deref(), Some("Chromista"));
    assert_eq!(acicularis.phylum.as_deref(), Some("Bacillariophyta"));
    assert_eq!(acicularis.family.as_deref(), Some("Bacillariaceae"));
    assert_eq!(acicularis.genus.as_deref(), Some("Nitzschia"));
    assert_eq!(acicularis.species.as_deref(), Some("Nitzschia acicularis"));
}

#[test]
fn nitzschia_scenario_reports() {
    let result = run_fixture(&load_config());

    let dups = &result.reports.duplicates;
    assert_eq!(dups.len(), 2);
    assert!(dups.iter().all(|d| d.valid_name == "Nitzschia"));
    let queries: BTreeSet<&str> = dups.iter().map(|d| d.query_name.as_str()).collect();
    assert_eq!(queries, BTreeSet::from(["Nitzschia", "Nitzschia sp."]));

    let unmatched: Vec<&str> = result.reports.unmatched.iter().map(|u| u.query_name.as_str()).collect();
    assert_eq!(unmatched, vec!["Navicula", "UnknownSpeciesXYZ"]);
}

#[test]
fn all_candidates_scope_drops_repeated_pairs() {
    let mut config = load_config();
    config.review.duplicate_scope = DuplicateScope::AllCandidates;
    let result = run_fixture(&config);
    // Both queries return (Nitzschia, 101), so that pair is not a conflict;
    // (Nitzschia, 105) is left alone under its valid name.
    assert!(result.reports.duplicates.is_empty());
    assert_eq!(result.summary.duplicate_rows, 0);
}

#[test]
fn genus_whitelist_distinct() {
    let result = run_fixture(&load_config());
    let genera: Vec<&str> = result
        .reports
        .genus_whitelist
        .iter()
        .map(|g| g.scientific_name.as_str())
        .collect();
    assert_eq!(genera, vec!["Amphora", "Nitzschia"]);
}

#[test]
fn lookup_failure_in_issues_report() {
    let result = run_fixture(&load_config());
    let issues = &result.reports.issues;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::LookupFailure);
    assert_eq!(issues[0].subject, "Navicula");
    assert!(issues[0].detail.contains("503"));
}

#[test]
fn idempotent_outputs() {
    let config = load_config();
    let a = run_fixture(&config);
    let b = run_fixture(&config);
    assert_eq!(render_taxa(&a.table), render_taxa(&b.table));

    let whitelist = |r: &PipelineResult| {
        let mut buf = Vec::new();
        write_genus_whitelist(&mut buf, &r.reports.genus_whitelist).unwrap();
        buf
    };
    assert_eq!(whitelist(&a), whitelist(&b));
}

#[test]
fn no_nbsp_in_outputs() {
    let result = run_fixture(&load_config());
    let taxa = render_taxa(&result.table);
    assert!(!taxa.contains('\u{00A0}'));
    assert!(taxa.contains("\tHassall, 1845\t"));
    assert!(result.reports.duplicates.iter().all(|d| !d.query_name.contains('\u{00A0}')));
    // 102's remarks carry a comma and are written as-is.
    assert!(taxa.contains("planktonic, freshwater"));
}

#[test]
fn exclusion_of_matched_genus_empties_its_branch() {
    let config = load_config();
    let catalog = FileCatalog { data: read_fixture(&config.catalog.file) };
    let exclusions: ExclusionSet = ["101", "105", "103", "401"].into_iter().map(TaxonId::from).collect();
    let result = run(&config, &catalog, &FixtureRegistry::load(), &exclusions).unwrap();

    assert_eq!(result.summary.accepted_ids, 1);
    assert!(result.table.iter().all(|r| r.taxon_id.as_str() != "101"));
    assert_eq!(result.summary.excluded, 3);
}

#[test]
fn registry_outage_degrades_everything() {
    struct DownRegistry;
    impl TaxonRegistry for DownRegistry {
        fn lookup(&self, _: &str, _: LookupOptions) -> Result<Vec<MatchCandidate>, RegistryError> {
            Err(RegistryError::RateLimited { attempts: 4 })
        }
        fn fetch_records(&self, _: &[TaxonId], _: FetchOptions) -> Result<Vec<TaxonRecord>, RegistryError> {
            Err(RegistryError::Upstream("unreachable".into()))
        }
    }

    let config = load_config();
    let catalog = FileCatalog { data: read_fixture(&config.catalog.file) };
    let result = run(&config, &catalog, &DownRegistry, &ExclusionSet::default()).unwrap();
    assert_eq!(result.summary.unmatched, 6);
    assert_eq!(result.summary.lookup_failures, 6);
    assert!(result.table.is_empty());
    assert_eq!(render_taxa(&result.table).lines().count(), 1);
}
