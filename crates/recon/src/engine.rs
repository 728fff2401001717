use crate::arbiter::arbitrate;
use crate::config::TaxalignConfig;
use crate::error::TaxalignError;
use crate::exclusions::ExclusionSet;
use crate::hierarchy::assemble;
use crate::matcher::{match_names, MatchSettings};
use crate::model::{PipelineResult, ReviewReports, RunMeta, RunSummary};
use crate::normalize::NameNormalizer;
use crate::registry::{CatalogSource, TaxonRegistry};
use crate::reports::{genus_whitelist, issue_rows};

/// Run the full pipeline: normalize, match, arbitrate, assemble, report.
///
/// Only a catalog that cannot be listed is fatal here. Registry trouble
/// degrades per name or per identifier and ends up in the issues report.
pub fn run(
    config: &TaxalignConfig,
    catalog: &dyn CatalogSource,
    registry: &dyn TaxonRegistry,
    exclusions: &ExclusionSet,
) -> Result<PipelineResult, TaxalignError> {
    let raw = catalog.list_distinct_names()?;
    let normalizer = NameNormalizer::new(&config.normalize);
    let names = normalizer.normalize_all(raw.iter().map(String::as_str));
    log::info!("catalog: {} raw names, {} after normalization", raw.len(), names.len());

    let matched = match_names(registry, &names, &MatchSettings::from(&config.registry));
    log::info!(
        "matcher: {} matched, {} lookup failures",
        matched.records.iter().filter(|r| r.is_matched()).count(),
        matched.failures.len()
    );

    let arbiter = arbitrate(&matched.records, exclusions, config.review.duplicate_scope);
    log::info!(
        "arbiter: {} accepted ids, {} excluded, {} unmatched, {} duplicate rows",
        arbiter.accepted.len(),
        arbiter.excluded.len(),
        arbiter.unmatched.len(),
        arbiter.duplicates.len()
    );

    let assembly = assemble(
        registry,
        &arbiter.accepted,
        exclusions,
        &config.hierarchy,
        config.registry.fetch_batch_size,
    );
    log::info!(
        "hierarchy: {} rows, {} retrieval gaps, {} structural issues",
        assembly.table.len(),
        assembly.gaps.len(),
        assembly.issues.len()
    );

    let reports = ReviewReports {
        genus_whitelist: genus_whitelist(&assembly.table),
        duplicates: arbiter.duplicates,
        unmatched: arbiter.unmatched,
        issues: issue_rows(&matched.failures, &assembly.gaps, &assembly.issues),
    };

    let summary = RunSummary {
        total_names: names.len(),
        matched: arbiter.filtered.iter().filter(|r| r.is_matched()).count(),
        unmatched: reports.unmatched.len(),
        excluded: arbiter.excluded.len(),
        accepted_ids: arbiter.accepted.len(),
        table_rows: assembly.table.len(),
        genera: reports.genus_whitelist.len(),
        duplicate_rows: reports.duplicates.len(),
        lookup_failures: matched.failures.len(),
        retrieval_gaps: assembly.gaps.len(),
        structural_issues: assembly.issues.len(),
    };

    Ok(PipelineResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        table: assembly.table,
        reports,
        excluded: arbiter.excluded,
    })
}
