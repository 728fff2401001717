//! `taxalign run` / `taxalign validate`: config-driven batch reconciliation.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use taxalign_recon::config::{OutputConfig, TaxalignConfig};
use taxalign_recon::export::{write_duplicates, write_genus_whitelist, write_issues, write_taxa, write_unmatched};
use taxalign_recon::{ExclusionSet, PipelineResult, TaxalignError};

use crate::exit_codes::EXIT_ISSUES;
use crate::inputs::{read_exclusions, resolve_api_key, FileCatalog};
use crate::registry::HttpRegistry;
use crate::CliError;

/// Everything a run needs, loaded and checked before any lookup.
struct Prepared {
    config: TaxalignConfig,
    base_dir: PathBuf,
    catalog: FileCatalog,
    exclusions: ExclusionSet,
}

fn prepare(config_path: &Path) -> Result<Prepared, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| CliError::config(format!("cannot read config {}: {e}", config_path.display())))?;
    let config = TaxalignConfig::from_toml(&config_str).map_err(|e| CliError::config(e.to_string()))?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let catalog = FileCatalog::new(base_dir.join(&config.catalog.file), config.catalog.column.clone());
    catalog.check_readable()?;

    let exclusions = match &config.exclusions {
        Some(excl) => read_exclusions(&base_dir.join(&excl.file), &excl.column)?,
        None => ExclusionSet::default(),
    };

    Ok(Prepared { config, base_dir, catalog, exclusions })
}

pub fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    fail_on_issues: bool,
) -> Result<(), CliError> {
    let prepared = prepare(&config_path)?;
    let config = &prepared.config;

    let api_key = resolve_api_key(&config.registry.api_key_env)?;
    let registry = HttpRegistry::new(&config.registry, api_key)?;

    log::info!("run \"{}\": {} excluded taxon ids", config.name, prepared.exclusions.len());
    let result = taxalign_recon::run(config, &prepared.catalog, &registry, &prepared.exclusions)
        .map_err(|e| match e {
            TaxalignError::Io(_) => CliError::output(e.to_string()),
            _ => CliError::config(e.to_string()),
        })?;

    let out_dir = prepared.base_dir.join(&config.output.dir);
    let written = write_artifacts(&result, &out_dir, &config.output)?;

    // Output
    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::output(format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "{}: {} names: {} matched, {} excluded, {} unmatched",
        result.meta.config_name, s.total_names, s.matched, s.excluded, s.unmatched,
    );
    eprintln!(
        "table: {} taxa from {} accepted ids, {} genera, {} duplicate rows",
        s.table_rows, s.accepted_ids, s.genera, s.duplicate_rows,
    );
    if s.has_issues() {
        eprintln!(
            "issues: {} lookup failures, {} retrieval gaps, {} structural",
            s.lookup_failures, s.retrieval_gaps, s.structural_issues,
        );
    }
    for path in &written {
        eprintln!("wrote {}", path.display());
    }

    if fail_on_issues && s.has_issues() {
        return Err(CliError {
            code: EXIT_ISSUES,
            message: "review issues found".into(),
            hint: Some(format!("see {}", out_dir.join(&config.output.issues).display())),
        });
    }

    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let prepared = prepare(&config_path)?;
    let config = &prepared.config;

    // Credential is only needed to run; report, don't fail.
    if resolve_api_key(&config.registry.api_key_env).is_err() {
        eprintln!("warning: {} is not set; `run` will fail", config.registry.api_key_env);
    }
    HttpRegistry::new(&config.registry, String::new())?;

    eprintln!(
        "config OK: \"{}\" (catalog {}, {} excluded ids, output {})",
        config.name,
        config.catalog.file,
        prepared.exclusions.len(),
        prepared.base_dir.join(&config.output.dir).display(),
    );
    Ok(())
}

// ── Artifacts ───────────────────────────────────────────────────────

fn write_artifacts(
    result: &PipelineResult,
    dir: &Path,
    names: &OutputConfig,
) -> Result<Vec<PathBuf>, CliError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CliError::output(format!("cannot create {}: {e}", dir.display())))?;

    let reports = &result.reports;
    let paths = [
        dir.join(&names.taxa),
        dir.join(&names.genus_whitelist),
        dir.join(&names.duplicates),
        dir.join(&names.unmatched),
        dir.join(&names.issues),
    ];
    write_file(&paths[0], |w| write_taxa(w, &result.table))?;
    write_file(&paths[1], |w| write_genus_whitelist(w, &reports.genus_whitelist))?;
    write_file(&paths[2], |w| write_duplicates(w, &reports.duplicates))?;
    write_file(&paths[3], |w| write_unmatched(w, &reports.unmatched))?;
    write_file(&paths[4], |w| write_issues(w, &reports.issues))?;

    Ok(paths.to_vec())
}

fn write_file(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<(), TaxalignError>,
) -> Result<(), CliError> {
    let f = File::create(path)
        .map_err(|e| CliError::output(format!("cannot create {}: {e}", path.display())))?;
    let mut w = BufWriter::new(f);
    write(&mut w).map_err(|e| CliError::output(format!("{}: {e}", path.display())))?;
    w.flush()
        .map_err(|e| CliError::output(format!("cannot write {}: {e}", path.display())))
}
