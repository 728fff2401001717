use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::Deserialize;

use crate::error::TaxalignError;
use crate::normalize::NameNormalizer;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaxalignConfig {
    pub name: String,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub exclusions: Option<ExclusionConfig>,
    pub registry: RegistryConfig,
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Catalog Source file. Without `column` the file holds one name per line;
/// with it the file is a delimited table with a header row.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub file: String,
    #[serde(default)]
    pub column: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExclusionConfig {
    pub file: String,
    #[serde(default = "default_exclusion_column")]
    pub column: String,
}

fn default_exclusion_column() -> String {
    "taxon_id".into()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub base_url: String,
    /// Environment variable holding the API credential.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Header the credential is sent in.
    #[serde(default = "default_auth_header")]
    pub auth_header: String,
    /// Retries per request after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Deadline for the whole lookup phase. Names not looked up in time
    /// are reported unmatched.
    #[serde(default)]
    pub batch_timeout_secs: Option<u64>,
    /// Concurrent name lookups.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Identifiers per bulk retrieval request.
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
    #[serde(default = "default_true")]
    pub return_all_candidates: bool,
}

fn default_api_key_env() -> String {
    "TAXALIGN_API_KEY".into()
}

fn default_auth_header() -> String {
    "Ocp-Apim-Subscription-Key".into()
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    1
}

fn default_fetch_batch_size() -> usize {
    500
}

fn default_true() -> bool {
    true
}

impl RegistryConfig {
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct HierarchyConfig {
    #[serde(default = "default_true")]
    pub include_synonyms: bool,
    #[serde(default = "default_true")]
    pub include_descendants: bool,
    #[serde(default = "default_true")]
    pub fill_missing_ancestors: bool,
    /// Maximum parent hops from any record to its root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    8
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            include_synonyms: true,
            include_descendants: true,
            fill_missing_ancestors: true,
            max_depth: default_max_depth(),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalize + Review + Output
// ---------------------------------------------------------------------------

/// Fixed substitution tables applied by the name normalizer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NormalizeConfig {
    /// Whole-name replacements, applied after token replacement.
    #[serde(default)]
    pub names: BTreeMap<String, String>,
    /// Single-token replacements (e.g. `"spp." = "sp."`).
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewConfig {
    #[serde(default)]
    pub duplicate_scope: DuplicateScope,
}

/// Which rows feed duplicate detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateScope {
    /// One row per match record (its top-ranked candidate).
    #[default]
    BestMatch,
    /// One row per candidate the registry returned.
    AllCandidates,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    #[serde(default = "default_taxa_file")]
    pub taxa: String,
    #[serde(default = "default_whitelist_file")]
    pub genus_whitelist: String,
    #[serde(default = "default_duplicates_file")]
    pub duplicates: String,
    #[serde(default = "default_unmatched_file")]
    pub unmatched: String,
    #[serde(default = "default_issues_file")]
    pub issues: String,
}

fn default_output_dir() -> String {
    "out".into()
}

fn default_taxa_file() -> String {
    "taxa.tsv".into()
}

fn default_whitelist_file() -> String {
    "genus_whitelist.tsv".into()
}

fn default_duplicates_file() -> String {
    "duplicates.tsv".into()
}

fn default_unmatched_file() -> String {
    "unmatched.tsv".into()
}

fn default_issues_file() -> String {
    "issues.tsv".into()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            taxa: default_taxa_file(),
            genus_whitelist: default_whitelist_file(),
            duplicates: default_duplicates_file(),
            unmatched: default_unmatched_file(),
            issues: default_issues_file(),
        }
    }
}

impl OutputConfig {
    pub fn file_names(&self) -> [&str; 5] {
        [
            &self.taxa,
            &self.genus_whitelist,
            &self.duplicates,
            &self.unmatched,
            &self.issues,
        ]
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl TaxalignConfig {
    pub fn from_toml(input: &str) -> Result<Self, TaxalignError> {
        let config: TaxalignConfig =
            toml::from_str(input).map_err(|e| TaxalignError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TaxalignError> {
        if self.name.trim().is_empty() {
            return Err(TaxalignError::ConfigValidation("name must not be empty".into()));
        }

        if self.catalog.file.trim().is_empty() {
            return Err(TaxalignError::ConfigValidation(
                "catalog.file must not be empty".into(),
            ));
        }

        if let Some(ref excl) = self.exclusions {
            if excl.file.trim().is_empty() || excl.column.trim().is_empty() {
                return Err(TaxalignError::ConfigValidation(
                    "exclusions.file and exclusions.column must not be empty".into(),
                ));
            }
        }

        let reg = &self.registry;
        if !(reg.base_url.starts_with("http://") || reg.base_url.starts_with("https://")) {
            return Err(TaxalignError::ConfigValidation(format!(
                "registry.base_url must be an http(s) URL, got \"{}\"",
                reg.base_url
            )));
        }
        if reg.api_key_env.trim().is_empty() {
            return Err(TaxalignError::ConfigValidation(
                "registry.api_key_env must not be empty".into(),
            ));
        }
        if reg.workers == 0 || reg.workers > 32 {
            return Err(TaxalignError::ConfigValidation(format!(
                "registry.workers must be between 1 and 32, got {}",
                reg.workers
            )));
        }
        if reg.fetch_batch_size == 0 {
            return Err(TaxalignError::ConfigValidation(
                "registry.fetch_batch_size must be at least 1".into(),
            ));
        }
        if reg.batch_timeout_secs == Some(0) {
            return Err(TaxalignError::ConfigValidation(
                "registry.batch_timeout_secs must be at least 1 when set".into(),
            ));
        }

        if self.hierarchy.max_depth == 0 {
            return Err(TaxalignError::ConfigValidation(
                "hierarchy.max_depth must be at least 1".into(),
            ));
        }

        if let Some(entry) = NameNormalizer::new(&self.normalize).unstable_entry() {
            return Err(TaxalignError::ConfigValidation(format!(
                "{entry} would be rewritten again by another substitution; substitutions must not chain"
            )));
        }

        // Every artifact gets its own file
        let names = self.output.file_names();
        let unique: HashSet<&str> = names.iter().copied().collect();
        if unique.len() != names.len() || names.iter().any(|n| n.trim().is_empty()) {
            return Err(TaxalignError::ConfigValidation(
                "output file names must be non-empty and distinct".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name = "Phytoplankton catalog"

[catalog]
file = "names.txt"

[registry]
base_url = "https://registry.example.org/api"
"#;

    #[test]
    fn parse_minimal_uses_defaults() {
        let config = TaxalignConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.name, "Phytoplankton catalog");
        assert!(config.catalog.column.is_none());
        assert!(config.exclusions.is_none());
        assert_eq!(config.registry.api_key_env, "TAXALIGN_API_KEY");
        assert_eq!(config.registry.auth_header, "Ocp-Apim-Subscription-Key");
        assert_eq!(config.registry.max_retries, 3);
        assert_eq!(config.registry.workers, 1);
        assert_eq!(config.registry.fetch_batch_size, 500);
        assert!(config.registry.return_all_candidates);
        assert!(config.registry.batch_timeout().is_none());
        assert!(config.hierarchy.include_synonyms);
        assert!(config.hierarchy.include_descendants);
        assert!(config.hierarchy.fill_missing_ancestors);
        assert_eq!(config.hierarchy.max_depth, 8);
        assert_eq!(config.review.duplicate_scope, DuplicateScope::BestMatch);
        assert_eq!(config.output.dir, "out");
        assert_eq!(config.output.taxa, "taxa.tsv");
    }

    #[test]
    fn parse_full() {
        let input = r#"
name = "Full"

[catalog]
file = "catalog.tsv"
column = "scientific_name"

[exclusions]
file = "exclude.tsv"

[registry]
base_url = "http://localhost:8080"
api_key_env = "MY_KEY"
max_retries = 0
backoff_ms = 0
batch_timeout_secs = 120
workers = 4
fetch_batch_size = 50
return_all_candidates = false

[hierarchy]
include_descendants = false
max_depth = 12

[normalize.tokens]
"spp." = "sp."

[normalize.names]
"Dinophysis acuminata/lachmannii" = "Dinophysis acuminata"

[review]
duplicate_scope = "all_candidates"

[output]
dir = "export"
taxa = "taxonomy.txt"
"#;
        let config = TaxalignConfig::from_toml(input).unwrap();
        assert_eq!(config.catalog.column.as_deref(), Some("scientific_name"));
        let excl = config.exclusions.as_ref().unwrap();
        assert_eq!(excl.column, "taxon_id");
        assert_eq!(config.registry.batch_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.registry.workers, 4);
        assert!(!config.registry.return_all_candidates);
        assert!(!config.hierarchy.include_descendants);
        assert!(config.hierarchy.include_synonyms);
        assert_eq!(config.hierarchy.max_depth, 12);
        assert_eq!(config.normalize.tokens["spp."], "sp.");
        assert_eq!(config.review.duplicate_scope, DuplicateScope::AllCandidates);
        assert_eq!(config.output.taxa, "taxonomy.txt");
        assert_eq!(config.output.issues, "issues.tsv");
    }

    #[test]
    fn reject_bad_url() {
        let input = MINIMAL.replace("https://registry.example.org/api", "ftp://nope");
        let err = TaxalignConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("http(s) URL"));
    }

    #[test]
    fn reject_zero_workers() {
        let input = format!("{MINIMAL}workers = 0\n");
        let err = TaxalignConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("registry.workers"));
    }

    #[test]
    fn reject_colliding_output_names() {
        let input = format!(
            r#"{MINIMAL}
[output]
taxa = "report.tsv"
issues = "report.tsv"
"#
        );
        let err = TaxalignConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    #[test]
    fn reject_unknown_scope() {
        let input = format!(
            r#"{MINIMAL}
[review]
duplicate_scope = "everything"
"#
        );
        assert!(TaxalignConfig::from_toml(&input).is_err());
    }

    #[test]
    fn reject_chained_token_substitutions() {
        let input = format!(
            r#"{MINIMAL}
[normalize.tokens]
"spp." = "sp."
"sp." = "sp"
"#
        );
        let err = TaxalignConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, TaxalignError::ConfigValidation(_)));
        assert!(err.to_string().contains("must not chain"));
    }

    #[test]
    fn name_key_with_token_is_accepted() {
        let input = format!(
            r#"{MINIMAL}
[normalize.tokens]
"spp." = "sp."

[normalize.names]
"Gymnodinium spp." = "Gymnodinium"
"#
        );
        assert!(TaxalignConfig::from_toml(&input).is_ok());
    }

    #[test]
    fn reject_unknown_top_level_key() {
        let input = format!("subscription_key = \"abc\"\n{MINIMAL}");
        let err = TaxalignConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, TaxalignError::ConfigParse(_)));
    }
}
