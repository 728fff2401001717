use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Registry taxon identifier.
///
/// Registries hand these out as JSON numbers or strings; both forms land
/// here as the same text. Integer identifiers order numerically and sort
/// before non-numeric ones, so table output is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaxonId(String);

impl TaxonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaxonId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<u64> for TaxonId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl Ord for TaxonId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for TaxonId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Str(String),
}

impl<'de> Deserialize<'de> for TaxonId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawId::deserialize(deserializer)? {
            RawId::Int(n) => Ok(TaxonId(n.to_string())),
            RawId::Str(s) if s.trim().is_empty() => {
                Err(serde::de::Error::custom("empty taxon identifier"))
            }
            RawId::Str(s) => Ok(TaxonId::new(s)),
        }
    }
}

/// Optional identifier reference: `null`, missing and `""` all mean "none".
fn deserialize_optional_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<TaxonId>, D::Error> {
    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Int(n)) => Ok(Some(TaxonId(n.to_string()))),
        Some(RawId::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(RawId::Str(s)) => Ok(Some(TaxonId::new(s))),
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// One candidate returned by the registry's name lookup, in rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub name: String,
    pub taxon_id: TaxonId,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub valid_name: Option<String>,
}

/// Result of looking up one normalized catalog name.
///
/// Built only from a candidate list, so `taxon_id`, `best_match` and a
/// non-empty `candidates` are always present together or absent together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    query_name: String,
    candidates: Vec<MatchCandidate>,
    best_match: Option<String>,
    taxon_id: Option<TaxonId>,
    valid_name: Option<String>,
    author: Option<String>,
}

impl MatchRecord {
    /// Record from the registry's ranked candidates; the first one wins.
    pub fn from_candidates(query_name: impl Into<String>, candidates: Vec<MatchCandidate>) -> Self {
        let top = candidates.first().cloned();
        Self {
            query_name: query_name.into(),
            best_match: top.as_ref().map(|c| c.name.clone()),
            taxon_id: top.as_ref().map(|c| c.taxon_id.clone()),
            valid_name: top.as_ref().and_then(|c| c.valid_name.clone()),
            author: top.and_then(|c| c.author),
            candidates,
        }
    }

    pub fn unmatched(query_name: impl Into<String>) -> Self {
        Self::from_candidates(query_name, Vec::new())
    }

    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    pub fn candidates(&self) -> &[MatchCandidate] {
        &self.candidates
    }

    pub fn best_match(&self) -> Option<&str> {
        self.best_match.as_deref()
    }

    pub fn taxon_id(&self) -> Option<&TaxonId> {
        self.taxon_id.as_ref()
    }

    pub fn valid_name(&self) -> Option<&str> {
        self.valid_name.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn is_matched(&self) -> bool {
        self.taxon_id.is_some()
    }
}

// ---------------------------------------------------------------------------
// Taxonomy table
// ---------------------------------------------------------------------------

/// One row of the assembled taxonomy table (Darwin Core taxon terms).
///
/// Field order is the output column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonRecord {
    pub taxon_id: TaxonId,
    #[serde(
        rename = "acceptedNameUsageID",
        default,
        deserialize_with = "deserialize_optional_id"
    )]
    pub accepted_name_usage_id: Option<TaxonId>,
    #[serde(
        rename = "parentNameUsageID",
        default,
        deserialize_with = "deserialize_optional_id"
    )]
    pub parent_name_usage_id: Option<TaxonId>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub taxon_rank: Option<String>,
    #[serde(default)]
    pub scientific_name_authorship: Option<String>,
    #[serde(default)]
    pub taxonomic_status: Option<String>,
    #[serde(default)]
    pub nomenclatural_status: Option<String>,
    #[serde(default)]
    pub taxon_remarks: Option<String>,
    #[serde(default)]
    pub kingdom: Option<String>,
    #[serde(default)]
    pub phylum: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub genus: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
}

/// Output header of the taxonomy table.
pub const TAXON_COLUMNS: [&str; 16] = [
    "taxonId",
    "acceptedNameUsageID",
    "parentNameUsageID",
    "scientificName",
    "taxonRank",
    "scientificNameAuthorship",
    "taxonomicStatus",
    "nomenclaturalStatus",
    "taxonRemarks",
    "kingdom",
    "phylum",
    "class",
    "order",
    "family",
    "genus",
    "species",
];

impl TaxonRecord {
    pub fn new(taxon_id: impl Into<TaxonId>) -> Self {
        Self {
            taxon_id: taxon_id.into(),
            accepted_name_usage_id: None,
            parent_name_usage_id: None,
            scientific_name: None,
            taxon_rank: None,
            scientific_name_authorship: None,
            taxonomic_status: None,
            nomenclatural_status: None,
            taxon_remarks: None,
            kingdom: None,
            phylum: None,
            class: None,
            order: None,
            family: None,
            genus: None,
            species: None,
        }
    }

    /// Mutable access to every free-text column.
    pub(crate) fn text_fields_mut(&mut self) -> [&mut Option<String>; 13] {
        [
            &mut self.scientific_name,
            &mut self.taxon_rank,
            &mut self.scientific_name_authorship,
            &mut self.taxonomic_status,
            &mut self.nomenclatural_status,
            &mut self.taxon_remarks,
            &mut self.kingdom,
            &mut self.phylum,
            &mut self.class,
            &mut self.order,
            &mut self.family,
            &mut self.genus,
            &mut self.species,
        ]
    }

    /// Classification columns, kingdom first.
    pub(crate) fn classification_mut(&mut self) -> [&mut Option<String>; 7] {
        [
            &mut self.kingdom,
            &mut self.phylum,
            &mut self.class,
            &mut self.order,
            &mut self.family,
            &mut self.genus,
            &mut self.species,
        ]
    }
}

// ---------------------------------------------------------------------------
// Failures and structural findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupFailure {
    pub query_name: String,
    pub reason: String,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalGap {
    pub taxon_id: TaxonId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralIssue {
    DanglingParent { taxon_id: TaxonId, parent_id: TaxonId },
    DanglingAccepted { taxon_id: TaxonId, accepted_id: TaxonId },
    ParentCycle { taxon_id: TaxonId },
    DepthExceeded { taxon_id: TaxonId, max_depth: usize },
}

impl StructuralIssue {
    pub fn taxon_id(&self) -> &TaxonId {
        match self {
            Self::DanglingParent { taxon_id, .. }
            | Self::DanglingAccepted { taxon_id, .. }
            | Self::ParentCycle { taxon_id }
            | Self::DepthExceeded { taxon_id, .. } => taxon_id,
        }
    }
}

/// A match dropped because its identifier is on the Exclusion List.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedMatch {
    pub query_name: String,
    pub taxon_id: TaxonId,
}

// ---------------------------------------------------------------------------
// Review reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenusEntry {
    pub scientific_name: String,
    pub rank: &'static str,
}

/// One conflicting match record, grouped under its shared valid name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateRow {
    pub valid_name: String,
    pub query_name: String,
    pub best_match: String,
    pub taxon_id: TaxonId,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedRow {
    pub query_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    LookupFailure,
    LookupTimeout,
    RetrievalGap,
    DanglingParent,
    DanglingAccepted,
    ParentCycle,
    DepthExceeded,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LookupFailure => write!(f, "lookup_failure"),
            Self::LookupTimeout => write!(f, "lookup_timeout"),
            Self::RetrievalGap => write!(f, "retrieval_gap"),
            Self::DanglingParent => write!(f, "dangling_parent"),
            Self::DanglingAccepted => write!(f, "dangling_accepted"),
            Self::ParentCycle => write!(f, "parent_cycle"),
            Self::DepthExceeded => write!(f, "depth_exceeded"),
        }
    }
}

/// Row of the combined issues report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReviewReports {
    pub genus_whitelist: Vec<GenusEntry>,
    pub duplicates: Vec<DuplicateRow>,
    pub unmatched: Vec<UnmatchedRow>,
    pub issues: Vec<Issue>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_names: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub excluded: usize,
    pub accepted_ids: usize,
    pub table_rows: usize,
    pub genera: usize,
    pub duplicate_rows: usize,
    pub lookup_failures: usize,
    pub retrieval_gaps: usize,
    pub structural_issues: usize,
}

impl RunSummary {
    /// Anything a curator has to look at before trusting the table.
    pub fn has_issues(&self) -> bool {
        self.lookup_failures > 0 || self.retrieval_gaps > 0 || self.structural_issues > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub meta: RunMeta,
    pub summary: RunSummary,
    #[serde(skip)]
    pub table: Vec<TaxonRecord>,
    pub reports: ReviewReports,
    pub excluded: Vec<ExcludedMatch>,
}
