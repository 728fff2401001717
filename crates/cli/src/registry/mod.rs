//! HTTP Taxonomic Registry.
//!
//! Endpoints, relative to `registry.base_url`:
//!
//! - `GET  names/match?name=<n>&all_candidates=<bool>` → `{"matches": [...]}`
//! - `POST taxa/records` with `{"taxonIds": [...], "includeSynonyms", ...}`
//!   → `{"records": [...]}`
//!
//! The credential travels in the configured header on every request.

mod client;

use reqwest::header::HeaderName;
use serde::{Deserialize, Serialize};
use url::Url;

use taxalign_recon::config::RegistryConfig;
use taxalign_recon::model::{MatchCandidate, TaxonId, TaxonRecord};
use taxalign_recon::registry::{FetchOptions, LookupOptions, TaxonRegistry};
use taxalign_recon::RegistryError;

use crate::CliError;
use client::RegistryClient;

#[derive(Deserialize)]
struct MatchResponse {
    #[serde(default)]
    matches: Vec<MatchCandidate>,
}

#[derive(Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<TaxonRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordsRequest<'a> {
    taxon_ids: &'a [TaxonId],
    #[serde(flatten)]
    options: FetchOptions,
}

pub struct HttpRegistry {
    client: RegistryClient,
    match_url: Url,
    records_url: Url,
    api_key: String,
    auth_header: String,
}

impl HttpRegistry {
    /// Build the registry from config. Failures here are configuration
    /// problems and surface before any lookup is made.
    pub fn new(config: &RegistryConfig, api_key: String) -> Result<Self, CliError> {
        let base = base_url(&config.base_url)?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| CliError::config(format!("cannot build registry endpoint {path}: {e}")))
        };

        HeaderName::from_bytes(config.auth_header.as_bytes()).map_err(|e| {
            CliError::config(format!("invalid registry.auth_header \"{}\": {e}", config.auth_header))
        })?;

        let client = RegistryClient::new(config).map_err(|e| CliError::config(e.to_string()))?;

        Ok(Self {
            client,
            match_url: join("names/match")?,
            records_url: join("taxa/records")?,
            api_key,
            auth_header: config.auth_header.clone(),
        })
    }
}

/// Parse the configured base URL so that relative endpoint paths append
/// to it instead of replacing its last segment.
fn base_url(raw: &str) -> Result<Url, CliError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| CliError::config(format!("invalid registry.base_url \"{raw}\": {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

impl TaxonRegistry for HttpRegistry {
    fn lookup(&self, name: &str, options: LookupOptions) -> Result<Vec<MatchCandidate>, RegistryError> {
        let all = if options.return_all_candidates { "true" } else { "false" };
        let body = self.client.request_with_retry(options.deadline, |http| {
            http.get(self.match_url.clone())
                .header(self.auth_header.as_str(), self.api_key.as_str())
                .query(&[("name", name), ("all_candidates", all)])
        })?;

        let resp: MatchResponse =
            serde_json::from_value(body).map_err(|e| RegistryError::Decode(format!("match response: {e}")))?;
        log::debug!("lookup \"{name}\": {} candidates", resp.matches.len());
        Ok(resp.matches)
    }

    fn fetch_records(
        &self,
        ids: &[TaxonId],
        options: FetchOptions,
    ) -> Result<Vec<TaxonRecord>, RegistryError> {
        let request = RecordsRequest { taxon_ids: ids, options };
        let body = self.client.request_with_retry(None, |http| {
            http.post(self.records_url.clone())
                .header(self.auth_header.as_str(), self.api_key.as_str())
                .json(&request)
        })?;

        let resp: RecordsResponse =
            serde_json::from_value(body).map_err(|e| RegistryError::Decode(format!("records response: {e}")))?;
        log::debug!("fetch of {} ids: {} records", ids.len(), resp.records.len());
        Ok(resp.records)
    }
}
