//! SkyPortal catalog API client

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;

use skymirror_common::Result;

use crate::source::Source;

/// Catalog operations consumed by the scheduler and resolver
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Sources saved strictly after `after`, in the configured groups,
    /// ascending by save time
    async fn fetch_sources(&self, after: DateTime<Utc>) -> Result<Vec<Source>>;

    /// Instrument names with photometry records for a source (dynamic mode)
    async fn fetch_photometry_instruments(&self, source_id: &str) -> Result<Vec<String>>;

    /// Instrument names with spectroscopy records for a source (dynamic mode)
    async fn fetch_spectroscopy_instruments(&self, source_id: &str) -> Result<Vec<String>>;

    /// Telescope name for an instrument; `None` when the catalog does not
    /// know the instrument
    async fn fetch_telescope_name(&self, instrument_name: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct SourcesResponse {
    data: SourcesData,
}

#[derive(Debug, Deserialize)]
struct SourcesData {
    #[serde(default)]
    sources: Vec<Source>,
}

#[derive(Debug, Deserialize)]
struct PhotometryResponse {
    #[serde(default)]
    data: Vec<InstrumentNameRecord>,
}

#[derive(Debug, Deserialize)]
struct InstrumentNameRecord {
    instrument_name: String,
}

#[derive(Debug, Deserialize)]
struct SpectraResponse {
    #[serde(default)]
    data: Option<SpectraData>,
}

#[derive(Debug, Deserialize)]
struct SpectraData {
    #[serde(default)]
    spectra: Vec<InstrumentNameRecord>,
}

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    #[serde(default)]
    data: Vec<InstrumentRecord>,
}

#[derive(Debug, Deserialize)]
struct InstrumentRecord {
    telescope: TelescopeRecord,
}

#[derive(Debug, Deserialize)]
struct TelescopeRecord {
    name: String,
}

/// SkyPortal REST API client
///
/// Authenticates with the `Authorization: token <t>` header. The group id
/// filter is an immutable construction-time value.
pub struct SkyPortalClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    group_ids: Vec<i64>,
}

impl SkyPortalClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        group_ids: Vec<i64>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            group_ids,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("token {}", self.token))
    }
}

#[async_trait]
impl CatalogClient for SkyPortalClient {
    async fn fetch_sources(&self, after: DateTime<Utc>) -> Result<Vec<Source>> {
        let mut params: Vec<(&str, String)> = vec![(
            "savedAfter",
            after.to_rfc3339_opts(SecondsFormat::Micros, true),
        )];
        for group_id in &self.group_ids {
            params.push(("group_ids", group_id.to_string()));
        }

        let response = self
            .get("/api/sources")
            .query(&params)
            .send()
            .await?
            .error_for_status()?;

        let body: SourcesResponse = response.json().await?;
        let mut sources = body.data.sources;
        // The API returns ascending save time; enforce it anyway since the
        // watermark depends on the ordering.
        sources.sort_by_key(|s| s.saved_at);

        tracing::debug!(
            after = %after,
            count = sources.len(),
            "fetched sources from catalog"
        );
        Ok(sources)
    }

    async fn fetch_photometry_instruments(&self, source_id: &str) -> Result<Vec<String>> {
        let response = self
            .get(&format!("/api/sources/{}/photometry", source_id))
            .send()
            .await?
            .error_for_status()?;

        let body: PhotometryResponse = response.json().await?;
        Ok(body.data.into_iter().map(|p| p.instrument_name).collect())
    }

    async fn fetch_spectroscopy_instruments(&self, source_id: &str) -> Result<Vec<String>> {
        let response = self
            .get(&format!("/api/sources/{}/spectra", source_id))
            .send()
            .await?
            .error_for_status()?;

        let body: SpectraResponse = response.json().await?;
        Ok(body
            .data
            .map(|d| d.spectra.into_iter().map(|s| s.instrument_name).collect())
            .unwrap_or_default())
    }

    async fn fetch_telescope_name(&self, instrument_name: &str) -> Result<Option<String>> {
        let response = self
            .get("/api/instrument")
            .query(&[("name", instrument_name)])
            .send()
            .await?
            .error_for_status()?;

        let body: InstrumentsResponse = response.json().await?;
        Ok(body.data.into_iter().next().map(|i| i.telescope.name))
    }
}
