//! GitHub releases API client.
//!
//! Provides the release list (with caller-supplied filters), the latest
//! release, and lookups by release id or by release name.

use crate::config::Settings;
use crate::error::{bounded, Error, Result};
use crate::types::Release;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Predicate applied to each release by [`ReleaseCatalog::fetch_all`].
pub type ReleaseFilter<'a> = &'a dyn Fn(&Release) -> bool;

/// Keeps releases that carry an asset with exactly this name.
pub fn has_asset(name: &str) -> impl Fn(&Release) -> bool + '_ {
    move |release: &Release| release.assets.iter().any(|asset| asset.name == name)
}

/// True when every filter accepts the release; an empty set accepts everything.
pub fn keep_release(release: &Release, filters: &[ReleaseFilter<'_>]) -> bool {
    filters.iter().all(|filter| filter(release))
}

pub fn build_http_client(settings: &Settings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(&settings.user_agent)
        .connect_timeout(settings.http_timeout())
        .build()
        .map_err(Error::HttpClient)
}

pub struct ReleaseCatalog {
    client: reqwest::Client,
    releases_url: String,
    per_page: u32,
    timeout: Duration,
}

impl ReleaseCatalog {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: build_http_client(settings)?,
            releases_url: settings.releases_url(),
            per_page: settings.per_page,
            timeout: settings.http_timeout(),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetches the release list, keeping only releases every filter accepts.
    ///
    /// The order delivered by the API (newest first) is preserved.
    pub async fn fetch_all(&self, filters: &[ReleaseFilter<'_>]) -> Result<Vec<Release>> {
        let per_page = self.per_page.to_string();
        let releases: Vec<Release> = self
            .get_json(&self.releases_url, &[("per_page", per_page.as_str())])
            .await?;

        let total = releases.len();
        let kept: Vec<Release> = releases
            .into_iter()
            .filter(|release| keep_release(release, filters))
            .collect();
        tracing::debug!("Kept {} of {} releases", kept.len(), total);

        Ok(kept)
    }

    pub async fn fetch_latest(&self) -> Result<Release> {
        self.fetch_by_id("latest").await
    }

    /// Fetches a release through the `releases/{id}` endpoint.
    pub async fn fetch_by_id(&self, id: &str) -> Result<Release> {
        let url = format!("{}/{}", self.releases_url, id);
        match self.get_json(&url, &[]).await {
            Err(Error::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(Error::ReleaseNotFound(id.to_string()))
            }
            other => other,
        }
    }

    /// Finds the release whose name equals `version` exactly.
    pub async fn fetch_by_name(&self, version: &str) -> Result<Release> {
        self.fetch_all(&[])
            .await?
            .into_iter()
            .find(|release| release.name == version)
            .ok_or_else(|| Error::ReleaseNotFound(version.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        tracing::debug!("Fetching release info from: {}", url);

        let request = self
            .client
            .get(url)
            .query(query)
            .header(ACCEPT, "application/vnd.github.v3+json");

        let body = bounded(&format!("request to {}", url), self.timeout, async {
            let response = request
                .send()
                .await
                .map_err(|e| Error::transport(url, e, self.timeout))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::Status {
                    url: url.to_string(),
                    status,
                });
            }

            response
                .bytes()
                .await
                .map_err(|e| Error::transport(url, e, self.timeout))
        })
        .await??;

        serde_json::from_slice(&body).map_err(|source| Error::Decode {
            url: url.to_string(),
            source,
        })
    }
}
