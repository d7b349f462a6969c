//! HTTP client for the catalog query service.

use std::future::Future;
use std::time::Duration;

use log::{info, warn};

use crate::app_response::AppResponse;
use crate::catalog::{BookRecord, CatalogRequest, VolumesResponse};
use crate::config::CatalogConfig;

/// Anything that can answer a [`CatalogRequest`]. [`CatalogClient`] is the
/// real one; tests plug in canned sources.
pub trait CatalogSource {
    fn search(
        &self,
        request: &CatalogRequest,
    ) -> impl Future<Output = Result<Vec<BookRecord>, AppResponse>> + Send;
}

pub struct CatalogClient {
    http: reqwest::Client,
    config: CatalogConfig,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> Result<Self, AppResponse> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(CatalogClient { http, config })
    }

    /// Uses a host-built `reqwest::Client` (proxy, TLS or pool settings) as is;
    /// `config.timeout_secs` is not applied to it.
    pub fn with_http(http: reqwest::Client, config: CatalogConfig) -> Self {
        CatalogClient { http, config }
    }

    pub fn volumes_url(&self) -> String {
        format!("{}/volumes", self.config.base_url.trim_end_matches('/'))
    }

    pub fn query_pairs(&self, request: &CatalogRequest) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("q", request.query.query_param()),
            ("maxResults", request.max_results.to_string()),
        ];
        if let Some(key) = &self.config.api_key {
            pairs.push(("key", key.clone()));
        }
        pairs
    }

    async fn fetch(&self, request: &CatalogRequest) -> Result<Vec<BookRecord>, AppResponse> {
        request.query.validate()?;
        info!("Catalog {} (max {})", request.query, request.max_results);

        let response = self
            .http
            .get(self.volumes_url())
            .query(&self.query_pairs(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Catalog answered {status} for {}", request.query);
            return Err(AppResponse::CatalogError(format!("Catalog returned HTTP {status}")));
        }

        let volumes: VolumesResponse = response.json().await?;
        let records = volumes.into_records(&self.config.placeholder_cover);
        info!("Catalog {} returned {} records", request.query, records.len());
        Ok(records)
    }
}

impl CatalogSource for CatalogClient {
    fn search(
        &self,
        request: &CatalogRequest,
    ) -> impl Future<Output = Result<Vec<BookRecord>, AppResponse>> + Send {
        self.fetch(request)
    }
}
