//! Instant-query client for a Prometheus-compatible backend

use url::Url;

use crate::coordinator::REQUEST_TIMEOUT;
use crate::error::QueryError;

/// Thin client over the `/api/v1/query` endpoint
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    http: reqwest::Client,
    base: Url,
}

impl PrometheusClient {
    pub fn new(base_url: &str) -> Result<Self, QueryError> {
        // A trailing slash keeps Url::join from replacing the last
        // path segment.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized).map_err(|e| QueryError::InvalidUrl(e.to_string()))?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base })
    }

    /// Run an instant query and return the first sample's scalar
    /// value. An empty result vector is `QueryError::EmptyResult`,
    /// which callers treat as a skipped query.
    pub async fn vector_first(&self, query: &str) -> Result<f64, QueryError> {
        let url = self
            .base
            .join("api/v1/query")
            .map_err(|e| QueryError::InvalidUrl(e.to_string()))?;

        let resp = self.http.get(url).query(&[("query", query)]).send().await?;
        if !resp.status().is_success() {
            return Err(QueryError::BadStatus(resp.status().as_u16()));
        }

        let body: serde_json::Value = resp.json().await?;
        if body["status"] != "success" {
            let err = body["error"].as_str().unwrap_or("unknown error");
            return Err(QueryError::Backend(err.to_string()));
        }

        let first = body["data"]["result"]
            .as_array()
            .and_then(|r| r.first())
            .ok_or(QueryError::EmptyResult)?;

        // Instant vectors carry the value as [timestamp, "scalar"].
        let raw = first["value"][1]
            .as_str()
            .ok_or_else(|| QueryError::Malformed("missing sample value".to_string()))?;
        raw.parse::<f64>()
            .map_err(|e| QueryError::Malformed(format!("sample value {raw:?}: {e}")))
    }
}
