//! Upstream Search Console REST client.
//!
//! One async method per upstream verb; responses come back as raw
//! `serde_json::Value` and the report tools do the shaping.

use reqwest::Method;
use serde_json::{Value, json};

const WEBMASTERS_BASE: &str = "https://www.googleapis.com/webmasters/v3";
const INSPECTION_BASE: &str = "https://searchconsole.googleapis.com/v1";

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Search Console API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request to Search Console failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct SearchConsoleClient {
    http: reqwest::Client,
    base: String,
    inspection_base: String,
}

impl Default for SearchConsoleClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchConsoleClient {
    pub fn new() -> Self {
        Self {
            http: crate::util::client(),
            base: WEBMASTERS_BASE.to_string(),
            inspection_base: INSPECTION_BASE.to_string(),
        }
    }

    /// Override the upstream bases (tests, proxies).
    pub fn with_bases(base: impl Into<String>, inspection_base: impl Into<String>) -> Self {
        Self {
            http: crate::util::client(),
            base: base.into(),
            inspection_base: inspection_base.into(),
        }
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        let mut request = self.http.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        let payload: Value = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}));

        if !(200..=299).contains(&status) {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("upstream request failed")
                .to_string();
            return Err(UpstreamError::Status { status, message });
        }
        Ok(payload)
    }

    // Site URLs are full URLs and must travel percent-encoded as one
    // path segment.
    fn encode_segment(raw: &str) -> String {
        url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
    }

    pub async fn list_sites(&self, token: &str) -> Result<Value, UpstreamError> {
        self.send(Method::GET, format!("{}/sites", self.base), token, None)
            .await
    }

    pub async fn get_site(&self, token: &str, site_url: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}/sites/{}", self.base, Self::encode_segment(site_url));
        self.send(Method::GET, url, token, None).await
    }

    pub async fn add_site(&self, token: &str, site_url: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}/sites/{}", self.base, Self::encode_segment(site_url));
        self.send(Method::PUT, url, token, None).await
    }

    pub async fn delete_site(&self, token: &str, site_url: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}/sites/{}", self.base, Self::encode_segment(site_url));
        self.send(Method::DELETE, url, token, None).await
    }

    pub async fn query_analytics(
        &self,
        token: &str,
        site_url: &str,
        body: &Value,
    ) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/sites/{}/searchAnalytics/query",
            self.base,
            Self::encode_segment(site_url)
        );
        self.send(Method::POST, url, token, Some(body)).await
    }

    pub async fn inspect_url(
        &self,
        token: &str,
        site_url: &str,
        page_url: &str,
    ) -> Result<Value, UpstreamError> {
        let url = format!("{}/urlInspection/index:inspect", self.inspection_base);
        let body = json!({
            "inspectionUrl": page_url,
            "siteUrl": site_url,
        });
        self.send(Method::POST, url, token, Some(&body)).await
    }

    pub async fn list_sitemaps(&self, token: &str, site_url: &str) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/sites/{}/sitemaps",
            self.base,
            Self::encode_segment(site_url)
        );
        self.send(Method::GET, url, token, None).await
    }

    pub async fn get_sitemap(
        &self,
        token: &str,
        site_url: &str,
        feedpath: &str,
    ) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/sites/{}/sitemaps/{}",
            self.base,
            Self::encode_segment(site_url),
            Self::encode_segment(feedpath)
        );
        self.send(Method::GET, url, token, None).await
    }

    pub async fn submit_sitemap(
        &self,
        token: &str,
        site_url: &str,
        feedpath: &str,
    ) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/sites/{}/sitemaps/{}",
            self.base,
            Self::encode_segment(site_url),
            Self::encode_segment(feedpath)
        );
        self.send(Method::PUT, url, token, None).await
    }

    pub async fn delete_sitemap(
        &self,
        token: &str,
        site_url: &str,
        feedpath: &str,
    ) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/sites/{}/sitemaps/{}",
            self.base,
            Self::encode_segment(site_url),
            Self::encode_segment(feedpath)
        );
        self.send(Method::DELETE, url, token, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_urls_are_encoded_as_one_segment() {
        let encoded = SearchConsoleClient::encode_segment("https://example.com/");
        assert!(!encoded.contains('/'));
        assert!(encoded.contains("%3A%2F%2F"));
    }
}
