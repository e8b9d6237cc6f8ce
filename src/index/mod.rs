//! Package index client
//!
//! The index answers one question: where is the archive for `(name, spec)`
//! and what is its checksum. Anything other than a 2xx answer means the
//! package is not in the index.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{Result, SnapshotError};
use crate::manifest::{version_string, DependencyRequest};
use crate::utils::{retry_if_retryable, RetryConfig};

/// Archive body as a stream of chunks
pub type ArchiveStream = BoxStream<'static, Result<Bytes>>;

/// Index answer for a single `download_url` lookup.
///
/// Unknown fields are kept so the sidecar stores the complete response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRelease {
    pub download_url: String,
    pub checksum_sha256: String,
    /// Release file name, e.g. `Moo-2.005005.tar.gz`
    #[serde(default)]
    pub release: String,
    #[serde(default, deserialize_with = "deserialize_version")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IndexRelease {
    pub fn new(
        download_url: impl Into<String>,
        checksum_sha256: impl Into<String>,
        release: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            download_url: download_url.into(),
            checksum_sha256: checksum_sha256.into(),
            release: release.into(),
            version,
            extra: serde_json::Map::new(),
        }
    }
}

fn deserialize_version<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(version_string(&value))
}

/// Remote package index
#[async_trait]
pub trait PackageIndex: Send + Sync {
    /// Look up the release satisfying `request`; `None` if the index has none
    async fn lookup(&self, request: &DependencyRequest) -> Result<Option<IndexRelease>>;

    /// Stream the archive at `url`
    async fn download(&self, url: &str) -> Result<ArchiveStream>;
}

/// MetaCPAN-compatible HTTP index
pub struct HttpIndex {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpIndex {
    /// Create a client for the index at `base_url`
    pub fn new(base_url: &str, retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cpan-snapshot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// `GET <base>/v1/download_url/<name>[?version=<spec>]`
    pub fn lookup_url(&self, request: &DependencyRequest) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/v1/download_url/{}", self.base_url, request.name))
            .map_err(|e| SnapshotError::Configuration(format!("Invalid index URL: {}", e)))?;
        if let Some(spec) = &request.version_spec {
            url.query_pairs_mut().append_pair("version", spec);
        }
        Ok(url)
    }

    async fn lookup_once(&self, url: &Url) -> Result<Option<IndexRelease>> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            debug!("Index returned {} for {}", response.status(), url);
            return Ok(None);
        }
        let body = response.bytes().await?;
        let release: IndexRelease = serde_json::from_slice(&body)?;
        Ok(Some(release))
    }
}

#[async_trait]
impl PackageIndex for HttpIndex {
    async fn lookup(&self, request: &DependencyRequest) -> Result<Option<IndexRelease>> {
        let url = self.lookup_url(request)?;
        debug!("Requesting download url for {} {}", request.name, url);
        retry_if_retryable(&self.retry, || self.lookup_once(&url)).await
    }

    async fn download(&self, url: &str) -> Result<ArchiveStream> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes_stream().map_err(SnapshotError::from).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_release_keeps_unknown_fields() {
        let body = json!({
            "download_url": "https://cpan.metacpan.org/authors/id/H/HA/HAARG/Moo-2.005005.tar.gz",
            "checksum_sha256": "fb5a2952649faed07373f220b78004a9c6aba387739133740c1770e9b1f4b108",
            "checksum_md5": "ea37f2c3b1f2ad5c4d2e7b3e1bb2b9f1",
            "release": "Moo-2.005005",
            "version": 2.005005,
            "status": "latest"
        });
        let release: IndexRelease = serde_json::from_value(body).unwrap();
        assert_eq!(release.version.as_deref(), Some("2.005005"));
        assert_eq!(release.extra.get("status"), Some(&json!("latest")));

        let round = serde_json::to_value(&release).unwrap();
        assert_eq!(round["checksum_md5"], json!("ea37f2c3b1f2ad5c4d2e7b3e1bb2b9f1"));
    }

    #[test]
    fn test_lookup_url_encodes_version() {
        let index = HttpIndex::new("https://fastapi.metacpan.org/", RetryConfig::none()).unwrap();
        let url = index
            .lookup_url(&DependencyRequest::new("Try::Tiny", Some(">= 0.30".into())))
            .unwrap();
        assert!(url.as_str().starts_with("https://fastapi.metacpan.org/v1/download_url/Try::Tiny?version="));
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "version");
        assert_eq!(value, ">= 0.30");
    }

    #[tokio::test]
    async fn test_lookup_found_and_missing() {
        let server = MockServer::start_async().await;
        let found = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/download_url/Moo");
                then.status(200).json_body(json!({
                    "download_url": server.url("/Moo-2.0.tar.gz"),
                    "checksum_sha256": "00",
                    "release": "Moo-2.0",
                    "version": "2.0"
                }));
            })
            .await;
        let missing = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/download_url/Nope");
                then.status(404).body("{\"code\":404}");
            })
            .await;

        let index = HttpIndex::new(&server.base_url(), RetryConfig::none()).unwrap();
        let release = index.lookup(&DependencyRequest::latest("Moo")).await.unwrap().unwrap();
        assert_eq!(release.release, "Moo-2.0");
        assert_eq!(release.version.as_deref(), Some("2.0"));
        assert!(index.lookup(&DependencyRequest::latest("Nope")).await.unwrap().is_none());

        found.assert_async().await;
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn test_download_streams_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/dist.tar.gz");
                then.status(200).body("archive-bytes");
            })
            .await;

        let index = HttpIndex::new(&server.base_url(), RetryConfig::none()).unwrap();
        let mut stream = index.download(&server.url("/dist.tar.gz")).await.unwrap();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"archive-bytes");
    }
}
