use std::collections::BTreeMap;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use thiserror::Error;
use wharf_core::formats::{PopulateRequest, PopulateResponse};
use wharf_core::ContentHash;
use wharf_infra::gzip_stream;

/// Substring (lowercase) the release store puts in the response body when
/// an uploaded blob does not hash to the name it was stored under.
pub(crate) const HASH_MISMATCH_MARKER: &str = "content hash";

/// Populate calls get a fixed deadline; upload deadlines scale with size.
pub(crate) const POPULATE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid api url {url}: {reason}")]
    BadUrl { url: String, reason: String },
    #[error("{0}")]
    Transport(String),
    #[error("populate returned {status}: {body}")]
    PopulateStatus { status: u16, body: String },
    #[error("upload of {hash} returned {status}: {body}")]
    UploadStatus {
        hash: ContentHash,
        status: u16,
        body: String,
    },
    #[error("store rejected content hash {hash}: {body}")]
    HashMismatch { hash: ContentHash, body: String },
    #[error("upload of {hash} timed out after {seconds}s")]
    Timeout { hash: ContentHash, seconds: u64 },
}

#[async_trait::async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Registers a batch of `wire key -> hash` entries against the version
    /// and learns which hashes the store still needs bytes for.
    async fn populate(
        &self,
        version: &str,
        files: BTreeMap<String, ContentHash>,
    ) -> Result<PopulateResponse, RemoteError>;

    /// Streams one gzip-compressed file to the store under its hash.
    async fn upload(
        &self,
        endpoint: &str,
        hash: &ContentHash,
        source: &Utf8Path,
        gzip_level: u32,
        timeout: Duration,
    ) -> Result<(), RemoteError>;
}

/// HTTP-based release store speaking the populate/upload wire protocol.
#[derive(Debug)]
pub struct HttpReleaseStore {
    client: Client,
    api_base: String,
}

impl HttpReleaseStore {
    /// `api_base` is the version-API prefix; populate URLs are formed as
    /// `{api_base}/{version}:populateFiles`, so the version's own path
    /// separators survive verbatim.
    pub fn new(client: Client, api_base: &str) -> Result<Self, RemoteError> {
        reqwest::Url::parse(api_base).map_err(|e| RemoteError::BadUrl {
            url: api_base.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ReleaseStore for HttpReleaseStore {
    async fn populate(
        &self,
        version: &str,
        files: BTreeMap<String, ContentHash>,
    ) -> Result<PopulateResponse, RemoteError> {
        let url = format!("{}/{}:populateFiles", self.api_base, version);
        let resp = self
            .client
            .post(&url)
            .timeout(POPULATE_TIMEOUT)
            .json(&PopulateRequest { files })
            .send()
            .await
            .map_err(|e| RemoteError::Transport(format!("populate request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::PopulateStatus {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<PopulateResponse>()
            .await
            .map_err(|e| RemoteError::Transport(format!("populate response parse failed: {e}")))
    }

    async fn upload(
        &self,
        endpoint: &str,
        hash: &ContentHash,
        source: &Utf8Path,
        gzip_level: u32,
        timeout: Duration,
    ) -> Result<(), RemoteError> {
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), hash);
        let body = reqwest::Body::wrap_stream(gzip_stream(source, gzip_level));
        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout {
                        hash: hash.clone(),
                        seconds: timeout.as_secs(),
                    }
                } else {
                    RemoteError::Transport(format!("upload of {hash} failed: {e}"))
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body_text = resp.text().await.unwrap_or_default();
        tracing::debug!(%hash, status = status.as_u16(), body = %body_text, "upload rejected");
        if body_text.to_lowercase().contains(HASH_MISMATCH_MARKER) {
            return Err(RemoteError::HashMismatch {
                hash: hash.clone(),
                body: body_text,
            });
        }
        Err(RemoteError::UploadStatus {
            hash: hash.clone(),
            status: status.as_u16(),
            body: body_text,
        })
    }
}
