use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wharf_infra::QueueError;

mod batch;
pub mod digest;
pub mod engine;
pub mod remote;
pub mod status;

pub use engine::Uploader;

/// Stage tuning for a deploy upload. The defaults match the hosted
/// release store's documented limits.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub hash_concurrency: usize,
    pub populate_concurrency: usize,
    pub upload_concurrency: usize,
    pub hash_retries: u32,
    pub populate_retries: u32,
    pub upload_retries: u32,
    /// Files per populate call.
    pub batch_size: usize,
    /// Compression level used both for digesting and for upload bodies.
    pub gzip_level: u32,
    pub min_upload_timeout: Duration,
    pub max_upload_timeout: Duration,
    pub timeout_per_kb: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            hash_concurrency: 50,
            populate_concurrency: 10,
            upload_concurrency: 200,
            hash_retries: 0,
            populate_retries: 3,
            upload_retries: 5,
            batch_size: 1000,
            gzip_level: 9,
            min_upload_timeout: Duration::from_secs(30),
            max_upload_timeout: Duration::from_secs(7200),
            timeout_per_kb: Duration::from_secs(20),
        }
    }
}

impl UploadOptions {
    /// Per-attempt upload deadline scaled to the file size, clamped to
    /// the configured floor and ceiling.
    pub fn upload_timeout(&self, size_bytes: u64) -> Duration {
        let kb = size_bytes.saturating_add(500) / 1000;
        let scaled = self
            .timeout_per_kb
            .saturating_mul(u32::try_from(kb).unwrap_or(u32::MAX));
        scaled.clamp(self.min_upload_timeout, self.max_upload_timeout)
    }
}

/// Everything the engine needs to push one version's content.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Opaque version identifier understood by the release store.
    pub version: String,
    /// Root the hash cache lives under.
    pub project_root: Utf8PathBuf,
    /// Directory the deployed files are read from.
    pub content_root: Utf8PathBuf,
    /// Paths relative to `content_root`, as produced by the lister.
    pub files: Vec<String>,
    pub options: UploadOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadStats {
    pub files_total: u64,
    pub files_cached: u64,
    pub files_uploaded: u64,
    pub bytes_total: u64,
    pub populate_batches: u64,
}

/// High-level error type for deploy uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("hash stage failed: {0}")]
    Hash(QueueError),
    #[error("populate stage failed: {0}")]
    Populate(QueueError),
    #[error("upload stage failed: {0}")]
    Upload(QueueError),
}
