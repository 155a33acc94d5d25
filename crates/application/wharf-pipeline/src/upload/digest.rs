use camino::Utf8Path;
use wharf_core::ContentHash;
use wharf_infra::{gzip_digest, DigestError};

/// Produces the content digest for one file on disk.
#[async_trait::async_trait]
pub trait Digester: Send + Sync {
    async fn digest(&self, fs_path: &Utf8Path) -> Result<ContentHash, DigestError>;
}

/// Digests with the same gzip settings the upload bodies are sent with,
/// so the digest always names the exact bytes the store receives.
pub struct GzipDigester {
    level: u32,
}

impl GzipDigester {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

#[async_trait::async_trait]
impl Digester for GzipDigester {
    async fn digest(&self, fs_path: &Utf8Path) -> Result<ContentHash, DigestError> {
        gzip_digest(fs_path, self.level).await
    }
}
