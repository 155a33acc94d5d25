pub mod formats;
pub mod paths;

/// Lowercase hex SHA-256 digest of a file's gzip-compressed bytes.
pub type ContentHash = String;

/// Metadata captured when a file is stat'ed at the start of the hash stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    pub mtime_ms: u64,
}
