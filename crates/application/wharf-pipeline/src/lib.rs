pub mod upload;

// Re-export core engine components
pub use upload::{
    remote::{HttpReleaseStore, ReleaseStore, RemoteError},
    UploadError, UploadOptions, UploadRequest, UploadStats, Uploader,
};

// Re-export queue statistics often needed by consumers
pub use wharf_infra::QueueStats;
