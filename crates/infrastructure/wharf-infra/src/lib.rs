pub mod hashing;
pub mod net;
pub mod queue;

// Re-exports for convenience
pub use hashing::{gzip_digest, gzip_stream, DigestError};
pub use queue::{QueueError, QueueOptions, QueueStats, TaskError, TaskQueue};
