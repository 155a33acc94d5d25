mod cache_key;
mod hash_cache;

pub use cache_key::target_key;
pub use hash_cache::{HashCache, HashRecord, CACHE_DIR};
