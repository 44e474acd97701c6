pub mod error;
pub mod memory_cache;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StoreError;
pub use memory_cache::MemoryCache;
pub use sqlite::{SqliteStore, StoreConfig};
pub use traits::*;
