pub mod action;
pub mod cache_key;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod key;
pub mod record;

pub use action::{Action, StorePrimitive};
pub use cache_key::CacheKey;
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use key::{KeySpec, KeyValue};
pub use record::Record;
