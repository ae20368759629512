pub mod composite;
pub mod existence_filter;
pub mod negative_cache;
pub mod object_cache;
pub mod traits;

pub use composite::CompositeCache;
pub use traits::{CacheResult, CachedLink, ExistenceFilter, NegativeCache, ObjectCache};
