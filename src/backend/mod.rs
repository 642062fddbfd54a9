//! Search backends.
//!
//! [`SearchBackend`] is the seam between document types and the search
//! engine. [`RedisSearchBackend`] talks to Redis Stack; [`MemorySearchBackend`]
//! evaluates queries in process and records every call.

mod index;
mod memory;
mod redis;
mod traits;

pub use index::{DocumentStorage, IndexDefinition, IndexField, IndexFieldType};
pub use memory::{BackendCall, MemorySearchBackend};
pub use self::redis::RedisSearchBackend;
pub use traits::{
    AggregateRow, BackendCapabilities, BackendError, Hit, MigrationAction, SearchBackend, SearchPage, SearchRequest,
    SortBy,
};
