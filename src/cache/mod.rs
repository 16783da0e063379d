//! Response cache subsystem.
//!
//! Three response domains share one key-value store:
//!
//! - **concept**: single-item lookups (`/concept/...`)
//! - **concepts**: paginated listings (`/concepts/...`)
//! - **tree**: hierarchical keyword trees (`/tree/...`)
//!
//! Entries have no TTL; staleness is handled exclusively by the published
//! version marker and the priming job's invalidation sweep.

mod connection;
pub(crate) mod keys;
mod kv;
mod store;

pub use connection::ConnectionManager;
pub use keys::{
    CONCEPT_KEY_PREFIX, CONCEPTS_KEY_PREFIX, ConceptKey, ConceptsKey, TREE_KEY_PREFIX, TreeKey,
    VERSION_MARKER_KEY,
};
pub use kv::{KeyValueStore, RedisStore, ScanPage, StoreError};
pub use store::{
    ResponseCache, ResponseEnvelope, clear_prefix, read_version_marker, write_version_marker,
};
