//! SQLite-backed response cache, conversation memory and chunk index

pub mod cache;
pub mod chunks;
mod error;
pub mod memory;

use std::collections::BTreeMap;

pub use cache::{fingerprint, CacheStats, ResponseCache, DEFAULT_TTL_HOURS};
pub use chunks::{ChunkHit, ChunkIndex};
pub use error::StoreError;
pub use memory::{ConversationMemory, Exchange, DEFAULT_MAX_HISTORY, NO_HISTORY};

/// Exact-match metadata constraints, all of which must hold
pub type MetadataFilter = BTreeMap<String, String>;
