//! Concurrent, asynchronously-populated disassembly cache.
//!
//! Callers open a [`Scope`], look up `(hash, Params)` or `(key, Params)`
//! pairs through a [`DasmCache`], and close the scope when done with the
//! results. A lookup either returns a cached [`Info`] immediately or
//! enqueues a background parse request and returns an empty one; parse
//! worker threads and an evictor/detector thread run for the lifetime of
//! the cache, decoding requests and reclaiming idle or stale entries.

pub mod cache;
pub mod clock;
pub mod collab;
pub mod config;
pub mod errors;
pub mod model;
pub mod node;
pub mod params;
pub mod ring;
pub mod scope;
pub mod table;

mod evictor;
mod worker;

pub use cache::DasmCache;
pub use collab::{
    Collaborators, DebugInfoStore, Decoder, DecodedInst, FileProperties, FsWatcher, HashStore,
    LangKind, LineRecord, Procedure, Rdi, ScopeRecord, SourceFile, TextInfo, TextStore, Unit,
};
pub use config::{DasmCacheConfig, Thresholds};
pub use errors::{CollabError, DasmCacheError};
pub use model::{Hash, Info, Inst, Key, TextRange};
pub use params::{Arch, DbgiKey, Params, StyleFlags, Syntax};
pub use scope::Scope;
