//! Structured error types.
//!
//! The cache's own public API never returns an error — every path degrades
//! to an empty or partial `Info` instead — but the pieces around it, cache
//! construction and collaborator implementations, still need somewhere
//! principled to put failures instead of panicking.

use thiserror::Error;

/// Errors `DasmCache::new` can produce while standing up worker/evictor
/// threads. Never produced once the cache is running.
#[derive(Error, Debug)]
pub enum DasmCacheError {
    #[error("failed to spawn parse worker thread #{index}: {source}")]
    WorkerSpawnFailed { index: usize, #[source] source: std::io::Error },

    #[error("failed to spawn evictor/detector thread: {0}")]
    EvictorSpawnFailed(#[source] std::io::Error),
}

/// Errors a [`crate::collab`] implementation may surface from its own trait
/// methods. These never cross into [`crate::model::Info`] — a collaborator
/// that fails simply yields "no result" to the worker, the same as an
/// absent debug-info entry or a text-store miss.
#[derive(Error, Debug)]
pub enum CollabError {
    #[error("failed to read source file {path}: {source}")]
    SourceReadFailed { path: String, #[source] source: std::io::Error },

    #[error("blob store has no data for the requested hash")]
    BlobMissing,
}
