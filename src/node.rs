//! Cache entries (`Node`) and the per-stripe storage that owns them.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::model::{Hash, Info};
use crate::params::Params;

/// One cache entry for a `(hash, Params)` pair.
///
/// Rust's allocator takes the place of the original's per-node `info_arena`:
/// releasing a node's `info` (by dropping it, on eviction or reuse) frees its
/// backing allocations directly, so there is no separate arena handle to
/// track here. See `DESIGN.md` for the full mapping.
#[derive(Debug, Default)]
pub struct Node {
    pub hash: Hash,
    pub params: Params,
    pub info: Info,
    pub scope_ref_count: AtomicU64,
    pub last_time_touched_us: AtomicU64,
    pub last_user_clock_idx_touched: AtomicU64,
    pub last_time_requested_us: AtomicU64,
    pub last_user_clock_idx_requested: AtomicU64,
    pub load_count: AtomicU64,
    pub is_working: AtomicU32,
    /// Filesystem change generation the committed `info` was produced under;
    /// zero if the result does not depend on source-file annotation.
    pub change_gen: AtomicU64,
    /// Bumped every time this node slot is evicted and reused, so a worker
    /// committing stale results can detect "this is a different node now"
    /// even though `(hash, Params)` happens to match again.
    pub generation: AtomicU64,
}

impl Node {
    /// True if `hash`/`params` identify this node.
    #[must_use]
    pub fn matches(&self, hash: Hash, params: &Params) -> bool {
        self.hash == hash && &self.params == params
    }

    /// Reset a node for reuse from a stripe's free-list, bumping its
    /// generation so in-flight workers targeting the old occupant notice.
    pub fn recycle_for(&mut self, hash: Hash, params: Params) {
        let next_gen = self.generation.load(Ordering::SeqCst) + 1;
        *self = Node { hash, params, ..Node::default() };
        self.generation.store(next_gen, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Arch, DbgiKey, StyleFlags, Syntax};

    fn params(vaddr: u64) -> Params {
        Params::new(vaddr, Arch::X64, StyleFlags::empty(), Syntax::Intel)
            .with_dbgi_key(DbgiKey::default())
    }

    #[test]
    fn recycle_bumps_generation_and_clears_state() {
        let mut node = Node::default();
        node.scope_ref_count.store(3, Ordering::SeqCst);
        node.load_count.store(7, Ordering::SeqCst);
        node.generation.store(5, Ordering::SeqCst);

        node.recycle_for(Hash::new(9, 9), params(0x10));

        assert_eq!(node.generation.load(Ordering::SeqCst), 6);
        assert_eq!(node.scope_ref_count.load(Ordering::SeqCst), 0);
        assert_eq!(node.load_count.load(Ordering::SeqCst), 0);
        assert!(node.matches(Hash::new(9, 9), &params(0x10)));
    }
}
