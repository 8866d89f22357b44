//! Striped shared-state table: 1024 slots, each owned (for locking and
//! storage purposes) by one of `min(1024, available_parallelism)` stripes.
//!
//! A slot's list is searched linearly; collisions are expected to be rare
//! since 1024 slots distributed over a 64-bit hash word should spread
//! uniformly. Nothing above this module depends on the list representation,
//! so it can later be swapped for an open-addressed bucket without changing
//! the contract.

use std::collections::HashMap;
use std::sync::{Condvar, RwLock};

use crate::model::Hash;
use crate::node::Node;
use crate::params::Params;

pub const SLOTS: u64 = 1024;

/// Data a stripe's rw-lock protects: the slot lists it owns, plus a
/// free-list of evicted nodes available for reuse.
#[derive(Default)]
pub struct StripeInner {
    pub slots: HashMap<u64, Vec<Node>>,
    pub free_list: Vec<Node>,
}

/// One lock shard. The condvar is not required by any code path in this
/// crate yet; it is kept so a future caller can wait on a node's state
/// changing without polling.
pub struct Stripe {
    pub inner: RwLock<StripeInner>,
    pub cv: Condvar,
}

impl Default for Stripe {
    fn default() -> Self {
        Self { inner: RwLock::new(StripeInner::default()), cv: Condvar::new() }
    }
}

/// The striped table itself.
pub struct Table {
    pub stripes: Vec<Stripe>,
    pub slots_count: u64,
    pub stripes_count: u64,
}

impl Table {
    #[must_use]
    pub fn new(slots_count: u64) -> Self {
        let cores = std::thread::available_parallelism().map(|n| n.get() as u64).unwrap_or(1);
        let stripes_count = slots_count.min(cores).max(1);
        let stripes = (0..stripes_count).map(|_| Stripe::default()).collect();
        Self { stripes, slots_count, stripes_count }
    }

    /// `(slot_idx, stripe_idx)` for a hash: slot index is the hash's
    /// indexing word modulo `SLOTS`; stripe index is the slot index modulo
    /// the stripe count.
    #[must_use]
    pub fn indices(&self, hash: Hash) -> (u64, u64) {
        let slot_idx = hash.word1 % self.slots_count;
        let stripe_idx = slot_idx % self.stripes_count;
        (slot_idx, stripe_idx)
    }

    #[must_use]
    pub fn stripe(&self, stripe_idx: u64) -> &Stripe {
        &self.stripes[stripe_idx as usize]
    }
}

/// Take a free node from the stripe's pool if one is available, recycling it
/// for `(hash, params)`; otherwise build a fresh one.
pub fn take_or_create_node(inner: &mut StripeInner, hash: Hash, params: Params) -> Node {
    if let Some(mut node) = inner.free_list.pop() {
        node.recycle_for(hash, params);
        node
    } else {
        Node { hash, params, ..Node::default() }
    }
}
