//! Scope & touch tracking: the lifetime bracket that pins every node a
//! caller has read, so results can't be evicted out from under an in-flight
//! read.
//!
//! A scope's touch list is owned directly by the scope value, not by any
//! process-wide structure, so `Scope` simply holds its touches in a `Vec`.
//! See `DESIGN.md` for the full writeup of this choice.

use crate::clock::now_us;
use crate::model::Hash;
use crate::node::Node;
use crate::params::Params;

struct Touch {
    hash: Hash,
    params: Params,
}

/// A lifetime bracket pinning every node it has touched. Must be closed
/// (via [`crate::DasmCache::scope_close`]) to release those pins; dropping
/// a `Scope` without closing it leaks its pins — callers are expected to
/// close scopes they open.
#[derive(Default)]
pub struct Scope {
    touches: Vec<Touch>,
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pin on `node`, bumping its ref count and touch timestamps.
    /// Must be called while the caller holds the owning stripe's lock on
    /// `node` (read or write).
    pub(crate) fn touch_node(&mut self, node: &Node, user_clock_idx: u64) {
        use std::sync::atomic::Ordering;
        node.scope_ref_count.fetch_add(1, Ordering::SeqCst);
        node.last_time_touched_us.store(now_us(), Ordering::SeqCst);
        node.last_user_clock_idx_touched.store(user_clock_idx, Ordering::SeqCst);
        self.touches.push(Touch { hash: node.hash, params: node.params.clone() });
    }

    pub(crate) fn drain_touches(self) -> Vec<(Hash, Params)> {
        self.touches.into_iter().map(|t| (t.hash, t.params)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Arch, StyleFlags, Syntax};

    #[test]
    fn touching_records_a_pin() {
        let node = Node {
            hash: Hash::new(1, 2),
            params: Params::new(0x10, Arch::X64, StyleFlags::empty(), Syntax::Intel),
            ..Node::default()
        };
        let mut scope = Scope::new();
        scope.touch_node(&node, 5);
        use std::sync::atomic::Ordering;
        assert_eq!(node.scope_ref_count.load(Ordering::SeqCst), 1);
        assert_eq!(node.last_user_clock_idx_touched.load(Ordering::SeqCst), 5);

        let touches = scope.drain_touches();
        assert_eq!(touches.len(), 1);
        assert_eq!(touches[0].0, node.hash);
    }
}
