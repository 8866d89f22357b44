//! Evictor/detector thread: reclaims idle nodes and re-enqueues nodes whose
//! source-annotated result has gone stale.
//!
//! Runs on a fixed sweep interval, doing a cheap read-locked check per
//! slot and a write-locked act pass that only runs when the check found
//! something to do.

use std::sync::atomic::Ordering;

use crate::cache::Shared;
use crate::clock::{now_us, DEADLINE_FOREVER};

pub(crate) fn run(shared: &Shared) {
    while !shared.shutdown.load(Ordering::SeqCst) {
        sweep(shared);
        std::thread::sleep(shared.config.sweep_interval);
    }
}

fn sweep(shared: &Shared) {
    let change_gen = shared.collab.fs_watcher.change_gen();
    let check_time_us = now_us();
    let check_time_user_clocks = shared.user_clock.idx();
    let evict = shared.config.evict_threshold;
    let retry = shared.config.retry_threshold;

    for slot_idx in 0..shared.table.slots_count {
        let stripe_idx = slot_idx % shared.table.stripes_count;
        let stripe = shared.table.stripe(stripe_idx);

        let slot_has_work = {
            let inner = stripe.inner.read().unwrap();
            inner.slots.get(&slot_idx).is_some_and(|list| {
                list.iter().any(|n| {
                    is_evictable(n, check_time_us, check_time_user_clocks, evict)
                        || is_stale(n, change_gen, check_time_us, check_time_user_clocks, retry)
                })
            })
        };
        if !slot_has_work {
            continue;
        }

        let mut inner = stripe.inner.write().unwrap();
        let Some(list) = inner.slots.get_mut(&slot_idx) else { continue };

        let mut retained = Vec::with_capacity(list.len());
        for mut node in list.drain(..) {
            if is_evictable(&node, check_time_us, check_time_user_clocks, evict) {
                inner.free_list.push(node);
                continue;
            }
            if is_stale(&node, change_gen, check_time_us, check_time_user_clocks, retry)
                && shared.ring.enqueue(node.hash, &node.params, DEADLINE_FOREVER)
            {
                node.last_time_requested_us.store(now_us(), Ordering::SeqCst);
                node.last_user_clock_idx_requested.store(check_time_user_clocks, Ordering::SeqCst);
            }
            retained.push(node);
        }
        *list = retained;
    }
}

fn is_evictable(node: &crate::node::Node, check_time_us: u64, check_time_user_clocks: u64, threshold: crate::config::Thresholds) -> bool {
    node.scope_ref_count.load(Ordering::SeqCst) == 0
        && node.last_time_touched_us.load(Ordering::SeqCst) + threshold.us <= check_time_us
        && node.last_user_clock_idx_touched.load(Ordering::SeqCst) + threshold.user_clocks <= check_time_user_clocks
        && node.load_count.load(Ordering::SeqCst) != 0
        && node.is_working.load(Ordering::SeqCst) == 0
}

fn is_stale(node: &crate::node::Node, change_gen: u64, check_time_us: u64, check_time_user_clocks: u64, threshold: crate::config::Thresholds) -> bool {
    let node_change_gen = node.change_gen.load(Ordering::SeqCst);
    node_change_gen != 0
        && node_change_gen != change_gen
        && node.last_time_requested_us.load(Ordering::SeqCst) + threshold.us <= check_time_us
        && node.last_user_clock_idx_requested.load(Ordering::SeqCst) + threshold.user_clocks <= check_time_user_clocks
}
