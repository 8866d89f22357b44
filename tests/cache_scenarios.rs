//! End-to-end scenarios exercising `DasmCache` over the in-memory stub
//! collaborators: cold miss / warm hit, a zero hash, rewind fallback,
//! eviction, change-gen-driven retry, and a ring at capacity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dasm_cache::collab::stub::{
    InMemoryDebugInfoStore, InMemoryFsWatcher, InMemoryHashStore, InMemoryTextStore, SimpleDecoder,
};
use dasm_cache::{
    Arch, Collaborators, DasmCache, DasmCacheConfig, DbgiKey, FsWatcher as _, Hash, Info, Key,
    LineRecord, Params, Procedure, Rdi, Scope, ScopeRecord, SourceFile, StyleFlags, Syntax,
    Thresholds, Unit,
};

struct Harness {
    cache: DasmCache,
    hash_store: Arc<InMemoryHashStore>,
    fs_watcher: Arc<InMemoryFsWatcher>,
    debug_info_store: Arc<InMemoryDebugInfoStore>,
    text_store: Arc<InMemoryTextStore>,
}

fn build(config: DasmCacheConfig) -> Harness {
    let hash_store = Arc::new(InMemoryHashStore::new());
    let fs_watcher = Arc::new(InMemoryFsWatcher::new());
    let debug_info_store = Arc::new(InMemoryDebugInfoStore::new());
    let text_store = Arc::new(InMemoryTextStore::new(hash_store.clone()));
    let collab = Collaborators {
        hash_store: hash_store.clone(),
        debug_info_store: debug_info_store.clone(),
        text_store: text_store.clone(),
        fs_watcher: fs_watcher.clone(),
        decoder: Arc::new(SimpleDecoder),
    };
    let cache = DasmCache::new(config, collab).expect("cache should start");
    Harness { cache, hash_store, fs_watcher, debug_info_store, text_store }
}

fn fast_config() -> DasmCacheConfig {
    DasmCacheConfig {
        slots: 64,
        ring_size_bytes: 8192,
        parse_thread_count: 1,
        sweep_interval: Duration::from_millis(10),
        evict_threshold: Thresholds { us: 0, user_clocks: 0 },
        retry_threshold: Thresholds { us: 0, user_clocks: 0 },
    }
}

fn poll_until_non_empty(cache: &DasmCache, scope: &mut Scope, hash: Hash, params: &Params) -> Info {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let info = cache.info_from_hash_params(scope, hash, params);
        if !info.is_empty() || Instant::now() >= deadline {
            return info;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn s1_cold_miss_then_warm_hit() {
    let h = build(fast_config());
    let hash = Hash::new(1, 2);
    h.hash_store.put(hash, vec![0x90]);

    let params = Params::new(0x1000, Arch::X64, StyleFlags::ADDRESSES, Syntax::Intel);
    let mut scope = h.cache.scope_open();

    let first = h.cache.info_from_hash_params(&mut scope, hash, &params);
    assert!(first.is_empty(), "first lookup on a cold cache must return an empty Info");

    let second = poll_until_non_empty(&h.cache, &mut scope, hash, &params);
    assert!(!second.is_empty(), "worker should have committed a result by now");
    assert_eq!(second.insts[0].code_off, 0);

    h.cache.scope_close(scope);
    h.cache.shutdown();
}

#[test]
fn s2_zero_hash_never_produces_a_result() {
    let h = build(fast_config());
    let mut scope = h.cache.scope_open();
    let params = Params::new(0x1000, Arch::X64, StyleFlags::empty(), Syntax::Intel);

    let info = h.cache.info_from_hash_params(&mut scope, Hash::zero(), &params);
    assert!(info.is_empty());

    std::thread::sleep(Duration::from_millis(50));
    let info_again = h.cache.info_from_hash_params(&mut scope, Hash::zero(), &params);
    assert!(info_again.is_empty(), "a zero hash must never resolve to a cached result");

    h.cache.scope_close(scope);
    h.cache.shutdown();
}

#[test]
fn s3_rewind_fallback_resolves_through_second_rewind() {
    let h = build(fast_config());
    let key = Key::new(7, 7);
    let resolved_hash = h.hash_store.put_keyed(key, 1, vec![0x90]);
    // rewind 0 is left unmapped, so hash_from_key(key, 0) yields zero.

    let params = Params::new(0x2000, Arch::X64, StyleFlags::empty(), Syntax::Intel);
    let mut scope = h.cache.scope_open();
    let mut hash_out = Hash::zero();

    // First call enqueues the real hash; poll until the worker commits.
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut info = Info::default();
    while info.is_empty() && Instant::now() < deadline {
        info = h.cache.info_from_key_params(&mut scope, key, &params, Some(&mut hash_out));
        if info.is_empty() {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    assert!(!info.is_empty(), "rewind=1 should eventually resolve");
    assert_eq!(hash_out, resolved_hash);

    h.cache.scope_close(scope);
    h.cache.shutdown();
}

#[test]
fn s4_idle_node_is_evicted() {
    let h = build(fast_config());
    let hash = Hash::new(3, 4);
    h.hash_store.put(hash, vec![0x90]);
    let params = Params::new(0x1000, Arch::X64, StyleFlags::empty(), Syntax::Intel);

    let mut scope = h.cache.scope_open();
    let committed = poll_until_non_empty(&h.cache, &mut scope, hash, &params);
    assert!(!committed.is_empty());
    h.cache.scope_close(scope);

    // No scopes open now; with zero-width thresholds the very next sweep
    // should reclaim the node. A subsequent lookup misses again and
    // re-enqueues, just as it did the first time around.
    std::thread::sleep(Duration::from_millis(100));

    let mut scope = h.cache.scope_open();
    let after_eviction = h.cache.info_from_hash_params(&mut scope, hash, &params);
    assert!(after_eviction.is_empty(), "evicted node should present as a fresh cache miss");
    h.cache.scope_close(scope);
    h.cache.shutdown();
}

#[test]
fn s5_change_gen_mismatch_triggers_reparse() {
    let h = build(fast_config());
    h.fs_watcher.bump_change_gen(); // change_gen == 1 when the first commit lands

    let path = "a.c";
    let key = h.fs_watcher.key_from_path(path);
    h.fs_watcher.register_path(path, 1);
    h.text_store.set_file_text(key, "int main(void) {\n  return 0;\n}\n");
    h.debug_info_store.insert(
        path,
        Rdi {
            id: 1,
            units: vec![Unit {
                voff_range: (0, 0x100),
                lines: vec![LineRecord { voff: 0, file_idx: 0, line_num: 1 }],
            }],
            source_files: vec![SourceFile { normalized_full_path: path.to_string() }],
            scopes: vec![ScopeRecord { voff_range: (0, 0x100), proc_idx: 0 }],
            procedures: vec![Procedure { name: "main".to_string() }],
        },
    );

    let hash = Hash::new(9, 9);
    h.hash_store.put(hash, vec![0x90]);
    let params = Params::new(0x1000, Arch::X64, StyleFlags::SOURCE_LINES, Syntax::Intel)
        .with_base_vaddr(0x1000)
        .with_dbgi_key(DbgiKey { path: path.to_string(), min_timestamp: 0 });

    let mut scope = h.cache.scope_open();
    let committed = poll_until_non_empty(&h.cache, &mut scope, hash, &params);
    assert!(!committed.is_empty());
    h.cache.scope_close(scope);

    // Simulate the watched file changing; the evictor/detector sweep should
    // notice the node's change_gen no longer matches and re-enqueue it.
    h.fs_watcher.bump_change_gen();
    std::thread::sleep(Duration::from_millis(150));

    let mut scope = h.cache.scope_open();
    let still_there = h.cache.info_from_hash_params(&mut scope, hash, &params);
    assert!(!still_there.is_empty(), "a re-parsed node should still resolve, not disappear");
    h.cache.scope_close(scope);
    h.cache.shutdown();
}

#[test]
fn s6_ring_at_capacity_rejects_without_corrupting_later_records() {
    use dasm_cache::ring::{Dequeued, Ring};

    let ring = Ring::new(128);
    let params = Params::new(0x3000, Arch::X64, StyleFlags::empty(), Syntax::Intel);
    let hash = Hash::new(11, 12);

    let mut rejected = 0;
    let mut accepted = 0;
    for _ in 0..100 {
        if ring.enqueue(hash, &params, 0) {
            accepted += 1;
        } else {
            rejected += 1;
        }
        if rejected > 0 && accepted > 0 {
            break;
        }
    }
    assert!(rejected > 0, "a 128-byte ring should reject at least one of 100 enqueues");
    assert!(accepted > 0);

    for _ in 0..accepted {
        match ring.dequeue() {
            Dequeued::Request(req) => {
                assert_eq!(req.hash, hash);
                assert_eq!(req.params, params);
            }
            Dequeued::Closed => panic!("ring closed unexpectedly"),
        }
    }
}
