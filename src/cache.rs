//! The cache's public surface: construction, the lookup API, and the glue
//! tying the striped table, request ring, worker pool, and evictor/detector
//! together. Modeled as an explicit owned value rather than a process-wide
//! singleton, since nothing about the behavior depends on singleton-ness.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::clock::{UserClock, DEADLINE_FOREVER};
use crate::collab::Collaborators;
use crate::config::DasmCacheConfig;
use crate::errors::DasmCacheError;
use crate::evictor;
use crate::model::{Hash, Info, Key};
use crate::params::Params;
use crate::ring::Ring;
use crate::scope::Scope;
use crate::table::{take_or_create_node, Table};
use crate::worker;

/// State shared between the public [`DasmCache`] handle, the parse worker
/// threads, and the evictor/detector thread.
pub(crate) struct Shared {
    pub table: Table,
    pub ring: Ring,
    pub user_clock: UserClock,
    pub collab: Collaborators,
    pub config: DasmCacheConfig,
    /// Set by [`DasmCache::shutdown`]; the evictor/detector thread checks
    /// this between sweeps. Parse workers don't need it — they exit via the
    /// ring's own close signal instead.
    pub shutdown: AtomicBool,
}

/// The disassembly cache. Owns its worker and evictor/detector threads;
/// call [`DasmCache::shutdown`] to join them so tests can tear a cache down
/// between cases without leaking OS threads.
pub struct DasmCache {
    shared: Arc<Shared>,
    worker_handles: Vec<JoinHandle<()>>,
    evictor_handle: Option<JoinHandle<()>>,
}

impl DasmCache {
    /// Build a cache and launch its worker and evictor/detector threads.
    ///
    /// # Errors
    /// Returns an error if a worker or evictor thread fails to spawn.
    pub fn new(config: DasmCacheConfig, collab: Collaborators) -> Result<Self, DasmCacheError> {
        let shared = Arc::new(Shared {
            table: Table::new(config.slots),
            ring: Ring::new(config.ring_size_bytes),
            user_clock: UserClock::new(),
            collab,
            config,
            shutdown: AtomicBool::new(false),
        });

        let mut worker_handles = Vec::with_capacity(shared.config.parse_thread_count);
        for index in 0..shared.config.parse_thread_count {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("dasm-parse-{index}"))
                .spawn(move || worker::run(&shared))
                .map_err(|source| DasmCacheError::WorkerSpawnFailed { index, source })?;
            worker_handles.push(handle);
        }

        let evictor_handle = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("dasm-evictor".to_string())
                .spawn(move || evictor::run(&shared))
                .map_err(DasmCacheError::EvictorSpawnFailed)?
        };

        Ok(Self { shared, worker_handles, evictor_handle: Some(evictor_handle) })
    }

    /// Tick the externally-driven user clock (e.g. once per UI frame).
    pub fn user_clock_tick(&self) -> u64 {
        self.shared.user_clock.tick()
    }

    #[must_use]
    pub fn user_clock_idx(&self) -> u64 {
        self.shared.user_clock.idx()
    }

    #[must_use]
    pub fn scope_open(&self) -> Scope {
        Scope::new()
    }

    /// Release every pin `scope` holds.
    pub fn scope_close(&self, scope: Scope) {
        for (hash, params) in scope.drain_touches() {
            let (slot_idx, stripe_idx) = self.shared.table.indices(hash);
            let inner = self.shared.table.stripe(stripe_idx).inner.read().unwrap();
            if let Some(list) = inner.slots.get(&slot_idx) {
                if let Some(node) = list.iter().find(|n| n.matches(hash, &params)) {
                    node.scope_ref_count.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                }
            }
            // A missing node is a no-op: the touch outlives the node it
            // pinned only when that node was already evicted, at which
            // point there is nothing left to unpin.
        }
    }

    /// Synchronous cache probe. Returns the cached `Info` if present,
    /// otherwise enqueues a request and returns an empty `Info` immediately.
    #[must_use]
    pub fn info_from_hash_params(&self, scope: &mut Scope, hash: Hash, params: &Params) -> Info {
        if hash.is_zero() {
            return Info::default();
        }

        let (slot_idx, stripe_idx) = self.shared.table.indices(hash);
        let stripe = self.shared.table.stripe(stripe_idx);

        {
            let inner = stripe.inner.read().unwrap();
            if let Some(list) = inner.slots.get(&slot_idx) {
                if let Some(node) = list.iter().find(|n| n.matches(hash, params)) {
                    let info = node.info.clone();
                    scope.touch_node(node, self.shared.user_clock.idx());
                    return info;
                }
            }
        }

        let node_is_new = {
            let mut inner = stripe.inner.write().unwrap();
            let already_present =
                inner.slots.get(&slot_idx).is_some_and(|list| list.iter().any(|n| n.matches(hash, params)));
            if already_present {
                false
            } else {
                log::debug!(
                    "dasm: cache miss, creating node hash={hash:?} vaddr=0x{:x} arch={:?} \
                     style_flags={:?} syntax={:?} base_vaddr=0x{:x} dbgi_key={:?}",
                    params.vaddr,
                    params.arch,
                    params.style_flags,
                    params.syntax,
                    params.base_vaddr,
                    params.dbgi_key,
                );
                let node = take_or_create_node(&mut inner, hash, params.clone());
                inner.slots.entry(slot_idx).or_default().push(node);
                true
            }
        };

        if node_is_new {
            self.shared.ring.enqueue(hash, params, DEADLINE_FOREVER);
        }

        Info::default()
    }

    /// Tries `rewind_idx = 0` then `1`; the first non-empty result wins.
    /// Writes the winning hash to `hash_out` if provided.
    #[must_use]
    pub fn info_from_key_params(
        &self,
        scope: &mut Scope,
        key: Key,
        params: &Params,
        hash_out: Option<&mut Hash>,
    ) -> Info {
        let mut hash_out = hash_out;
        for rewind_idx in 0..2 {
            let hash = self.shared.collab.hash_store.hash_from_key(key, rewind_idx);
            let info = self.info_from_hash_params(scope, hash, params);
            if !info.is_empty() {
                if let Some(out) = hash_out.as_deref_mut() {
                    *out = hash;
                }
                return info;
            }
        }
        Info::default()
    }

    /// Join the worker and evictor/detector threads. Blocks until any
    /// in-flight request finishes.
    pub fn shutdown(mut self) {
        self.shared.ring.close();
        self.shared.shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.evictor_handle.take() {
            let _ = handle.join();
        }
    }
}
