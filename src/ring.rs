//! Bounded byte ring carrying disassembly requests from caller threads to
//! the parse worker pool.
//!
//! A single mutex serializes both producer and consumer sides; a single
//! condvar wakes waiters on either side (every successful enqueue *and*
//! every dequeue broadcasts it, since either event can unblock the other
//! side: space freed up, or a new record arrived).
//!
//! Wire layout per request, little-endian, fixed so there is one obvious
//! place to look when a record round-trip test fails:
//!
//! 1. `hash` (16 bytes)
//! 2. `vaddr` (8 bytes)
//! 3. `arch` (4 bytes)
//! 4. `style_flags` (4 bytes)
//! 5. `syntax` (4 bytes)
//! 6. `base_vaddr` (8 bytes)
//! 7. `path_len` (8 bytes)
//! 8. `path_bytes` (`path_len` bytes)
//! 9. `min_timestamp` (8 bytes)
//! 10. padding: advance `pos` by 7, then round down to a multiple of 8.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::clock::{now_us, DEADLINE_FOREVER};
use crate::model::Hash;
use crate::params::{Arch, DbgiKey, Params, StyleFlags, Syntax};

/// Fixed header size (everything but the variable-length path), matching the
/// size check `dasm_u2p_enqueue_req` performs before writing.
const FIXED_RECORD_SIZE: u64 = 16 + 8 + 4 + 4 + 4 + 8 + 8 + 8;

struct RingState {
    buf: Vec<u8>,
    size: u64,
    write_pos: u64,
    read_pos: u64,
    closed: bool,
}

impl RingState {
    fn occupancy(&self) -> u64 {
        self.write_pos - self.read_pos
    }
}

/// A request enqueued by a caller, dequeued by a parse worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub hash: Hash,
    pub params: Params,
}

/// The mutex+condvar-guarded byte ring.
pub struct Ring {
    state: Mutex<RingState>,
    cv: Condvar,
}

/// Result of a blocking dequeue: either a request, or an indication the ring
/// was shut down (used to let parse worker threads exit cleanly in tests).
pub enum Dequeued {
    Request(Request),
    Closed,
}

impl Ring {
    #[must_use]
    pub fn new(size_bytes: usize) -> Self {
        let size = size_bytes as u64;
        Self {
            state: Mutex::new(RingState {
                buf: vec![0u8; size_bytes],
                size,
                write_pos: 0,
                read_pos: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Enqueue one request, blocking until space is available or `deadline_us`
    /// elapses. `deadline_us == DEADLINE_FOREVER` blocks indefinitely.
    /// Returns `false` on timeout (or once the ring has been closed).
    pub fn enqueue(&self, hash: Hash, params: &Params, deadline_us: u64) -> bool {
        let path_len = params.dbgi_key.path.len() as u64;
        let needed = FIXED_RECORD_SIZE + path_len;

        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return false;
            }
            let available = state.size - state.occupancy();
            if available >= needed {
                write_record(&mut state, hash, params);
                drop(state);
                self.cv.notify_all();
                return true;
            }
            if deadline_us != DEADLINE_FOREVER && now_us() >= deadline_us {
                log::trace!("dasm: ring enqueue timed out, needed={needed} available={available}");
                return false;
            }
            log::trace!("dasm: ring enqueue blocking, needed={needed} available={available}");
            state = wait_with_deadline(&self.cv, state, deadline_us);
        }
    }

    /// Dequeue one request, blocking until a whole record is present or the
    /// ring is closed via [`Ring::close`].
    pub fn dequeue(&self) -> Dequeued {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.occupancy() >= FIXED_RECORD_SIZE {
                let req = read_record(&mut state);
                drop(state);
                self.cv.notify_all();
                return Dequeued::Request(req);
            }
            if state.closed {
                return Dequeued::Closed;
            }
            log::trace!("dasm: ring dequeue blocking, occupancy={}", state.occupancy());
            state = wait_with_deadline(&self.cv, state, DEADLINE_FOREVER);
        }
    }

    /// Signal all blocked enqueuers/dequeuers to wake up and stop; used to
    /// tear down worker threads deterministically in tests.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.cv.notify_all();
    }
}

fn wait_with_deadline<'a>(
    cv: &Condvar,
    state: std::sync::MutexGuard<'a, RingState>,
    deadline_us: u64,
) -> std::sync::MutexGuard<'a, RingState> {
    if deadline_us == DEADLINE_FOREVER {
        cv.wait(state).unwrap()
    } else {
        let remaining_us = deadline_us.saturating_sub(now_us());
        let timeout = Duration::from_micros(remaining_us).max(Duration::from_millis(1));
        let (guard, _) = cv.wait_timeout(state, timeout).unwrap();
        guard
    }
}

fn ring_write(state: &mut RingState, data: &[u8]) {
    let size = state.size;
    let mut pos = state.write_pos % size;
    let mut written = 0usize;
    while written < data.len() {
        let chunk = std::cmp::min(data.len() - written, (size - pos) as usize);
        state.buf[pos as usize..pos as usize + chunk]
            .copy_from_slice(&data[written..written + chunk]);
        written += chunk;
        pos = (pos + chunk as u64) % size;
    }
    state.write_pos += data.len() as u64;
}

fn ring_read(state: &mut RingState, out: &mut [u8]) {
    let size = state.size;
    let mut pos = state.read_pos % size;
    let mut read = 0usize;
    while read < out.len() {
        let chunk = std::cmp::min(out.len() - read, (size - pos) as usize);
        out[read..read + chunk].copy_from_slice(&state.buf[pos as usize..pos as usize + chunk]);
        read += chunk;
        pos = (pos + chunk as u64) % size;
    }
    state.read_pos += out.len() as u64;
}

fn pad_to_8(pos: u64) -> u64 {
    let p = pos + 7;
    p - (p % 8)
}

fn write_record(state: &mut RingState, hash: Hash, params: &Params) {
    ring_write(state, &hash.to_le_bytes());
    ring_write(state, &params.vaddr.to_le_bytes());
    ring_write(state, &params.arch.wire_tag().to_le_bytes());
    ring_write(state, &params.style_flags.bits().to_le_bytes());
    ring_write(state, &params.syntax.wire_tag().to_le_bytes());
    ring_write(state, &params.base_vaddr.to_le_bytes());
    let path_bytes = params.dbgi_key.path.as_bytes();
    ring_write(state, &(path_bytes.len() as u64).to_le_bytes());
    ring_write(state, path_bytes);
    ring_write(state, &params.dbgi_key.min_timestamp.to_le_bytes());
    state.write_pos = pad_to_8(state.write_pos);
}

fn read_record(state: &mut RingState) -> Request {
    let mut hash_bytes = [0u8; 16];
    ring_read(state, &mut hash_bytes);
    let hash = Hash::from_le_bytes(hash_bytes);

    let mut u64_buf = [0u8; 8];
    let mut u32_buf = [0u8; 4];

    ring_read(state, &mut u64_buf);
    let vaddr = u64::from_le_bytes(u64_buf);

    ring_read(state, &mut u32_buf);
    let arch = Arch::from_wire(u32::from_le_bytes(u32_buf));

    ring_read(state, &mut u32_buf);
    let style_flags = StyleFlags::from_bits_truncate(u32::from_le_bytes(u32_buf));

    ring_read(state, &mut u32_buf);
    let syntax = Syntax::from_wire(u32::from_le_bytes(u32_buf));

    ring_read(state, &mut u64_buf);
    let base_vaddr = u64::from_le_bytes(u64_buf);

    ring_read(state, &mut u64_buf);
    let path_len = u64::from_le_bytes(u64_buf) as usize;
    let mut path_buf = vec![0u8; path_len];
    ring_read(state, &mut path_buf);
    let path = String::from_utf8_lossy(&path_buf).into_owned();

    ring_read(state, &mut u64_buf);
    let min_timestamp = u64::from_le_bytes(u64_buf);

    state.read_pos = pad_to_8(state.read_pos);

    Request { hash, params: Params { vaddr, arch, style_flags, syntax, base_vaddr, dbgi_key: DbgiKey { path, min_timestamp } } }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str) -> (Hash, Params) {
        let hash = Hash::new(1, 2);
        let params = Params::new(0x4000, Arch::X64, StyleFlags::ADDRESSES | StyleFlags::CODE_BYTES, Syntax::Intel)
            .with_base_vaddr(0x1000)
            .with_dbgi_key(DbgiKey { path: path.to_string(), min_timestamp: 42 });
        (hash, params)
    }

    #[test]
    fn round_trip_preserves_fields() {
        let ring = Ring::new(4096);
        let (hash, params) = sample("src/main.rs");
        assert!(ring.enqueue(hash, &params, DEADLINE_FOREVER));
        match ring.dequeue() {
            Dequeued::Request(req) => {
                assert_eq!(req.hash, hash);
                assert_eq!(req.params, params);
            }
            Dequeued::Closed => panic!("expected a request"),
        }
    }

    #[test]
    fn round_trip_with_empty_path() {
        let ring = Ring::new(256);
        let (hash, params) = sample("");
        assert!(ring.enqueue(hash, &params, DEADLINE_FOREVER));
        match ring.dequeue() {
            Dequeued::Request(req) => assert_eq!(req.params.dbgi_key.path, ""),
            Dequeued::Closed => panic!("expected a request"),
        }
    }

    #[test]
    fn enqueue_returns_false_on_past_deadline_when_full() {
        let ring = Ring::new(64);
        let (hash, params) = sample("a/b/c.rs");
        // First request should fit; keep enqueueing with a deadline already
        // in the past until one is rejected for lack of space.
        let mut saw_failure = false;
        for _ in 0..20 {
            if !ring.enqueue(hash, &params, 0) {
                saw_failure = true;
                break;
            }
        }
        assert!(saw_failure, "expected a full ring to reject a non-blocking enqueue");
    }

    #[test]
    fn dequeue_wakes_on_close() {
        use std::sync::Arc;
        let ring = Arc::new(Ring::new(4096));
        let ring2 = Arc::clone(&ring);
        let handle = std::thread::spawn(move || matches!(ring2.dequeue(), Dequeued::Closed));
        // Give the dequeuer a moment to block, then close.
        std::thread::sleep(Duration::from_millis(20));
        ring.close();
        assert!(handle.join().unwrap());
    }
}
