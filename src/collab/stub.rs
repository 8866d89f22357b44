//! Deterministic in-memory collaborator implementations.
//!
//! These exist only to drive this crate's own test suite and demo binary —
//! they are not meant to be the real blob-store, debug-info, text-store, or
//! filesystem-watch integrations a debugger frontend would plug in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    DebugInfoStore, DecodedInst, Decoder, FileProperties, FsWatcher, HashStore, LangKind, Rdi,
    TextInfo, TextStore,
};
use crate::model::{Hash, Key};
use crate::params::{Arch, DbgiKey, Syntax};

/// FNV-1a over two independent seeds, giving a cheap deterministic 128-bit
/// digest. Not cryptographic; good enough for content-addressing test data.
fn fnv128(bytes: &[u8]) -> Hash {
    fn fnv64(bytes: &[u8], seed: u64) -> u64 {
        let mut hash = seed;
        for &b in bytes {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
        }
        hash
    }
    Hash::new(fnv64(bytes, 0xcbf2_9ce4_8422_2325), fnv64(bytes, 0x9e37_79b9_7f4a_7c15))
}

/// In-memory content-addressed blob store.
#[derive(Default)]
pub struct InMemoryHashStore {
    by_hash: Mutex<HashMap<Hash, Vec<u8>>>,
    by_key_rewind: Mutex<HashMap<(Key, u32), Hash>>,
}

impl InMemoryHashStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blob directly under its content hash.
    pub fn put(&self, hash: Hash, data: Vec<u8>) {
        self.by_hash.lock().unwrap().insert(hash, data);
    }

    /// Register a `(key, rewind_idx) -> hash` mapping, as a real blob store
    /// would after ingesting a version of some content.
    pub fn map_key(&self, key: Key, rewind_idx: u32, hash: Hash) {
        self.by_key_rewind.lock().unwrap().insert((key, rewind_idx), hash);
    }

    /// Convenience: register `data` under a fresh content hash and map
    /// `key` at `rewind_idx` to it in one call. Returns the hash.
    pub fn put_keyed(&self, key: Key, rewind_idx: u32, data: Vec<u8>) -> Hash {
        let hash = self.hash_from_data(&data);
        self.put(hash, data);
        self.map_key(key, rewind_idx, hash);
        hash
    }
}

impl HashStore for InMemoryHashStore {
    fn hash_from_key(&self, key: Key, rewind_idx: u32) -> Hash {
        self.by_key_rewind.lock().unwrap().get(&(key, rewind_idx)).copied().unwrap_or(Hash::zero())
    }

    fn data_from_hash(&self, hash: Hash) -> Vec<u8> {
        self.by_hash.lock().unwrap().get(&hash).cloned().unwrap_or_default()
    }

    fn submit_data(&self, key: Key, bytes: Vec<u8>) -> Hash {
        let hash = self.hash_from_data(&bytes);
        self.by_hash.lock().unwrap().insert(hash, bytes);
        self.by_key_rewind.lock().unwrap().insert((key, 0), hash);
        hash
    }

    fn hash_from_data(&self, bytes: &[u8]) -> Hash {
        fnv128(bytes)
    }
}

/// In-memory debug-info store, keyed by `DbgiKey::path`.
#[derive(Default)]
pub struct InMemoryDebugInfoStore {
    by_path: Mutex<HashMap<String, Arc<Rdi>>>,
}

impl InMemoryDebugInfoStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, rdi: Rdi) {
        self.by_path.lock().unwrap().insert(path.into(), Arc::new(rdi));
    }
}

impl DebugInfoStore for InMemoryDebugInfoStore {
    fn rdi_from_key(&self, key: &DbgiKey) -> Option<Arc<Rdi>> {
        if key.path.is_empty() {
            return None;
        }
        self.by_path.lock().unwrap().get(&key.path).cloned()
    }
}

fn line_ranges_of(contents: &str) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut start = 0u64;
    for line in contents.split('\n') {
        let end = start + line.len() as u64;
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

/// In-memory text store. Registering a file's text both submits its bytes
/// to the shared [`InMemoryHashStore`] (so the worker's subsequent
/// `hs.data_from_hash` call can find it) and records its line table.
pub struct InMemoryTextStore {
    hash_store: Arc<InMemoryHashStore>,
    files: Mutex<HashMap<Key, (Hash, Vec<(u64, u64)>)>>,
}

impl InMemoryTextStore {
    #[must_use]
    pub fn new(hash_store: Arc<InMemoryHashStore>) -> Self {
        Self { hash_store, files: Mutex::new(HashMap::new()) }
    }

    pub fn set_file_text(&self, key: Key, contents: &str) {
        let bytes = contents.as_bytes().to_vec();
        let hash = self.hash_store.hash_from_data(&bytes);
        self.hash_store.put(hash, bytes);
        self.files.lock().unwrap().insert(key, (hash, line_ranges_of(contents)));
    }
}

impl TextStore for InMemoryTextStore {
    fn text_info_from_key_lang(&self, key: Key, _lang: LangKind) -> Option<TextInfo> {
        self.files
            .lock()
            .unwrap()
            .get(&key)
            .map(|(hash, line_ranges)| TextInfo { hash: *hash, line_ranges: line_ranges.clone() })
    }
}

/// In-memory filesystem watch. `bump_change_gen` simulates a file on disk
/// changing; tests use it to exercise the change-gen retry path (spec
/// scenario S5).
#[derive(Default)]
pub struct InMemoryFsWatcher {
    change_gen: AtomicU64,
    modified: Mutex<HashMap<String, u64>>,
}

impl InMemoryFsWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_change_gen(&self) -> u64 {
        self.change_gen.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn register_path(&self, path: impl Into<String>, modified: u64) {
        self.modified.lock().unwrap().insert(path.into(), modified);
    }
}

impl FsWatcher for InMemoryFsWatcher {
    fn change_gen(&self) -> u64 {
        self.change_gen.load(Ordering::SeqCst)
    }

    fn key_from_path(&self, path: &str) -> Key {
        fnv128(path.as_bytes())
    }

    fn properties_from_path(&self, path: &str) -> FileProperties {
        let modified = self.modified.lock().unwrap().get(path).copied().unwrap_or(0);
        FileProperties { modified }
    }
}

/// A minimal, deterministic stand-in for a real x86/x64 decoder. Understands
/// exactly two opcodes: `0xE9` (a toy "jump" whose 8-byte little-endian
/// absolute target follows the opcode byte) and everything else, which
/// decodes as a one-byte `db`.
#[derive(Debug, Default)]
pub struct SimpleDecoder;

impl Decoder for SimpleDecoder {
    fn decode_one(&self, data: &[u8], off: usize, _vaddr: u64, arch: Arch, syntax: Syntax) -> DecodedInst {
        if off >= data.len() || !matches!(arch, Arch::X86 | Arch::X64) {
            return DecodedInst::default();
        }
        let opcode = data[off];
        if opcode == 0xE9 && off + 9 <= data.len() {
            let target = u64::from_le_bytes(data[off + 1..off + 9].try_into().unwrap());
            let text = match syntax {
                Syntax::Intel => format!("jmp 0x{target:x}"),
                Syntax::Att => format!("jmp *0x{target:x}"),
            };
            return DecodedInst { size: 9, text, jump_dst_vaddr: target };
        }
        let text = match syntax {
            Syntax::Intel => format!("db 0x{opcode:02x}"),
            Syntax::Att => format!("$0x{opcode:02x}"),
        };
        DecodedInst { size: 1, text, jump_dst_vaddr: 0 }
    }
}
