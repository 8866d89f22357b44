//! External collaborator contracts.
//!
//! These are narrow interfaces onto systems this crate does not implement:
//! the content-addressed blob store, the debug-info store, the text store
//! and filesystem watch, and the decoder. [`stub`] provides small
//! deterministic in-memory implementations so this crate's own test suite
//! can drive the cache end to end without a real decoder or DWARF reader on
//! hand.

pub mod stub;

use std::sync::Arc;

use crate::model::{Hash, Key};
use crate::params::{Arch, DbgiKey, Syntax};

/// Content-addressed blob store.
pub trait HashStore: Send + Sync {
    /// Map `(key, rewind_idx)` to a content hash; zero if unresolved.
    fn hash_from_key(&self, key: Key, rewind_idx: u32) -> Hash;
    /// Fetch the bytes for a hash; empty if absent.
    fn data_from_hash(&self, hash: Hash) -> Vec<u8>;
    /// Submit data under a key, returning its content hash.
    fn submit_data(&self, key: Key, bytes: Vec<u8>) -> Hash;
    /// Hash arbitrary bytes (used to derive the rendered text's content key).
    fn hash_from_data(&self, bytes: &[u8]) -> Hash;
}

/// One source line's resolved location.
#[derive(Debug, Clone)]
pub struct LineRecord {
    /// Virtual offset (from the unit's module base) this line starts at.
    pub voff: u64,
    pub file_idx: usize,
    pub line_num: u32,
}

/// A compilation/translation unit's voff range and line table.
#[derive(Debug, Clone)]
pub struct Unit {
    pub voff_range: (u64, u64),
    /// Sorted ascending by `voff`.
    pub lines: Vec<LineRecord>,
}

/// A lexical scope's voff range, resolving (for the outermost scopes that
/// matter here) to an owning procedure.
#[derive(Debug, Clone)]
pub struct ScopeRecord {
    pub voff_range: (u64, u64),
    pub proc_idx: usize,
}

/// A normalized source file path known to the debug info.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub normalized_full_path: String,
}

/// A named procedure, addressable via the scope vmap.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: String,
}

/// Parsed debug info for one binary/PDB, analogous to `RDI_Parsed`.
///
/// `id` is a stable per-object identity (standing in for the original's use
/// of the `RDI_Parsed*` pointer as part of the text-key hash input) — see
/// `DESIGN.md` for why a pointer isn't appropriate in Rust.
#[derive(Debug, Clone, Default)]
pub struct Rdi {
    pub id: u64,
    pub units: Vec<Unit>,
    pub source_files: Vec<SourceFile>,
    pub scopes: Vec<ScopeRecord>,
    pub procedures: Vec<Procedure>,
}

impl Rdi {
    /// Locate the unit whose voff range contains `voff`.
    #[must_use]
    pub fn unit_at_voff(&self, voff: u64) -> Option<&Unit> {
        self.units.iter().find(|u| u.voff_range.0 <= voff && voff < u.voff_range.1)
    }

    /// Locate the last line record in `unit` starting at or before `voff`
    /// (mirrors `rdi_line_info_idx_from_voff`'s "containing range" lookup).
    #[must_use]
    pub fn line_at_voff<'a>(&self, unit: &'a Unit, voff: u64) -> Option<&'a LineRecord> {
        unit.lines.iter().rev().find(|l| l.voff <= voff)
    }

    /// Locate the scope (and through it, procedure) whose voff range
    /// contains `voff`.
    #[must_use]
    pub fn scope_at_voff(&self, voff: u64) -> Option<&ScopeRecord> {
        self.scopes.iter().find(|s| s.voff_range.0 <= voff && voff < s.voff_range.1)
    }

    #[must_use]
    pub fn procedure_name_at_voff(&self, voff: u64) -> Option<&str> {
        let scope = self.scope_at_voff(voff)?;
        self.procedures.get(scope.proc_idx).map(|p| p.name.as_str())
    }
}

/// Debug-info store.
pub trait DebugInfoStore: Send + Sync {
    /// Resolve a debug-info key to parsed debug info, or `None` if absent —
    /// treated by the worker as "no source annotations", never as an error.
    fn rdi_from_key(&self, key: &DbgiKey) -> Option<Arc<Rdi>>;
}

/// One source file's line table, resolved from the text store.
#[derive(Debug, Clone)]
pub struct TextInfo {
    pub hash: Hash,
    /// Byte range of line `n` (1-based) is `line_ranges[n - 1]`.
    pub line_ranges: Vec<(u64, u64)>,
}

/// Text store — resolves a path's content to a hash and a line table, keyed
/// by a language hint derived from the file extension.
pub trait TextStore: Send + Sync {
    fn text_info_from_key_lang(&self, key: Key, lang: LangKind) -> Option<TextInfo>;
}

/// Coarse language hint used only to pick a line-splitting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LangKind {
    PlainText,
    C,
    Rust,
}

impl LangKind {
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        match path.rsplit('.').next() {
            Some("rs") => LangKind::Rust,
            Some("c" | "h" | "cpp" | "hpp") => LangKind::C,
            _ => LangKind::PlainText,
        }
    }
}

/// Filesystem watch.
pub trait FsWatcher: Send + Sync {
    /// Monotonically increases whenever any watched file changes.
    fn change_gen(&self) -> u64;
    fn key_from_path(&self, path: &str) -> Key;
    fn properties_from_path(&self, path: &str) -> FileProperties;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileProperties {
    /// Non-zero if the path resolved to a real, readable file.
    pub modified: u64,
}

/// One decoded instruction, as the decoder contract hands it to the worker.
#[derive(Debug, Clone, Default)]
pub struct DecodedInst {
    /// Size in bytes; zero terminates decoding (a decode failure mid-stream
    /// stops the rest of the run rather than producing garbage).
    pub size: usize,
    /// The decoder's formatted mnemonic text for this instruction (no
    /// address/code-bytes/symbol columns — the worker adds those).
    pub text: String,
    /// Absolute jump destination if the first operand was a jump-immediate;
    /// zero otherwise.
    pub jump_dst_vaddr: u64,
}

/// The machine-code decoder (out of scope for this crate; described only by
/// the interface the core consumes).
pub trait Decoder: Send + Sync {
    fn decode_one(&self, data: &[u8], off: usize, vaddr: u64, arch: Arch, syntax: Syntax) -> DecodedInst;
}

/// The bundle of collaborators a [`crate::DasmCache`] is constructed with.
pub struct Collaborators {
    pub hash_store: Arc<dyn HashStore>,
    pub debug_info_store: Arc<dyn DebugInfoStore>,
    pub text_store: Arc<dyn TextStore>,
    pub fs_watcher: Arc<dyn FsWatcher>,
    pub decoder: Arc<dyn Decoder>,
}
