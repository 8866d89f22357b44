//! Core data model: content hashes/keys, decoded instructions, and the
//! cached disassembly result.
//!
//! `Hash` and `Key` are both 128-bit values; they are kept as distinct types
//! even though their representation is identical because the cache indexes
//! nodes by `Hash` while callers address content by `Key` (the blob store is
//! what maps one to the other, possibly more than one way via `rewind_idx`).

use std::fmt;

/// A 128-bit value, stored as two little-endian 64-bit words.
///
/// `word1` is the word used to derive a slot index; keeping the two words
/// named rather than using a bare `u128` makes that indexing choice
/// explicit at every call site.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U128 {
    pub word0: u64,
    pub word1: u64,
}

impl U128 {
    #[must_use]
    pub const fn new(word0: u64, word1: u64) -> Self {
        Self { word0, word1 }
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self { word0: 0, word1: 0 }
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.word0 == 0 && self.word1 == 0
    }

    pub(crate) fn to_le_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.word0.to_le_bytes());
        out[8..].copy_from_slice(&self.word1.to_le_bytes());
        out
    }

    pub(crate) fn from_le_bytes(bytes: [u8; 16]) -> Self {
        let word0 = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        let word1 = u64::from_le_bytes(bytes[8..].try_into().unwrap());
        Self { word0, word1 }
    }
}

impl fmt::Debug for U128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}{:016x}", self.word0, self.word1)
    }
}

/// Content hash identifying a blob of machine code in the blob store.
pub type Hash = U128;

/// Logical content key a caller hands the cache; mapped to one or more
/// [`Hash`]es by the blob store via `rewind_idx`.
pub type Key = U128;

/// A single decoded instruction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inst {
    /// Byte offset from the start of the blob.
    pub code_off: u64,
    /// Absolute jump destination if this instruction's first operand was a
    /// jump-immediate; zero otherwise.
    pub jump_dst_vaddr: u64,
    /// Half-open byte range into the rendered text this instruction occupies.
    pub text_range: TextRange,
}

/// A half-open `[start, end)` byte range into a rendered text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRange {
    pub start: u64,
    pub end: u64,
}

impl TextRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }
}

/// The cached result of disassembling one `(hash, Params)` pair.
///
/// An empty `Info` (`insts` is empty) signals "not yet computed" to callers;
/// the rendered text itself is not stored here — it lives in the blob store
/// under `text_key`, which callers fetch separately.
#[derive(Debug, Clone, Default)]
pub struct Info {
    pub text_key: Key,
    pub insts: Vec<Inst>,
}

impl Info {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}
