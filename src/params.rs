//! Disassembly parameters: everything besides the content hash that
//! distinguishes one cache entry from another.

use bitflags::bitflags;

/// Target architecture. `Other` covers anything the decoder contract doesn't
/// special-case; per spec such requests produce an empty instruction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Arch {
    X86 = 0,
    X64 = 1,
    Other = 2,
}

impl Default for Arch {
    fn default() -> Self {
        Arch::X86
    }
}

impl Arch {
    #[must_use]
    pub const fn from_wire(tag: u32) -> Self {
        match tag {
            0 => Arch::X86,
            1 => Arch::X64,
            _ => Arch::Other,
        }
    }

    #[must_use]
    pub const fn wire_tag(self) -> u32 {
        self as u32
    }
}

/// Assembly syntax dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Syntax {
    Intel = 0,
    Att = 1,
}

impl Default for Syntax {
    fn default() -> Self {
        Syntax::Intel
    }
}

impl Syntax {
    #[must_use]
    pub const fn from_wire(tag: u32) -> Self {
        match tag {
            1 => Syntax::Att,
            _ => Syntax::Intel,
        }
    }

    #[must_use]
    pub const fn wire_tag(self) -> u32 {
        self as u32
    }
}

bitflags! {
    /// Rendering style flags controlling which columns/annotations appear
    /// in the disassembly text.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StyleFlags: u32 {
        const ADDRESSES          = 1 << 0;
        const CODE_BYTES         = 1 << 1;
        const SOURCE_FILES_NAMES = 1 << 2;
        const SOURCE_LINES       = 1 << 3;
        const SYMBOL_NAMES       = 1 << 4;
    }
}

/// Debug-info key: a path to the binary/PDB plus a minimum timestamp the
/// debug info must be at least as new as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DbgiKey {
    pub path: String,
    pub min_timestamp: u64,
}

impl DbgiKey {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// The full set of disassembly parameters that, together with a content
/// hash, identify one cache entry.
///
/// Two `Params` are equal iff every field matches, including the debug-info
/// key componentwise (path and minimum timestamp both match).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    pub vaddr: u64,
    pub arch: Arch,
    pub style_flags: StyleFlags,
    pub syntax: Syntax,
    pub base_vaddr: u64,
    pub dbgi_key: DbgiKey,
}

impl Params {
    #[must_use]
    pub fn new(vaddr: u64, arch: Arch, style_flags: StyleFlags, syntax: Syntax) -> Self {
        Self { vaddr, arch, style_flags, syntax, base_vaddr: 0, dbgi_key: DbgiKey::default() }
    }

    #[must_use]
    pub fn with_base_vaddr(mut self, base_vaddr: u64) -> Self {
        self.base_vaddr = base_vaddr;
        self
    }

    #[must_use]
    pub fn with_dbgi_key(mut self, dbgi_key: DbgiKey) -> Self {
        self.dbgi_key = dbgi_key;
        self
    }
}
