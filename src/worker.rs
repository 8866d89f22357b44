//! Parse worker: dequeues requests, decodes, renders, and commits results.
//!
//! Machine-code decoding sits behind the [`crate::collab::Decoder`]
//! contract rather than being driven directly from this module, but every
//! step around it — single-flight dispatch, source annotation, text
//! rendering, commit — lives here in one straight-line pass per request.

use std::sync::atomic::Ordering;

use crate::cache::Shared;
use crate::collab::{LangKind, Rdi};
use crate::model::{Hash, Info, Inst, TextRange};
use crate::params::{Arch, Params, StyleFlags};
use crate::ring::Dequeued;

/// Matches the `0x4d534144` magic baked into the text-key hash input.
const TEXT_KEY_MAGIC: u64 = 0x4d53_4144;

pub(crate) fn run(shared: &Shared) {
    loop {
        let (hash, params) = match shared.ring.dequeue() {
            Dequeued::Request(req) => (req.hash, req.params),
            Dequeued::Closed => return,
        };

        let change_gen = shared.collab.fs_watcher.change_gen();
        let (slot_idx, stripe_idx) = shared.table.indices(hash);
        let stripe = shared.table.stripe(stripe_idx);

        let generation = {
            let inner = stripe.inner.read().unwrap();
            let node = inner.slots.get(&slot_idx).and_then(|list| list.iter().find(|n| n.matches(hash, &params)));
            match node {
                Some(node) if node.is_working.compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst).is_ok() => {
                    Some(node.generation.load(Ordering::SeqCst))
                }
                _ => None,
            }
        };
        let Some(generation) = generation else { continue };

        let rdi =
            if params.dbgi_key.is_empty() { None } else { shared.collab.debug_info_store.rdi_from_key(&params.dbgi_key) };

        let data = shared.collab.hash_store.data_from_hash(hash);
        let (insts, text) = decode_and_render(shared, &params, rdi.as_deref(), &data);

        let text_key = text_key_for(shared, hash, &params, rdi.as_deref());
        shared.collab.hash_store.submit_data(text_key, text.into_bytes());

        let info = Info { text_key, insts };
        let has_source_annotations = rdi.is_some() && params.style_flags.intersects(StyleFlags::SOURCE_LINES | StyleFlags::SOURCE_FILES_NAMES);

        commit(shared, slot_idx, stripe_idx, hash, &params, generation, info, has_source_annotations, change_gen);
    }
}

fn commit(
    shared: &Shared,
    slot_idx: u64,
    stripe_idx: u64,
    hash: Hash,
    params: &Params,
    expected_generation: u64,
    info: Info,
    has_source_annotations: bool,
    change_gen: u64,
) {
    let stripe = shared.table.stripe(stripe_idx);
    let mut inner = stripe.inner.write().unwrap();
    let Some(list) = inner.slots.get_mut(&slot_idx) else { return };
    let Some(node) = list.iter_mut().find(|n| n.matches(hash, params)) else { return };
    if node.generation.load(Ordering::SeqCst) != expected_generation {
        // The slot was evicted and recycled for a different occupant while
        // this worker was decoding; the node in hand is no longer ours.
        return;
    }
    node.info = info;
    node.change_gen.store(if has_source_annotations { change_gen } else { 0 }, Ordering::SeqCst);
    node.is_working.store(0, Ordering::SeqCst);
    node.load_count.fetch_add(1, Ordering::SeqCst);
}

fn text_key_for(shared: &Shared, hash: Hash, params: &Params, rdi: Option<&Rdi>) -> Hash {
    let rdi_identity = rdi.map_or(0, |r| r.id);
    let words: [u64; 8] = [
        hash.word0,
        hash.word1,
        params.vaddr,
        u64::from(params.arch.wire_tag()),
        u64::from(params.style_flags.bits()),
        u64::from(params.syntax.wire_tag()),
        rdi_identity,
        TEXT_KEY_MAGIC,
    ];
    let mut bytes = Vec::with_capacity(words.len() * 8);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    shared.collab.hash_store.hash_from_data(&bytes)
}

/// Accumulates rendered lines and their `Inst` records, tracking the byte
/// cursor into the eventual `"\n"`-joined text as each line is pushed.
struct Renderer {
    insts: Vec<Inst>,
    lines: Vec<String>,
    cursor: u64,
}

impl Renderer {
    fn new() -> Self {
        Self { insts: Vec::new(), lines: Vec::new(), cursor: 0 }
    }

    fn push(&mut self, code_off: u64, jump_dst_vaddr: u64, text: String) {
        let start = self.cursor;
        let end = start + text.len() as u64;
        self.insts.push(Inst { code_off, jump_dst_vaddr, text_range: TextRange::new(start, end) });
        self.cursor = end + 1;
        self.lines.push(text);
    }

    /// Push a synthetic source-annotation line (a file header or a source
    /// line of text). These advance the text cursor like any other line but
    /// do not correspond to a decoded instruction, so the `Inst` record is
    /// all-zero rather than carrying this line's `text_range`/`code_off`.
    fn push_annotation(&mut self, text: String) {
        self.cursor += text.len() as u64 + 1;
        self.insts.push(Inst::default());
        self.lines.push(text);
    }

    fn finish(self) -> (Vec<Inst>, String) {
        (self.insts, self.lines.join("\n"))
    }
}

fn decode_and_render(shared: &Shared, params: &Params, rdi: Option<&Rdi>, data: &[u8]) -> (Vec<Inst>, String) {
    let mut r = Renderer::new();
    if !matches!(params.arch, Arch::X86 | Arch::X64) {
        return r.finish();
    }

    let mut last_file_idx: Option<usize> = None;
    let mut last_line_voff: Option<u64> = None;
    let mut off: u64 = 0;

    while (off as usize) < data.len() {
        let decoded = shared.collab.decoder.decode_one(data, off as usize, params.vaddr + off, params.arch, params.syntax);
        if decoded.size == 0 {
            break;
        }
        let jump_dst_vaddr = decoded.jump_dst_vaddr;

        if params.style_flags.intersects(StyleFlags::SOURCE_FILES_NAMES | StyleFlags::SOURCE_LINES) {
            if let Some(rdi) = rdi {
                let voff = (params.vaddr + off).saturating_sub(params.base_vaddr);
                if let Some(unit) = rdi.unit_at_voff(voff) {
                    if let Some(line) = rdi.line_at_voff(unit, voff) {
                        let file_path =
                            rdi.source_files.get(line.file_idx).map(|f| f.normalized_full_path.as_str()).unwrap_or("");

                        if last_file_idx != Some(line.file_idx) {
                            if params.style_flags.contains(StyleFlags::SOURCE_FILES_NAMES) {
                                if file_path.is_empty() {
                                    r.push_annotation(">".to_string());
                                } else {
                                    r.push_annotation(format!("> {file_path}"));
                                }
                            }
                            last_file_idx = Some(line.file_idx);
                        }

                        if last_line_voff != Some(line.voff)
                            && !file_path.is_empty()
                            && params.style_flags.contains(StyleFlags::SOURCE_LINES)
                        {
                            if let Some(line_text) = source_line_text(shared, file_path, line.line_num) {
                                if !line_text.is_empty() {
                                    r.push_annotation(format!("> {line_text}"));
                                }
                            }
                            last_line_voff = Some(line.voff);
                        }
                    }
                }
            }
        }

        let addr_part = if params.style_flags.contains(StyleFlags::ADDRESSES) {
            let prefix = if rdi.is_some() { "  " } else { "" };
            format!("{prefix}{:016X}  ", params.vaddr + off)
        } else {
            String::new()
        };

        let code_bytes_part = if params.style_flags.contains(StyleFlags::CODE_BYTES) {
            render_code_bytes(data, off as usize, decoded.size)
        } else {
            String::new()
        };

        let symbol_part = if jump_dst_vaddr != 0 && params.style_flags.contains(StyleFlags::SYMBOL_NAMES) {
            rdi.and_then(|rdi| rdi.procedure_name_at_voff(jump_dst_vaddr.saturating_sub(params.base_vaddr)))
                .filter(|name| !name.is_empty())
                .map(|name| format!(" ({name})"))
                .unwrap_or_default()
        } else {
            String::new()
        };

        let text = format!("{addr_part}{code_bytes_part}{}{symbol_part}", decoded.text);
        r.push(off, jump_dst_vaddr, text);

        off += decoded.size as u64;
    }

    r.finish()
}

/// Resolves a source line's trimmed text through the filesystem watch, text
/// store, and blob store, mirroring the `txt_text_info_from_key_lang` /
/// `hs_data_from_hash` pair in the original. Returns `None` if the file is
/// gone, unwatched, or the line index is out of range — any of which the
/// worker treats as "no annotation", never as an error.
fn source_line_text(shared: &Shared, file_path: &str, line_num: u32) -> Option<String> {
    let props = shared.collab.fs_watcher.properties_from_path(file_path);
    if props.modified == 0 {
        return None;
    }
    let key = shared.collab.fs_watcher.key_from_path(file_path);
    let lang = LangKind::from_path(file_path);
    let text_info = shared.collab.text_store.text_info_from_key_lang(key, lang)?;

    let line_idx = usize::try_from(line_num).ok()?;
    if line_idx == 0 || line_idx > text_info.line_ranges.len() {
        return None;
    }
    let (start, end) = text_info.line_ranges[line_idx - 1];
    let source_bytes = shared.collab.hash_store.data_from_hash(text_info.hash);
    let slice = source_bytes.get(start as usize..end as usize)?;
    Some(String::from_utf8_lossy(slice).trim().to_string())
}

fn render_code_bytes(data: &[u8], off: usize, size: usize) -> String {
    let mut out = String::from("{");
    for byte_idx in 0..size.max(16) {
        if byte_idx < size {
            out.push_str(&format!("{:02x}", data[off + byte_idx]));
            if byte_idx == size - 1 {
                out.push('}');
            }
            out.push(' ');
        } else if byte_idx < 8 {
            out.push_str("   ");
        }
    }
    out.push(' ');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::stub::{InMemoryDebugInfoStore, InMemoryFsWatcher, InMemoryHashStore, InMemoryTextStore, SimpleDecoder};
    use crate::collab::Collaborators;
    use crate::config::DasmCacheConfig;
    use crate::params::Syntax;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_shared(ring_size: usize) -> Shared {
        let hash_store = Arc::new(InMemoryHashStore::new());
        let collab = Collaborators {
            hash_store: hash_store.clone(),
            debug_info_store: Arc::new(InMemoryDebugInfoStore::new()),
            text_store: Arc::new(InMemoryTextStore::new(hash_store)),
            fs_watcher: Arc::new(InMemoryFsWatcher::new()),
            decoder: Arc::new(SimpleDecoder),
        };
        let config = DasmCacheConfig {
            slots: 16,
            ring_size_bytes: ring_size,
            parse_thread_count: 1,
            sweep_interval: Duration::from_millis(10),
            ..DasmCacheConfig::default()
        };
        Shared {
            table: crate::table::Table::new(config.slots),
            ring: crate::ring::Ring::new(config.ring_size_bytes),
            user_clock: crate::clock::UserClock::new(),
            collab,
            config,
            shutdown: AtomicBool::new(false),
        }
    }

    #[test]
    fn render_code_bytes_pads_short_runs_to_eight() {
        let data = [0x90u8, 0x90];
        let rendered = render_code_bytes(&data, 0, 2);
        assert!(rendered.starts_with("{90 90}"), "got {rendered:?}");
        assert_eq!(rendered.len(), 27, "column should pad out to 8 byte-slots plus trailing space");
    }

    #[test]
    fn decode_and_render_emits_db_lines_for_unknown_bytes() {
        let shared = test_shared(4096);
        let params = Params::new(0x1000, Arch::X64, StyleFlags::ADDRESSES, Syntax::Intel);
        let (insts, text) = decode_and_render(&shared, &params, None, &[0x90, 0x90]);
        assert_eq!(insts.len(), 2);
        assert!(text.contains("db 0x90"));
    }

    #[test]
    fn decode_and_render_stops_on_empty_data() {
        let shared = test_shared(4096);
        let params = Params::new(0x1000, Arch::X64, StyleFlags::empty(), Syntax::Intel);
        let (insts, text) = decode_and_render(&shared, &params, None, &[]);
        assert!(insts.is_empty());
        assert!(text.is_empty());
    }

    #[test]
    fn worker_commits_decoded_info_for_enqueued_node() {
        let shared = test_shared(4096);
        let hash = Hash::new(1, 1);
        shared.collab.hash_store.put(hash, vec![0x90, 0x90]);
        let params = Params::new(0x1000, Arch::X64, StyleFlags::empty(), Syntax::Intel);

        let (slot_idx, stripe_idx) = shared.table.indices(hash);
        {
            let mut inner = shared.table.stripe(stripe_idx).inner.write().unwrap();
            let node = crate::table::take_or_create_node(&mut inner, hash, params.clone());
            inner.slots.entry(slot_idx).or_default().push(node);
        }
        assert!(shared.ring.enqueue(hash, &params, crate::clock::DEADLINE_FOREVER));
        shared.ring.close();

        run(&shared);

        let inner = shared.table.stripe(stripe_idx).inner.read().unwrap();
        let node = inner.slots[&slot_idx].iter().find(|n| n.matches(hash, &params)).unwrap();
        assert_eq!(node.load_count.load(Ordering::SeqCst), 1);
        assert!(!node.info.is_empty());
    }
}
