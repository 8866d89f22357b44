//! Manual exploration tool: stands up a [`DasmCache`] over the in-memory
//! stub collaborators, submits a single disassembly request for a fixed
//! buffer of bytes, and prints whatever the cache returns.
//!
//! There is no real binary/PDB ingestion behind this — see
//! `src/collab/stub.rs` — so `--binary` only labels the debug-info key the
//! demo registers a synthetic `Rdi` under.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dasm_cache::{
    Arch, Collaborators, DasmCache, DasmCacheConfig, DbgiKey, Params, Procedure, Rdi, ScopeRecord,
    StyleFlags, Syntax, Thresholds, Unit,
};

#[derive(Parser)]
#[command(
    name = "dasm-cache-demo",
    about = "Exercise the disassembly cache against a synthetic buffer",
    after_help = "\
EXAMPLES:
    dasm-cache-demo --addr 0x1000 --syntax att
    dasm-cache-demo --binary app.exe --code-bytes --symbols"
)]
struct Args {
    /// Virtual address the synthetic buffer starts at.
    #[arg(long, default_value = "0x1000", value_parser = parse_hex_u64)]
    addr: u64,

    /// Label for the debug-info key this demo registers (no real file is read).
    #[arg(short, long)]
    binary: Option<String>,

    /// Assembly syntax dialect.
    #[arg(long, value_enum, default_value = "intel")]
    syntax: SyntaxArg,

    /// Show the address column.
    #[arg(long)]
    addresses: bool,

    /// Show the raw code-bytes column.
    #[arg(long = "code-bytes")]
    code_bytes: bool,

    /// Annotate jump targets with symbol names.
    #[arg(long)]
    symbols: bool,

    /// Number of table slots.
    #[arg(long, default_value_t = 1024)]
    slots: u64,

    /// Request ring size, in bytes.
    #[arg(long, default_value_t = 65536)]
    ring_size_bytes: usize,

    /// How long to wait for the background parse to land, in milliseconds.
    #[arg(long, default_value_t = 200)]
    wait_ms: u64,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SyntaxArg {
    Intel,
    Att,
}

fn parse_hex_u64(s: &str) -> Result<u64, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let hash_store = Arc::new(dasm_cache::collab::stub::InMemoryHashStore::new());
    let debug_info_store = Arc::new(dasm_cache::collab::stub::InMemoryDebugInfoStore::new());
    let text_store = Arc::new(dasm_cache::collab::stub::InMemoryTextStore::new(hash_store.clone()));
    let fs_watcher = Arc::new(dasm_cache::collab::stub::InMemoryFsWatcher::new());
    let decoder = Arc::new(dasm_cache::collab::stub::SimpleDecoder);

    let binary_label = args.binary.clone().unwrap_or_else(|| "demo.bin".to_string());
    let dbgi_key = DbgiKey { path: binary_label.clone(), min_timestamp: 0 };
    debug_info_store.insert(
        binary_label,
        Rdi {
            id: 1,
            units: vec![Unit { voff_range: (0, 0x100), lines: Vec::new() }],
            source_files: Vec::new(),
            scopes: vec![ScopeRecord { voff_range: (0, 0x100), proc_idx: 0 }],
            procedures: vec![Procedure { name: "demo_entry".to_string() }],
        },
    );

    let collab = Collaborators { hash_store: hash_store.clone(), debug_info_store, text_store, fs_watcher, decoder };
    let config = DasmCacheConfig {
        slots: args.slots,
        ring_size_bytes: args.ring_size_bytes,
        evict_threshold: Thresholds { us: 10_000_000, user_clocks: 10 },
        retry_threshold: Thresholds { us: 1_000_000, user_clocks: 10 },
        ..DasmCacheConfig::default()
    };

    let cache = DasmCache::new(config, collab).context("failed to start dasm cache")?;

    let code = [0x90u8, 0x90, 0xE9, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x90];
    let hash = hash_store.put_keyed(dasm_cache::Hash::new(0, 1), 0, code.to_vec());

    let mut style_flags = StyleFlags::empty();
    if args.addresses {
        style_flags |= StyleFlags::ADDRESSES;
    }
    if args.code_bytes {
        style_flags |= StyleFlags::CODE_BYTES;
    }
    if args.symbols {
        style_flags |= StyleFlags::SYMBOL_NAMES;
    }

    let syntax = match args.syntax {
        SyntaxArg::Intel => Syntax::Intel,
        SyntaxArg::Att => Syntax::Att,
    };
    let params = Params::new(args.addr, Arch::X64, style_flags, syntax).with_dbgi_key(dbgi_key);

    let mut scope = cache.scope_open();
    let mut info = cache.info_from_hash_params(&mut scope, hash, &params);
    let deadline = std::time::Instant::now() + Duration::from_millis(args.wait_ms);
    while info.is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
        info = cache.info_from_hash_params(&mut scope, hash, &params);
    }

    if info.is_empty() {
        println!("(still parsing after {}ms — try --wait-ms with a larger value)", args.wait_ms);
    } else {
        println!("decoded {} instruction(s), text_key = {:?}", info.insts.len(), info.text_key);
        let text_hash = hash_store.hash_from_key(info.text_key, 0);
        let text = hash_store.data_from_hash(text_hash);
        println!("{}", String::from_utf8_lossy(&text));
    }

    cache.scope_close(scope);
    cache.shutdown();
    Ok(())
}
