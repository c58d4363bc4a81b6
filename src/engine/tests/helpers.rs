use crate::engine::{Engine, EngineConfig};
use crate::entry::{Entry, Value};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine persisting to `path`.
pub fn open_at(path: &Path) -> Engine {
    init_tracing();
    Engine::open(EngineConfig::at(path)).unwrap()
}

/// Engine with no base path.
pub fn open_in_memory() -> Engine {
    init_tracing();
    Engine::open(EngineConfig::default()).unwrap()
}

/// Closes `engine` and opens a fresh one over the same directory.
pub fn reopen(engine: Engine, path: &Path) -> Engine {
    engine.close().unwrap();
    drop(engine);
    open_at(path)
}

pub fn put(key: &str, value: &str) -> Entry {
    Entry::new(key.as_bytes(), value.as_bytes())
}

pub fn del(key: &str) -> Entry {
    Entry::tombstone(key.as_bytes())
}

/// Live value of `key` as a string, `None` if absent or deleted.
pub fn get_str(engine: &Engine, key: &str) -> Option<String> {
    engine.get(key.as_bytes()).unwrap().map(|e| match e.value {
        Value::Present(v) => String::from_utf8(v).unwrap(),
        Value::Tombstone => panic!("get returned a tombstone"),
    })
}

/// Collects `range(from, to)` into entries, panicking on errors.
pub fn scan(engine: &Engine, from: Option<&str>, to: Option<&str>) -> Vec<Entry> {
    engine
        .range(from.map(str::as_bytes), to.map(str::as_bytes))
        .unwrap()
        .map(Result::unwrap)
        .collect()
}

/// Number of finalized segment files in `path`.
pub fn segment_file_count(path: &Path) -> usize {
    std::fs::read_dir(path)
        .unwrap()
        .filter(|e| {
            let name = e.as_ref().unwrap().file_name();
            crate::segment::is_segment_file(name.to_str().unwrap())
        })
        .count()
}
