//! Optional global string interning. Off by default, in which case `intern` is the
//! identity (a fresh, uninterned allocation); [`enable`] turns on deduplication through a
//! shared pool guarded by a reader-writer lock, meant to be called once at start-up before
//! any parsing begins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

static ENABLED: AtomicBool = AtomicBool::new(false);

fn pool() -> &'static RwLock<HashMap<String, Arc<str>>> {
    static POOL: OnceLock<RwLock<HashMap<String, Arc<str>>>> = OnceLock::new();
    POOL.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Turns on the interning pool. Idempotent; intended to be called at most once, before any
/// parsing begins.
pub fn enable() {
    ENABLED.store(true, Ordering::SeqCst);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

/// Returns a shared handle for `s`, deduplicated against every other string interned so
/// far, when interning is enabled; otherwise a plain uninterned allocation.
pub fn intern(s: &str) -> Arc<str> {
    if !is_enabled() {
        return Arc::from(s);
    }
    if let Some(existing) = pool().read().unwrap().get(s) {
        return existing.clone();
    }
    pool().write().unwrap().entry(s.to_string()).or_insert_with(|| Arc::from(s)).clone()
}
