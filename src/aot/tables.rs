//! The AOT loader's three tables (§3 "AOT cache", §4.9): successfully
//! loaded native handles, handles pending deletion until their reference
//! count drops to zero, and the permanent compile-failure blacklist.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

pub(super) fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// One loaded (or loadable) native artifact. Reference-counted: every
/// [`NativeHandle`] acquired against it holds one count, and the handle's
/// own `path`/`library` are only torn down once that count reaches zero
/// *and* the entry has been marked for deletion.
pub struct NativeEntry {
    name: String,
    path: PathBuf,
    md5: String,
    refcount: AtomicU64,
    last_access: AtomicU64,
    pending_delete: AtomicBool,
    library: Option<libloading::Library>,
}

impl NativeEntry {
    fn new(name: String, path: PathBuf, md5: String, library: Option<libloading::Library>) -> Self {
        Self {
            name,
            path,
            md5,
            refcount: AtomicU64::new(0),
            last_access: AtomicU64::new(now_secs()),
            pending_delete: AtomicBool::new(false),
            library,
        }
    }

    /// Contract address this artifact was compiled for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filesystem path of the compiled shared object.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// `md5` of the WASM bytes this artifact was compiled from.
    #[must_use]
    pub fn md5(&self) -> &str {
        &self.md5
    }

    fn touch(&self) {
        self.last_access.store(now_secs(), Ordering::Relaxed);
    }

    fn idle_seconds(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_access.load(Ordering::Relaxed))
    }
}

/// A reference-counted handle onto a loaded native artifact, acquired via
/// [`Tables::acquire`]. Dropping it releases one reference; if the entry
/// was already marked for deletion and this was the last reference, the
/// handle and backing file are torn down immediately rather than waiting
/// for the next GC sweep.
pub struct NativeHandle {
    entry: Arc<NativeEntry>,
    tables: Arc<Tables>,
}

impl NativeHandle {
    /// The underlying artifact this handle references.
    #[must_use]
    pub fn entry(&self) -> &NativeEntry {
        &self.entry
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.tables.release(&self.entry);
    }
}

/// The process-wide `succ`/`onDelete`/`black` tables described in §3/§4.9.
#[derive(Default)]
pub struct Tables {
    succ: Mutex<HashMap<String, Arc<NativeEntry>>>,
    on_delete: Mutex<HashMap<String, Arc<NativeEntry>>>,
    black: Mutex<HashSet<String>>,
}

impl Tables {
    /// Builds empty tables.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// True once compilation for `name` has permanently failed.
    #[must_use]
    pub fn is_blacklisted(&self, name: &str) -> bool {
        self.black.lock().expect("aot tables poisoned").contains(name)
    }

    /// Permanently marks `name` as uncompilable; future loads short-circuit
    /// to interpreted execution without retrying `cc`.
    pub fn blacklist(&self, name: &str) {
        self.black.lock().expect("aot tables poisoned").insert(name.to_string());
    }

    /// Records a freshly compiled (or freshly verified) artifact under
    /// `name`, replacing anything already on record — a code upgrade must
    /// be able to supersede a stale native handle the same way it evicts
    /// the module cache.
    pub(super) fn record(self: &Arc<Self>, name: &str, path: PathBuf, md5: String, library: Option<libloading::Library>) -> Arc<NativeEntry> {
        self.black.lock().expect("aot tables poisoned").remove(name);
        let entry = Arc::new(NativeEntry::new(name.to_string(), path, md5, library));
        self.succ.lock().expect("aot tables poisoned").insert(name.to_string(), entry.clone());
        entry
    }

    /// Acquires a handle onto `name`'s loaded artifact, incrementing its
    /// reference count. Returns `None` if nothing is loaded for `name`
    /// (either never compiled, or already evicted).
    #[must_use]
    pub fn acquire(self: &Arc<Self>, name: &str) -> Option<NativeHandle> {
        let entry = self
            .succ
            .lock()
            .expect("aot tables poisoned")
            .get(name)
            .cloned()
            .or_else(|| self.on_delete.lock().expect("aot tables poisoned").get(name).cloned())?;
        entry.touch();
        entry.refcount.fetch_add(1, Ordering::AcqRel);
        Some(NativeHandle {
            entry,
            tables: self.clone(),
        })
    }

    fn release(&self, entry: &Arc<NativeEntry>) {
        let remaining = entry.refcount.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && entry.pending_delete.load(Ordering::Acquire) {
            self.finalize_delete(&entry.name);
        }
    }

    /// Moves `name`'s entry from `succ` into `onDelete`; if nothing
    /// currently references it the teardown happens immediately, otherwise
    /// it is torn down by the last [`NativeHandle`] drop or the next GC
    /// sweep, whichever comes first.
    pub fn mark_for_delete(&self, name: &str) {
        let Some(entry) = self.succ.lock().expect("aot tables poisoned").remove(name) else {
            return;
        };
        entry.pending_delete.store(true, Ordering::Release);
        let still_referenced = entry.refcount.load(Ordering::Acquire) > 0;
        self.on_delete.lock().expect("aot tables poisoned").insert(name.to_string(), entry);
        if !still_referenced {
            self.finalize_delete(name);
        }
    }

    fn finalize_delete(&self, name: &str) {
        if let Some(entry) = self.on_delete.lock().expect("aot tables poisoned").remove(name) {
            // Dropping `entry.library` (if any) unmaps the shared object;
            // the on-disk artifact is only unlinked once nothing else
            // could still be holding the last `Arc` clone racing this call.
            if Arc::strong_count(&entry) == 1 {
                let _ = std::fs::remove_file(&entry.path);
            }
        }
    }

    /// Idle sweep (§4.9, every 5 minutes in the background worker): evicts
    /// up to `max_evict` entries from `succ` that have gone unused for at
    /// least `idle_threshold_secs`, moving them to `onDelete`.
    pub fn sweep_idle(&self, now: u64, idle_threshold_secs: u64, max_evict: usize) -> usize {
        let stale: Vec<String> = {
            let succ = self.succ.lock().expect("aot tables poisoned");
            succ.iter()
                .filter(|(_, e)| e.idle_seconds(now) >= idle_threshold_secs)
                .take(max_evict)
                .map(|(k, _)| k.clone())
                .collect()
        };
        for name in &stale {
            self.mark_for_delete(name);
        }
        stale.len()
    }

    /// GC sweep (§4.9, every 10 seconds): finalizes every `onDelete` entry
    /// whose reference count has reached zero since it was marked.
    pub fn sweep_garbage(&self) -> usize {
        let ready: Vec<String> = {
            let on_delete = self.on_delete.lock().expect("aot tables poisoned");
            on_delete
                .iter()
                .filter(|(_, e)| e.refcount.load(Ordering::Acquire) == 0)
                .map(|(k, _)| k.clone())
                .collect()
        };
        for name in &ready {
            self.finalize_delete(name);
        }
        ready.len()
    }

    /// Number of loaded (non-pending-delete) entries, for diagnostics/tests.
    #[must_use]
    pub fn loaded_len(&self) -> usize {
        self.succ.lock().expect("aot tables poisoned").len()
    }

    /// Number of entries awaiting GC, for diagnostics/tests.
    #[must_use]
    pub fn pending_delete_len(&self) -> usize {
        self.on_delete.lock().expect("aot tables poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tables: &Arc<Tables>, name: &str) -> Arc<NativeEntry> {
        tables.record(name, PathBuf::from(format!("/tmp/does-not-exist-{name}.so")), "deadbeef".to_string(), None)
    }

    #[test]
    fn acquire_returns_none_for_unknown_name() {
        let tables = Tables::new();
        assert!(tables.acquire("0xabc").is_none());
    }

    #[test]
    fn acquire_increments_refcount_and_drop_decrements() {
        let tables = Tables::new();
        record(&tables, "0xabc");
        {
            let handle = tables.acquire("0xabc").unwrap();
            assert_eq!(handle.entry().name(), "0xabc");
            let entry = tables.succ.lock().unwrap().get("0xabc").unwrap().clone();
            assert_eq!(entry.refcount.load(Ordering::Acquire), 1);
        }
        let entry = tables.succ.lock().unwrap().get("0xabc").unwrap().clone();
        assert_eq!(entry.refcount.load(Ordering::Acquire), 0);
    }

    #[test]
    fn mark_for_delete_finalizes_immediately_when_unreferenced() {
        let tables = Tables::new();
        record(&tables, "0xabc");
        tables.mark_for_delete("0xabc");
        assert_eq!(tables.loaded_len(), 0);
        assert_eq!(tables.pending_delete_len(), 0);
    }

    #[test]
    fn mark_for_delete_waits_for_last_handle_drop_when_referenced() {
        let tables = Tables::new();
        record(&tables, "0xabc");
        let handle = tables.acquire("0xabc").unwrap();
        tables.mark_for_delete("0xabc");
        assert_eq!(tables.pending_delete_len(), 1);
        drop(handle);
        assert_eq!(tables.pending_delete_len(), 0);
    }

    #[test]
    fn sweep_idle_evicts_only_entries_older_than_threshold_up_to_cap() {
        let tables = Tables::new();
        for i in 0..5 {
            let entry = record(&tables, &format!("0x{i}"));
            entry.last_access.store(0, Ordering::Relaxed);
        }
        let evicted = tables.sweep_idle(10_000, 3_600, 3);
        assert_eq!(evicted, 3);
        assert_eq!(tables.loaded_len(), 2);
        assert_eq!(tables.pending_delete_len(), 3);
    }

    #[test]
    fn sweep_idle_ignores_recently_used_entries() {
        let tables = Tables::new();
        record(&tables, "0xabc");
        let evicted = tables.sweep_idle(now_secs() + 10, 3_600, 3);
        assert_eq!(evicted, 0);
        assert_eq!(tables.loaded_len(), 1);
    }

    #[test]
    fn sweep_garbage_only_finalizes_zero_refcount_entries() {
        let tables = Tables::new();
        record(&tables, "0xabc");
        record(&tables, "0xdef");
        let handle = tables.acquire("0xdef").unwrap();
        tables.mark_for_delete("0xabc");
        tables.mark_for_delete("0xdef");
        assert_eq!(tables.pending_delete_len(), 2);
        let finalized = tables.sweep_garbage();
        assert_eq!(finalized, 1);
        assert_eq!(tables.pending_delete_len(), 1);
        drop(handle);
    }

    #[test]
    fn blacklist_round_trips() {
        let tables = Tables::new();
        assert!(!tables.is_blacklisted("0xabc"));
        tables.blacklist("0xabc");
        assert!(tables.is_blacklisted("0xabc"));
    }

    #[test]
    fn record_clears_a_prior_blacklist_entry() {
        let tables = Tables::new();
        tables.blacklist("0xabc");
        record(&tables, "0xabc");
        assert!(!tables.is_blacklisted("0xabc"));
    }
}
