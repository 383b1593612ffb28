//! The cache's owned record type.
//!
//! # Lifetime model
//!
//! Every live [`Entry`] is reached through at least one [`std::sync::Arc`]
//! clone, held by whichever of the hash index, the recency list, and any
//! outstanding [`crate::cache::ReadHandle`]s currently reference it. Dropping
//! an `Arc<Entry>` is exactly decrementing the "outstanding reader count" the
//! design calls for; the allocator reclaims the entry's key/value bytes the
//! moment the last clone drops, which by construction can never happen while
//! a `ReadHandle` still exists. `unlink`ing an entry from the index and the
//! list (eviction or delete) drops the two structural clones and sets
//! [`Entry::tombstoned`], but leaves the memory alive for as long as any
//! `ReadHandle` clone remains.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Sentinel stored in [`Entry::list_node`]/[`Entry::index_slot`] before the
/// entry has been linked into the recency list/hash index.
pub(crate) const UNLINKED: usize = usize::MAX;

/// An owned `(key, value)` pair plus the back-links the Cache Core needs to
/// unlink it from the hash index and recency list in O(1) without
/// re-probing or scanning.
#[derive(Debug)]
pub struct Entry {
    /// Immutable copy of the caller's key bytes.
    pub key: Vec<u8>,
    /// Immutable copy of the caller's value bytes.
    pub value: Vec<u8>,
    /// `value.len()` as `u64`, cached so eviction bookkeeping never has to
    /// re-derive it.
    pub size: u64,
    /// Precomputed djb2 hash of `key`.
    pub(crate) hash: u64,
    /// Current bin index in the hash index, kept up to date on every
    /// Robin-Hood displacement and backward-shift so delete-by-entry never
    /// needs to re-probe.
    index_slot: AtomicUsize,
    /// Node handle in the recency list's arena. Set exactly once, at
    /// insertion, and never changed afterwards (a node keeps its slot for
    /// its whole life; `move_to_front` relinks pointers, not slots).
    list_node: AtomicUsize,
    /// Set when the entry has been unlinked from both the hash index and
    /// the recency list (by delete or by eviction). A tombstoned entry is no
    /// longer reachable via `find`, even if its storage is still alive
    /// because an outstanding `ReadHandle` holds a clone.
    tombstoned: AtomicBool,
}

impl Entry {
    /// Builds a new, not-yet-linked entry. `index_slot`/`list_node` are set
    /// once the entry has actually been placed into the index/list.
    pub(crate) fn new(key: Vec<u8>, value: Vec<u8>, hash: u64) -> Self {
        let size = value.len() as u64;
        Self {
            key,
            value,
            size,
            hash,
            index_slot: AtomicUsize::new(UNLINKED),
            list_node: AtomicUsize::new(UNLINKED),
            tombstoned: AtomicBool::new(false),
        }
    }

    /// Read-only access to the value bytes; this is what [`crate::cache::ReadHandle`]
    /// exposes to callers.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub(crate) fn index_slot(&self) -> usize {
        self.index_slot.load(Ordering::Acquire)
    }

    pub(crate) fn set_index_slot(&self, slot: usize) {
        self.index_slot.store(slot, Ordering::Release);
    }

    pub(crate) fn list_node(&self) -> usize {
        self.list_node.load(Ordering::Acquire)
    }

    pub(crate) fn set_list_node(&self, node: usize) {
        self.list_node.store(node, Ordering::Release);
    }

    pub(crate) fn is_tombstoned(&self) -> bool {
        self.tombstoned.load(Ordering::Acquire)
    }

    pub(crate) fn tombstone(&self) {
        self.tombstoned.store(true, Ordering::Release);
    }
}
