//! The Robin-Hood open-addressed hash index from key bytes to `Arc<Entry>`.
//!
//! Probe sequence length (PSL) bookkeeping, Robin-Hood displacement on
//! insert, and backward-shift deletion are implemented directly over a
//! `Vec<Bin>`. There is no `HashMap`/`hashbrown` underneath; this *is* the
//! hash table. The backward-shift deletion loop is adapted from a
//! linear-probing open-addressing table in this corpus to true Robin-Hood
//! probing with explicit PSL decrementing.

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::CacheError;

/// `growth_step` from the upsize rule: `capacity + growth_step` is
/// considered alongside `capacity * 2`, and the smaller of the two wins.
const GROWTH_STEP: usize = 1 << 20;

/// Implementation-chosen ceiling on `capacity`. An insert that would need to
/// grow past this fails with [`CacheError::OutOfMemory`] rather than
/// attempting an allocation that could, in principle, still succeed. This
/// is what makes `OutOfMemory` deterministically reachable in tests.
const MAX_CAPACITY: usize = 1 << 26;

#[derive(Debug, Clone)]
struct Bin {
    entry: Option<Arc<Entry>>,
    hash: u64,
    psl: u32,
}

impl Bin {
    fn empty() -> Self {
        Self {
            entry: None,
            hash: 0,
            psl: 0,
        }
    }
}

/// Open-addressed Robin-Hood hash table keyed by byte-string equality, not
/// generic over `K`/`V`: keys and values are always opaque byte spans.
#[derive(Debug)]
pub struct RobinHoodIndex {
    bins: Vec<Bin>,
    capacity: usize,
    len: usize,
    minsize: usize,
}

impl RobinHoodIndex {
    /// Builds an index with capacity `minsize.max(1)` and a resize floor of
    /// the same value.
    pub fn new(minsize: usize) -> Self {
        let capacity = minsize.max(1);
        Self {
            bins: vec![Bin::empty(); capacity],
            capacity,
            len: 0,
            minsize: capacity,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True iff no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current bin count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn ideal_slot(&self, hash: u64) -> usize {
        (hash % self.capacity as u64) as usize
    }

    /// Looks up `key` (whose hash is `hash`), returning a clone of the
    /// stored entry reference on a hit.
    pub fn find(&self, key: &[u8], hash: u64) -> Option<Arc<Entry>> {
        let mut idx = self.ideal_slot(hash);
        let mut probe: u32 = 0;
        loop {
            let bin = &self.bins[idx];
            let Some(entry) = &bin.entry else {
                return None;
            };
            if probe > bin.psl {
                // Robin-Hood early exit: everything from here on has a psl
                // that could not be smaller than what we're looking for.
                return None;
            }
            if bin.hash == hash && entry.key == key {
                return Some(Arc::clone(entry));
            }
            idx = (idx + 1) % self.capacity;
            probe += 1;
        }
    }

    /// Would inserting one more entry require growing past [`MAX_CAPACITY`]?
    /// Checked by the Cache Core *before* any state mutation so an
    /// `OutOfMemory` outcome leaves everything untouched.
    pub fn would_overflow_on_insert(&self) -> bool {
        let projected_len = self.len + 1;
        let threshold = (self.capacity * 85 / 100).max(1);
        if projected_len <= threshold {
            return false;
        }
        self.next_capacity_for_growth() > MAX_CAPACITY
    }

    fn next_capacity_for_growth(&self) -> usize {
        self.capacity
            .saturating_mul(2)
            .min(self.capacity.saturating_add(GROWTH_STEP))
    }

    /// Places `entry` (which must carry its final `key`/`hash`) into the
    /// table, displacing incumbents per the Robin-Hood rule. Overwrites an
    /// existing bin with an equal key instead of inserting a duplicate.
    pub fn insert(&mut self, entry: Arc<Entry>) -> Result<(), CacheError> {
        if self.would_overflow_on_insert() {
            return Err(CacheError::OutOfMemory);
        }
        self.maybe_grow();
        if self.raw_insert(entry) {
            self.len += 1;
        }
        Ok(())
    }

    /// Places `entry`, returning `true` if this added a new key or `false`
    /// if it overwrote an existing bin with an equal key (so the caller
    /// should not bump `len`).
    fn raw_insert(&mut self, entry: Arc<Entry>) -> bool {
        let hash = entry.hash;
        let mut idx = self.ideal_slot(hash);
        let mut cur = Bin {
            entry: Some(entry),
            hash,
            psl: 0,
        };
        loop {
            if self.bins[idx].entry.is_none() {
                self.place(idx, cur);
                return true;
            }
            if self.bins[idx].hash == hash
                && self.bins[idx].entry.as_ref().expect("checked Some").key
                    == cur.entry.as_ref().expect("checked Some").key
            {
                self.place(idx, cur);
                return false;
            }
            if self.bins[idx].psl < cur.psl {
                std::mem::swap(&mut self.bins[idx], &mut cur);
                self.bins[idx]
                    .entry
                    .as_ref()
                    .expect("just placed")
                    .set_index_slot(idx);
            }
            cur.psl += 1;
            idx = (idx + 1) % self.capacity;
        }
    }

    fn place(&mut self, idx: usize, bin: Bin) {
        if let Some(entry) = &bin.entry {
            entry.set_index_slot(idx);
        }
        self.bins[idx] = bin;
    }

    /// Removes the entry matching `key`/`hash`, applying backward-shift
    /// deletion to the following run of displaced bins.
    pub fn delete(&mut self, key: &[u8], hash: u64) -> Option<Arc<Entry>> {
        let mut idx = self.ideal_slot(hash);
        let mut probe: u32 = 0;
        let found_idx = loop {
            let bin = &self.bins[idx];
            let Some(entry) = &bin.entry else {
                return None;
            };
            if probe > bin.psl {
                return None;
            }
            if bin.hash == hash && entry.key == key {
                break idx;
            }
            idx = (idx + 1) % self.capacity;
            probe += 1;
        };

        let removed = self.bins[found_idx].entry.take();
        if let Some(entry) = &removed {
            entry.set_index_slot(crate::entry::UNLINKED);
        }

        let mut empty = found_idx;
        let mut j = (empty + 1) % self.capacity;
        loop {
            if self.bins[j].entry.is_none() || self.bins[j].psl == 0 {
                break;
            }
            self.bins[empty] = Bin {
                entry: self.bins[j].entry.take(),
                hash: self.bins[j].hash,
                psl: self.bins[j].psl - 1,
            };
            if let Some(entry) = &self.bins[empty].entry {
                entry.set_index_slot(empty);
            }
            empty = j;
            j = (j + 1) % self.capacity;
        }
        self.bins[empty] = Bin::empty();

        self.len -= 1;
        self.maybe_shrink();
        removed
    }

    fn maybe_grow(&mut self) {
        let projected_len = self.len + 1;
        let threshold = (self.capacity * 85 / 100).max(1);
        if projected_len <= threshold {
            return;
        }
        let new_capacity = self.next_capacity_for_growth();
        self.rebuild(new_capacity);
    }

    fn maybe_shrink(&mut self) {
        if self.capacity <= self.minsize {
            return;
        }
        let threshold = self.capacity * 40 / 100;
        if self.len > self.minsize && self.len < threshold {
            let new_capacity = (self.capacity / 2).max(self.minsize);
            self.rebuild(new_capacity);
        }
    }

    fn rebuild(&mut self, new_capacity: usize) {
        let old_bins = std::mem::replace(&mut self.bins, vec![Bin::empty(); new_capacity]);
        self.capacity = new_capacity;
        for bin in old_bins.into_iter().filter_map(|bin| bin.entry) {
            self.raw_insert(bin);
        }
    }

    /// Snapshot of `(bin_index, psl, hash)` for every occupied bin, used by
    /// the Robin-Hood PSL-monotonicity property test.
    pub fn debug_bins(&self) -> Vec<(usize, u32, u64)> {
        self.bins
            .iter()
            .enumerate()
            .filter_map(|(i, bin)| bin.entry.as_ref().map(|_| (i, bin.psl, bin.hash)))
            .collect()
    }
}
