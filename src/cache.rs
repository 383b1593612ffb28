//! The Cache Core: composes the hash index, recency list, and access
//! coordinator into the four operations the surrounding proxy calls.
//!
//! Naming here favors what each operation does (`new`/`find`/`insert`/`free`)
//! over the C-style `cache_init`/`cache_find`/... names used to describe the
//! same four primitives; the correspondence is noted on each method.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::coordinator::AccessCoordinator;
use crate::entry::Entry;
use crate::error::{CacheError, InsertResult};
use crate::hash::hash_key;
use crate::index::RobinHoodIndex;
use crate::list::RecencyList;
use crate::metrics::CacheMetrics;

/// State written only under writer admission: the hash index and the
/// running byte total.
struct Protected {
    index: RobinHoodIndex,
    bytes_used: u64,
}

/// A concurrent, size-bounded byte-string cache: a Robin-Hood hash index
/// over a doubly-linked recency list, gated by a FIFO-fair reader/writer
/// coordinator.
///
/// Corresponds to `cache_init`/`cache_find`/`cache_insert`/`cache_free`.
pub struct Cache {
    coordinator: AccessCoordinator<Protected>,
    list: Mutex<RecencyList>,
    metrics: Mutex<CacheMetrics>,
    outstanding_reads: Arc<AtomicUsize>,
    config: CacheConfig,
}

impl Cache {
    /// Builds an empty cache. Corresponds to `cache_init(max_size)`.
    ///
    /// The hash index starts at `config.minsize` capacity; the recency list
    /// starts empty; `bytes_used` starts at zero.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        Ok(Self {
            coordinator: AccessCoordinator::new(Protected {
                index: RobinHoodIndex::new(config.minsize.get()),
                bytes_used: 0,
            }),
            list: Mutex::new(RecencyList::new()),
            metrics: Mutex::new(CacheMetrics::new(config.max_cache_size)),
            outstanding_reads: Arc::new(AtomicUsize::new(0)),
            config,
        })
    }

    /// Looks up `key`, promoting it to most-recently-used on a hit.
    /// Corresponds to `cache_find`.
    pub fn find(&self, key: &[u8]) -> Option<ReadHandle> {
        let hash = hash_key(key);
        let guard = self.coordinator.acquire_read();
        let found = guard.index.find(key, hash);
        if let Some(entry) = &found {
            // lock order: coordinator (held as `guard`) -> list mutex.
            let mut list = self.list.lock();
            list.move_to_front(entry.list_node());
        }
        drop(guard);

        match found {
            Some(entry) => {
                self.metrics.lock().record_hit(entry.size);
                self.outstanding_reads.fetch_add(1, Ordering::AcqRel);
                Some(ReadHandle {
                    entry,
                    outstanding_reads: Arc::clone(&self.outstanding_reads),
                })
            }
            None => {
                self.metrics.lock().record_miss();
                None
            }
        }
    }

    /// Inserts `key` → `value`, evicting least-recently-used entries as
    /// needed to stay within `max_cache_size`. Corresponds to `cache_insert`.
    ///
    /// Duplicate keys are first-write-wins: if `key` is already present,
    /// the existing entry (including its recency position) is left
    /// untouched and [`InsertResult::AlreadyPresent`] is returned.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> InsertResult {
        let size = value.len() as u64;
        if size > self.config.max_cache_size {
            return InsertResult::TooLarge;
        }
        let hash = hash_key(key);
        let mut guard = self.coordinator.acquire_write();

        if guard.index.find(key, hash).is_some() {
            return InsertResult::AlreadyPresent;
        }
        if guard.index.would_overflow_on_insert() {
            // Checked before any mutation so state is left unmodified.
            return InsertResult::OutOfMemory;
        }

        let entry = Arc::new(Entry::new(key.to_vec(), value.to_vec(), hash));
        guard.bytes_used += size;

        while guard.bytes_used > self.config.max_cache_size {
            let victim = {
                let mut list = self.list.lock();
                list.evict_tail()
            };
            let Some(victim) = victim else { break };
            guard.index.delete(&victim.key, victim.hash);
            guard.bytes_used -= victim.size;
            victim.tombstone();
            self.metrics.lock().record_eviction(victim.size);
        }

        let node_id = {
            let mut list = self.list.lock();
            list.push_front(Arc::clone(&entry))
        };
        entry.set_list_node(node_id);
        guard
            .index
            .insert(Arc::clone(&entry))
            .expect("capacity was checked before this insert");

        self.metrics.lock().record_insertion(size);
        InsertResult::Inserted
    }

    /// Removes `key` if present, unlinking it from the index and recency
    /// list. Destruction of the backing storage is deferred until any
    /// outstanding `ReadHandle`s for it are dropped. Corresponds to the
    /// internal `cache_delete` operation described alongside the four
    /// primitives.
    pub fn delete(&self, key: &[u8]) -> bool {
        let hash = hash_key(key);
        let mut guard = self.coordinator.acquire_write();
        match guard.index.delete(key, hash) {
            Some(entry) => {
                {
                    let mut list = self.list.lock();
                    list.unlink(entry.list_node());
                }
                guard.bytes_used -= entry.size;
                entry.tombstone();
                self.metrics.lock().record_deletion(entry.size);
                true
            }
            None => false,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.coordinator.acquire_read().index.len()
    }

    /// True iff the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of `size` over live entries.
    pub fn bytes_used(&self) -> u64 {
        self.coordinator.acquire_read().bytes_used
    }

    /// The configured size budget.
    pub fn max_cache_size(&self) -> u64 {
        self.config.max_cache_size
    }

    /// Current bin count of the underlying hash index. Exposed for
    /// diagnostics and for checking the load-factor bound in tests.
    pub fn index_capacity(&self) -> usize {
        self.coordinator.acquire_read().index.capacity()
    }

    /// Snapshot of the running hit/miss/eviction/byte counters.
    pub fn metrics(&self) -> CacheMetrics {
        *self.metrics.lock()
    }

    /// Consumes the cache, destroying all entries. Corresponds to
    /// `cache_free`.
    ///
    /// # Panics
    ///
    /// Panics if any [`ReadHandle`] is still outstanding. Freeing a cache
    /// with live read handles is a programmer error.
    pub fn free(self) {
        assert_eq!(
            self.outstanding_reads.load(Ordering::Acquire),
            0,
            "cache freed while ReadHandles are outstanding"
        );
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("bytes_used", &self.bytes_used())
            .finish()
    }
}

/// A scoped, read-only borrow of a cached value, returned by [`Cache::find`].
///
/// Holding a `ReadHandle` keeps the entry's backing bytes alive even if the
/// entry is concurrently evicted: `ReadHandle` holds a clone of the same
/// `Arc<Entry>` the index and list hold, so the storage is only freed once
/// every clone, structural and outstanding-reader alike, has dropped.
#[derive(Debug)]
pub struct ReadHandle {
    entry: Arc<Entry>,
    outstanding_reads: Arc<AtomicUsize>,
}

impl ReadHandle {
    /// The cached value's bytes.
    pub fn value(&self) -> &[u8] {
        self.entry.value()
    }
}

impl Deref for ReadHandle {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.entry.value()
    }
}

impl Drop for ReadHandle {
    fn drop(&mut self) {
        self.outstanding_reads.fetch_sub(1, Ordering::AcqRel);
    }
}
