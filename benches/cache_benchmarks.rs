//! Cache throughput benchmarks, single-threaded and concurrent.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use proxycache::{Cache, CacheConfig};
use std::sync::Arc;
use std::thread;

const CACHE_SIZE: usize = 1_000;
const NUM_OPERATIONS: usize = 10_000;
const OPS_PER_THREAD: usize = 1_000;

/// Simple linear congruential generator for reproducible benchmarks.
struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fff_ffff;
        self.state
    }
}

fn key_for(idx: u64) -> Vec<u8> {
    idx.to_le_bytes().to_vec()
}

fn make_cache(max_entries: usize) -> Cache {
    // 32 bytes per entry leaves plenty of headroom below max_cache_size.
    Cache::new(CacheConfig::with_max_cache_size((max_entries * 32) as u64)).unwrap()
}

fn mixed_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("Cache Mixed Access");
    group.throughput(Throughput::Elements(NUM_OPERATIONS as u64));

    group.bench_function("find_and_insert", |b| {
        b.iter(|| {
            let cache = make_cache(CACHE_SIZE);
            let mut rng = SimpleRng::new(42);
            for _ in 0..NUM_OPERATIONS {
                let idx = rng.next_u64() % (CACHE_SIZE as u64 * 2);
                let key = key_for(idx);
                if idx % 4 == 0 {
                    black_box(cache.insert(&key, &key));
                } else {
                    black_box(cache.find(&key));
                }
            }
        });
    });

    group.finish();
}

fn concurrent_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("Concurrent Reads");
    group.throughput(Throughput::Elements((8 * OPS_PER_THREAD) as u64));

    let cache = Arc::new(make_cache(CACHE_SIZE));
    for i in 0..CACHE_SIZE as u64 {
        cache.insert(&key_for(i), &key_for(i));
    }

    for &threads in &[2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let cache = Arc::clone(&cache);
                        thread::spawn(move || {
                            let mut rng = SimpleRng::new(7);
                            for _ in 0..OPS_PER_THREAD {
                                let idx = rng.next_u64() % CACHE_SIZE as u64;
                                black_box(cache.find(&key_for(idx)));
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, mixed_access, concurrent_reads);
criterion_main!(benches);
