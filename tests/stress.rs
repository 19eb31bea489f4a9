//! Mixed-size multi-threaded workload: 70% allocate, 30% free

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slabpool::{PoolConfig, SizeClassRegistry};
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 100_000;
const MAX_OBJECT_SIZE: usize = 256;

fn run_worker(registry: &SizeClassRegistry, seed: u64) -> usize {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut live: Vec<(*mut u8, usize, u8)> = Vec::with_capacity(OPS_PER_THREAD);
    let mut served = 0;

    for _ in 0..OPS_PER_THREAD {
        if live.is_empty() || rng.random_range(0..100) < 70 {
            let size = rng.random_range(1..=MAX_OBJECT_SIZE);
            let ptr = registry.allocate(size).unwrap().as_ptr();
            let tag = rng.random::<u8>();
            unsafe {
                ptr.write(tag);
                ptr.add(size - 1).write(tag);
            }
            live.push((ptr, size, tag));
            served += 1;
        } else {
            let index = rng.random_range(0..live.len());
            let (ptr, size, tag) = live.swap_remove(index);
            unsafe {
                assert_eq!(ptr.read(), tag, "object head overwritten");
                assert_eq!(ptr.add(size - 1).read(), tag, "object tail overwritten");
                registry.deallocate(ptr, size);
            }
        }
    }

    for (ptr, size, _) in live {
        unsafe { registry.deallocate(ptr, size) };
    }

    served
}

#[test]
fn test_mixed_workload_eight_threads() {
    let registry = Arc::new(SizeClassRegistry::new(PoolConfig::default()).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || run_worker(&registry, 0x5eed + t as u64))
        })
        .collect();

    let served: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(served >= THREADS * OPS_PER_THREAD / 2);

    let stats = registry.stats();
    assert_eq!(stats.live_large_allocations, 0);

    // Every slot went back to its free list, so a second run reuses the
    // same blocks instead of growing without bound
    let reserved = stats.reserved_bytes();
    run_worker(&registry, 42);
    assert!(registry.stats().reserved_bytes() <= reserved * 2);
}

#[test]
fn test_oversized_mix_returns_everything() {
    let registry = SizeClassRegistry::with_defaults();
    let mut rng = StdRng::seed_from_u64(7);
    let mut live = Vec::new();

    for _ in 0..5_000 {
        let size = rng.random_range(1..=2048);
        live.push((registry.allocate(size).unwrap(), size));
    }
    assert!(registry.stats().live_large_allocations > 0);

    for (ptr, size) in live {
        unsafe { registry.deallocate(ptr.as_ptr(), size) };
    }
    assert_eq!(registry.stats().live_large_allocations, 0);
}
