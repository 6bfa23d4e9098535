//! Stress Tests
//!
//! Creators, fetchers and the collector running at the same time.

use crate::common::*;
use courier_core::PseudoRandomSource;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Context that tracks live instances
struct Live(Arc<AtomicUsize>);

impl Live {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Live(Arc::clone(counter))
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn create_fetch_collect_concurrently() {
    init_tracing();
    let pool: Arc<TransactionPool<Live>> =
        Arc::new(TransactionPool::with_random(0, 8, 64, PseudoRandomSource::new(99)).unwrap());
    let live = Arc::new(AtomicUsize::new(0));
    let tick = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    let collector = {
        let pool = Arc::clone(&pool);
        let tick = Arc::clone(&tick);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                let now = tick.fetch_add(1, Ordering::SeqCst) + 1;
                pool.collect_garbage(now);
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let workers: Vec<_> = (0..4)
        .map(|w| {
            let pool = Arc::clone(&pool);
            let live = Arc::clone(&live);
            thread::spawn(move || {
                let mut ids = Vec::new();
                for n in 0..2_000u64 {
                    match pool.create(Live::new(&live), 1 + (n + w) % 8) {
                        Ok(id) => ids.push(id),
                        Err(e) => assert!(e.is_exhausted()),
                    }
                    if n % 3 == 0 {
                        if let Some(id) = ids.pop() {
                            if let Some(txn) = pool.fetch_id(id) {
                                if n % 2 == 0 {
                                    let _ = pool.return_transaction(txn);
                                }
                            }
                        }
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    collector.join().unwrap();

    // Every context still alive is stored in the pool
    assert_eq!(live.load(Ordering::SeqCst), pool.len());
    assert_eq!(pool.reserved(), pool.len());

    // Collecting past every deadline empties the pool
    let end = tick.load(Ordering::SeqCst) + pool.capacity() as u64;
    pool.collect_garbage(end);
    assert!(pool.is_empty());
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_eq!(pool.reserved(), 0);
}

#[test]
fn overlapping_collections_are_harmless() {
    let pool: Arc<TransactionPool<u32>> =
        Arc::new(TransactionPool::with_random(0, 16, 8, PseudoRandomSource::new(1)).unwrap());
    for n in 0..64 {
        pool.create(n, (n % 16) as u64 + 1).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || (1..=20).map(|t| pool.collect_garbage(t)).sum::<usize>())
        })
        .collect();
    let collected: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(collected, 64);
    assert!(pool.is_empty());
}
