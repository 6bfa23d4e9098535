//! Exclusivity Tests
//!
//! A stored transaction is handed to at most one fetcher at a time.

use crate::common::*;
use courier_core::PseudoRandomSource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn pool(slots_per_tick: usize) -> Arc<TransactionPool<u64>> {
    Arc::new(
        TransactionPool::with_random(0, 60, slots_per_tick, PseudoRandomSource::new(11)).unwrap(),
    )
}

#[test]
fn concurrent_fetch_has_single_winner() {
    let pool = pool(16);
    let id = pool.create(7, 30).unwrap().encode();

    for _round in 0..50 {
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let txn = pool.fetch(&id).unwrap();
                    if txn.is_some() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                    txn
                })
            })
            .collect();

        let fetched: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(fetched.len(), 1);

        // Put it back for the next round
        for txn in fetched {
            pool.return_transaction(txn).unwrap();
        }
    }
}

#[test]
fn fetched_transaction_invisible_until_returned() {
    let pool = pool(4);
    let id = pool.create(1, 10).unwrap();

    let mut txn = pool.fetch_id(id).unwrap();
    assert!(pool.fetch_id(id).is_none());
    assert!(!pool.contains(id));
    assert_eq!(pool.len(), 0);
    assert_eq!(pool.reserved(), 1);

    *txn.context_mut() += 1;
    assert_eq!(pool.return_transaction(txn).unwrap(), id);
    assert_eq!(*pool.fetch_id(id).unwrap().context(), 2);
}

#[test]
fn ids_are_distinct_while_live() {
    let pool = pool(64);
    let mut ids: Vec<TransactionId> = (0..200).map(|n| pool.create(n, 5).unwrap()).collect();
    ids.sort_by_key(|id| id.index());
    ids.dedup();
    assert_eq!(ids.len(), 200);
    assert_eq!(pool.len(), 200);
}

#[test]
fn id_text_round_trip_through_pool() {
    let pool = pool(4);
    let id = pool.create(99, 10).unwrap();
    let text = id.to_string();
    assert_eq!(text.len(), 16);
    assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    // Either case is accepted
    let txn = pool.fetch(&text.to_ascii_uppercase()).unwrap().unwrap();
    assert_eq!(txn.id(), id);
}
