//! Lock-sharded fixed-size arrays backing the slot table
//!
//! Element `i` lives in shard `i % NOF_SHARDS` at position `i / NOF_SHARDS`.
//! Every access goes through [`ShardedArray::with`], which holds exactly one
//! shard lock for the duration of the closure. Callers must not nest `with`
//! calls; that is what keeps the table deadlock free.

use crate::pool::NOF_SHARDS;
use parking_lot::Mutex;
use std::sync::Arc;

/// Fixed-size array partitioned over `NOF_SHARDS` mutexes
pub(crate) struct ShardedArray<T> {
    shards: Vec<Mutex<Vec<T>>>,
    len: usize,
}

impl<T> ShardedArray<T> {
    /// `len` must be a multiple of `NOF_SHARDS`
    pub(crate) fn new(len: usize, fill: impl Fn() -> T) -> Self {
        debug_assert_eq!(len % NOF_SHARDS, 0);
        let per_shard = len / NOF_SHARDS;
        let shards = (0..NOF_SHARDS)
            .map(|_| Mutex::new((0..per_shard).map(|_| fill()).collect()))
            .collect();
        Self { shards, len }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Run `f` on element `idx` under its shard lock
    #[inline]
    pub(crate) fn with<R>(&self, idx: usize, f: impl FnOnce(&mut T) -> R) -> R {
        let mut shard = self.shards[idx % NOF_SHARDS].lock();
        f(&mut shard[idx / NOF_SHARDS])
    }

    /// Count elements matching `pred`, one shard at a time
    pub(crate) fn count(&self, pred: impl Fn(&T) -> bool) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().iter().filter(|e| pred(e)).count())
            .sum()
    }
}

/// State of one index array entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexEntry {
    /// No transaction uses this index
    Free,
    /// Reserved by the transaction with this `tidx`: being placed, or
    /// checked out by a caller
    Pending(u64),
    /// Transaction stored in this storage slot
    Placed(usize),
}

pub(crate) type IndexArray = ShardedArray<IndexEntry>;

/// Exclusive reservation of one index entry
///
/// Owned by the transaction it belongs to. Dropping the lease frees the entry,
/// so every path that destroys a transaction (explicit release, expiry, a
/// failed placement) also releases its id.
///
/// While a transaction sits in storage its lease is out of reach, and expiry
/// may drop it at any moment. Writers that no longer hold the lease go through
/// [`IndexArray::publish`], which only touches an entry still reserved for the
/// same `tidx`.
pub(crate) struct IndexLease {
    table: Arc<IndexArray>,
    pos: usize,
    tidx: u64,
}

impl IndexLease {
    /// Try to reserve entry `pos` for `tidx`; `None` if it is not free
    pub(crate) fn acquire(table: &Arc<IndexArray>, pos: usize, tidx: u64) -> Option<Self> {
        let reserved = table.with(pos, |entry| {
            if *entry == IndexEntry::Free {
                *entry = IndexEntry::Pending(tidx);
                true
            } else {
                false
            }
        });
        reserved.then(|| IndexLease {
            table: Arc::clone(table),
            pos,
            tidx,
        })
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn belongs_to(&self, table: &Arc<IndexArray>) -> bool {
        Arc::ptr_eq(&self.table, table)
    }

    pub(crate) fn state(&self) -> IndexEntry {
        self.table.with(self.pos, |entry| *entry)
    }

    pub(crate) fn mark_pending(&self) {
        let tidx = self.tidx;
        self.table
            .with(self.pos, |entry| *entry = IndexEntry::Pending(tidx));
    }
}

impl IndexArray {
    /// Record that the transaction `tidx` now lives in `slot`
    ///
    /// Returns `false` if entry `pos` is no longer reserved for `tidx`: the
    /// transaction was expired in the meantime and the entry freed, or already
    /// handed to another transaction.
    pub(crate) fn publish(&self, pos: usize, tidx: u64, slot: usize) -> bool {
        self.with(pos, |entry| {
            if *entry == IndexEntry::Pending(tidx) {
                *entry = IndexEntry::Placed(slot);
                true
            } else {
                false
            }
        })
    }
}

impl Drop for IndexLease {
    fn drop(&mut self) {
        self.table.with(self.pos, |entry| *entry = IndexEntry::Free);
    }
}
