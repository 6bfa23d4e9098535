//! Transaction pool with sliding-window expiry
//!
//! Transactions are kept in a two-array slot table:
//!
//! ```text
//! index array   [tidx & mask] -> Free | Pending(tidx) | Placed(slot)
//! storage array [slot]        -> Option<Transaction<C>>
//! ```
//!
//! The storage array is divided into bands of `slots_per_tick` slots, one band
//! per tick modulo the number of bands. A transaction with idle time `d`
//! created or returned at tick `T` lands in the band of tick `T + d`. Expiring
//! everything untouched since then only means emptying the bands of the ticks
//! the window moved over, never a full table scan.
//!
//! ## Placement
//!
//! ```text
//! 1. pick a pseudo-random tidx whose index entry is Free (bounded retries)
//! 2. reserve the index entry (Pending)
//! 3. probe the deadline band starting at tidx % slots_per_tick, then the
//!    following bands, up to alloc_tries slots
//! 4. record the slot in the index entry (Placed), only if the entry is still
//!    reserved for this tidx
//! ```
//!
//! If step 3 runs out of tries the transaction is dropped, which drops its
//! index lease and frees the reservation. There is no exit path that leaves a
//! Pending entry behind without an owner.
//!
//! Between steps 3 and 4 the transaction is already visible to garbage
//! collection. An idle time of 0 puts it in the band being collected, so it
//! may expire and free its entry before step 4, and another transaction may
//! reserve the same position. Step 4 compares the tidx recorded in the entry
//! and leaves a foreign reservation alone.
//!
//! ## Thread Safety
//!
//! Each array is split over [`NOF_SHARDS`] mutexes by `index % NOF_SHARDS`.
//! Every operation takes at most one shard lock at a time. Transaction
//! contexts are dropped after the storage lock is released.

use crate::error::{PoolError, Result};
use crate::slots::{IndexArray, IndexEntry, IndexLease, ShardedArray};
use crate::transaction::Transaction;
use courier_core::{PseudoRandomSource, Tick, TransactionId};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of independent locks per array
pub const NOF_SHARDS: usize = 16;

/// Number of bands a placement may probe (allocation tries are
/// `slots_per_tick * PROBE_BANDS`)
pub const PROBE_BANDS: usize = 8;

const MAX_CAPACITY: usize = 1 << 28;

/// Pool of transactions addressed by [`TransactionId`]
///
/// # Example
///
/// ```ignore
/// let pool = TransactionPool::new(now, 600, 4)?;
/// let id = pool.create(context, 60)?;
///
/// // next HTTP round-trip
/// if let Some(mut txn) = pool.fetch(&id.encode())? {
///     txn.context_mut().step();
///     pool.return_transaction(txn)?;
/// }
/// ```
pub struct TransactionPool<C> {
    index: Arc<IndexArray>,
    storage: ShardedArray<Option<Transaction<C>>>,
    /// `capacity - 1`, capacity is a power of two
    mask: usize,
    slots_per_tick: usize,
    nof_bands: u64,
    alloc_tries: usize,
    max_idle_time: Tick,
    /// Tick of the last garbage collection
    current_tick: AtomicU64,
    gc_running: AtomicBool,
    stored: AtomicUsize,
    random: PseudoRandomSource,
}

impl<C> TransactionPool<C> {
    /// Create a pool
    ///
    /// # Arguments
    /// * `current_tick` - Tick the sliding window starts at
    /// * `max_idle_time` - Maximum ticks a transaction may live untouched
    /// * `slots_per_tick` - Slots per band, rounded up to a power of two;
    ///   larger values lower the collision probability
    pub fn new(current_tick: Tick, max_idle_time: Tick, slots_per_tick: usize) -> Result<Self> {
        Self::with_random(
            current_tick,
            max_idle_time,
            slots_per_tick,
            PseudoRandomSource::from_time(),
        )
    }

    /// Create a pool with an explicit random source (deterministic tests)
    pub fn with_random(
        current_tick: Tick,
        max_idle_time: Tick,
        slots_per_tick: usize,
        random: PseudoRandomSource,
    ) -> Result<Self> {
        if max_idle_time == 0 {
            return Err(PoolError::InvalidConfig(
                "max_idle_time must be at least 1".to_string(),
            ));
        }
        if slots_per_tick == 0 {
            return Err(PoolError::InvalidConfig(
                "slots_per_tick must be at least 1".to_string(),
            ));
        }
        let slots_per_tick = slots_per_tick.next_power_of_two();
        let min_bands = (max_idle_time as usize)
            .checked_add(PROBE_BANDS + 2)
            .ok_or_else(|| PoolError::InvalidConfig("max_idle_time too large".to_string()))?;
        let capacity = min_bands
            .checked_mul(slots_per_tick)
            .map(usize::next_power_of_two)
            .filter(|c| *c <= MAX_CAPACITY)
            .ok_or_else(|| {
                PoolError::InvalidConfig(format!(
                    "capacity for max_idle_time {} x slots_per_tick {} exceeds {}",
                    max_idle_time, slots_per_tick, MAX_CAPACITY
                ))
            })?
            .max(NOF_SHARDS);

        debug!(
            capacity,
            slots_per_tick, max_idle_time, current_tick, "Creating transaction pool"
        );

        Ok(TransactionPool {
            index: Arc::new(ShardedArray::new(capacity, || IndexEntry::Free)),
            storage: ShardedArray::new(capacity, || None),
            mask: capacity - 1,
            slots_per_tick,
            nof_bands: (capacity / slots_per_tick) as u64,
            alloc_tries: slots_per_tick * PROBE_BANDS,
            max_idle_time,
            current_tick: AtomicU64::new(current_tick),
            gc_running: AtomicBool::new(false),
            stored: AtomicUsize::new(0),
            random,
        })
    }

    /// Number of slots in each array
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Slots per band (after rounding)
    pub fn slots_per_tick(&self) -> usize {
        self.slots_per_tick
    }

    /// Maximum idle time accepted by `create` / `return_transaction`
    pub fn max_idle_time(&self) -> Tick {
        self.max_idle_time
    }

    /// Tick recorded by the last garbage collection
    pub fn current_tick(&self) -> Tick {
        self.current_tick.load(Ordering::Acquire)
    }

    /// Transactions currently stored in the pool (not checked out)
    pub fn len(&self) -> usize {
        self.stored.load(Ordering::Acquire)
    }

    /// Check if no transaction is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserved ids: stored plus checked-out transactions.
    ///
    /// Scans the whole index array; meant for diagnostics and tests.
    pub fn reserved(&self) -> usize {
        self.index.count(|entry| *entry != IndexEntry::Free)
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Store a new transaction and return its id
    ///
    /// `idle_time` is clamped to `max_idle_time`.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] if no free id or no free slot was found within
    /// `slots_per_tick * PROBE_BANDS` tries. The context is dropped.
    pub fn create(&self, context: C, idle_time: Tick) -> Result<TransactionId> {
        let idle_time = self.clamp_idle_time(idle_time);
        let (tidx, lease) = self.reserve_index()?;
        self.place(Transaction {
            context,
            tidx,
            idle_time,
            lease,
        })
    }

    /// Check a transaction out of the pool
    ///
    /// Returns `Ok(None)` if the id is unknown, expired, or currently checked
    /// out by someone else. Of any number of concurrent fetches of the same id
    /// at most one gets the transaction.
    ///
    /// # Errors
    /// [`PoolError::MalformedId`] if `id` is not a 16-digit hex string.
    pub fn fetch(&self, id: &str) -> Result<Option<Transaction<C>>> {
        let id = TransactionId::parse(id)?;
        Ok(self.fetch_id(id))
    }

    /// [`fetch`](Self::fetch) with a decoded id
    pub fn fetch_id(&self, id: TransactionId) -> Option<Transaction<C>> {
        let tidx = id.index();
        let pos = self.index_pos(tidx);
        let slot = match self.index.with(pos, |entry| *entry) {
            IndexEntry::Placed(slot) => slot,
            IndexEntry::Free | IndexEntry::Pending(_) => return None,
        };
        let transaction = self.storage.with(slot, |cell| match cell {
            Some(stored) if stored.tidx == tidx => cell.take(),
            _ => None,
        })?;
        self.stored.fetch_sub(1, Ordering::AcqRel);
        transaction.lease.mark_pending();
        Some(transaction)
    }

    /// Hand a fetched transaction back, renewing its deadline
    ///
    /// The new deadline is `current_tick + idle_time`.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] if no slot was found; the transaction is
    /// destroyed in that case.
    ///
    /// # Panics
    /// If the transaction belongs to another pool or its id is not reserved.
    /// Both mean the exclusivity invariant was broken by the caller.
    pub fn return_transaction(&self, mut transaction: Transaction<C>) -> Result<TransactionId> {
        assert!(
            transaction.lease.belongs_to(&self.index),
            "transaction {} returned to a pool that did not create it",
            transaction.id()
        );
        let state = transaction.lease.state();
        assert_eq!(
            state,
            IndexEntry::Pending(transaction.tidx),
            "transaction {} returned while its index entry is {:?}",
            transaction.id(),
            state
        );
        transaction.idle_time = self.clamp_idle_time(transaction.idle_time);
        self.place(transaction)
    }

    /// Check if a transaction is stored under `id` without checking it out
    pub fn contains(&self, id: TransactionId) -> bool {
        let tidx = id.index();
        match self.index.with(self.index_pos(tidx), |entry| *entry) {
            IndexEntry::Placed(slot) => self
                .storage
                .with(slot, |cell| cell.as_ref().is_some_and(|t| t.tidx == tidx)),
            IndexEntry::Free | IndexEntry::Pending(_) => false,
        }
    }

    /// Destroy a stored transaction
    ///
    /// Returns `Ok(true)` if it was found and dropped.
    pub fn release(&self, id: &str) -> Result<bool> {
        Ok(self.fetch(id)?.is_some())
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    /// Expire every transaction whose deadline lies before `tick_now`
    ///
    /// Empties the bands of all ticks in `[current_tick, tick_now)` and moves
    /// the window to `tick_now`. Must be called at least once per tick for
    /// timely expiry. A call overlapping a running collection returns
    /// immediately with 0.
    ///
    /// Returns the number of transactions destroyed.
    pub fn collect_garbage(&self, tick_now: Tick) -> usize {
        let Some(_guard) = GcGuard::enter(&self.gc_running) else {
            return 0;
        };

        let last = self.current_tick.load(Ordering::Acquire);
        if tick_now <= last {
            return 0;
        }
        let span = (tick_now - last).min(self.nof_bands);
        let mut collected = 0;
        for tick in last..last + span {
            let band_start = self.band_start(tick);
            for slot in band_start..band_start + self.slots_per_tick {
                // Dropped after the shard lock is released
                if let Some(expired) = self.storage.with(slot, Option::take) {
                    self.stored.fetch_sub(1, Ordering::AcqRel);
                    drop(expired);
                    collected += 1;
                }
            }
        }
        self.current_tick.store(tick_now, Ordering::Release);

        if collected > 0 {
            debug!(from = last, to = tick_now, collected, "Expired transactions");
        }
        collected
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn clamp_idle_time(&self, idle_time: Tick) -> Tick {
        idle_time.min(self.max_idle_time)
    }

    #[inline]
    fn index_pos(&self, tidx: u64) -> usize {
        (tidx as usize) & self.mask
    }

    #[inline]
    fn band_start(&self, tick: Tick) -> usize {
        (tick % self.nof_bands) as usize * self.slots_per_tick
    }

    /// Slot of probe `attempt` for a deadline tick: the deadline band is
    /// probed completely, starting at `tidx % slots_per_tick`, before moving
    /// on to the next band.
    #[inline]
    fn probe_slot(&self, deadline: Tick, tidx: u64, attempt: usize) -> usize {
        let band = deadline.wrapping_add((attempt / self.slots_per_tick) as u64);
        let offset = ((tidx as usize) + attempt) & (self.slots_per_tick - 1);
        self.band_start(band) + offset
    }

    fn reserve_index(&self) -> Result<(u64, IndexLease)> {
        for _ in 0..self.alloc_tries {
            let tidx = self.random.next_u64();
            if let Some(lease) = IndexLease::acquire(&self.index, self.index_pos(tidx), tidx) {
                return Ok((tidx, lease));
            }
        }
        warn!(tries = self.alloc_tries, "No free transaction index");
        Err(PoolError::Exhausted("no free transaction index"))
    }

    fn place(&self, transaction: Transaction<C>) -> Result<TransactionId> {
        let id = transaction.id();
        let tidx = transaction.tidx;
        let deadline = self.current_tick().saturating_add(transaction.idle_time);

        let mut pending = Some(transaction);
        for attempt in 0..self.alloc_tries {
            let slot = self.probe_slot(deadline, tidx, attempt);
            let placed = self.storage.with(slot, |cell| {
                if cell.is_none() {
                    // Counted before any collector can take it out again
                    self.stored.fetch_add(1, Ordering::AcqRel);
                    *cell = pending.take();
                    true
                } else {
                    false
                }
            });
            if placed {
                if !self.index.publish(self.index_pos(tidx), tidx, slot) {
                    debug!(id = %id, slot, "Transaction expired before its slot was published");
                }
                return Ok(id);
            }
        }

        // Dropping the transaction frees its index reservation
        drop(pending);
        warn!(
            id = %id,
            deadline,
            tries = self.alloc_tries,
            "No free transaction slot"
        );
        Err(PoolError::Exhausted("no free transaction slot"))
    }
}

impl<C> std::fmt::Debug for TransactionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionPool")
            .field("capacity", &self.capacity())
            .field("slots_per_tick", &self.slots_per_tick)
            .field("max_idle_time", &self.max_idle_time)
            .field("current_tick", &self.current_tick())
            .field("stored", &self.len())
            .finish()
    }
}

/// Non-blocking re-entrancy guard for garbage collection
struct GcGuard<'a>(&'a AtomicBool);

impl<'a> GcGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GcGuard(flag))
    }
}

impl Drop for GcGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
