//! Pooled transactions

use crate::slots::IndexLease;
use courier_core::{Tick, TransactionId};
use std::fmt;

/// Execution context kept alive across HTTP round-trips
///
/// A transaction is owned either by the pool's slot table or by the caller
/// that fetched it, never both. Dropping a fetched transaction destroys it and
/// frees its id; handing it back with
/// [`TransactionPool::return_transaction`](crate::TransactionPool::return_transaction)
/// renews its deadline.
pub struct Transaction<C> {
    pub(crate) context: C,
    pub(crate) tidx: u64,
    pub(crate) idle_time: Tick,
    pub(crate) lease: IndexLease,
}

impl<C> Transaction<C> {
    /// External identifier
    pub fn id(&self) -> TransactionId {
        TransactionId::from_index(self.tidx)
    }

    /// Ticks the transaction may stay untouched in the pool
    pub fn idle_time(&self) -> Tick {
        self.idle_time
    }

    /// Change the idle time used on the next return
    pub fn set_idle_time(&mut self, idle_time: Tick) {
        self.idle_time = idle_time;
    }

    /// Borrow the execution context
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Mutably borrow the execution context
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Destroy the transaction, keeping its context
    pub fn into_context(self) -> C {
        let Transaction { context, .. } = self;
        context
    }
}

impl<C> fmt::Debug for Transaction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("idle_time", &self.idle_time)
            .field("index", &self.lease.pos())
            .finish_non_exhaustive()
    }
}
