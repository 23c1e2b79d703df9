use std::collections::HashMap;

const INITIAL_TRANSACTION_ID: u32 = 1;

/// Allocates transaction ids for outgoing calls and keeps whatever is waiting on their
/// replies, partitioned by message stream.
///
/// Transaction id 0 is never handed out, it marks calls that expect no reply.
pub struct TransactionTracker<W> {
    pending: HashMap<u32, HashMap<u32, W>>,
    next_transaction_ids: HashMap<u32, u32>,
}

impl<W> TransactionTracker<W> {
    pub fn new() -> TransactionTracker<W> {
        TransactionTracker {
            pending: HashMap::new(),
            next_transaction_ids: HashMap::new(),
        }
    }

    /// Returns the next transaction id for the stream and advances its counter
    pub fn next_transaction_id(&mut self, stream_id: u32) -> u32 {
        let next = self
            .next_transaction_ids
            .entry(stream_id)
            .or_insert(INITIAL_TRANSACTION_ID);

        let transaction_id = *next;
        *next = match transaction_id.wrapping_add(1) {
            0 => INITIAL_TRANSACTION_ID,
            x => x,
        };

        transaction_id
    }

    /// Registers a waiter for the reply to a transaction.  If a waiter was already registered
    /// for the same transaction it is handed back.
    pub fn track(&mut self, stream_id: u32, transaction_id: u32, waiter: W) -> Option<W> {
        self.pending
            .entry(stream_id)
            .or_insert_with(HashMap::new)
            .insert(transaction_id, waiter)
    }

    /// Removes and returns the waiter for a transaction, or `None` if nothing is waiting on it
    pub fn resolve(&mut self, stream_id: u32, transaction_id: u32) -> Option<W> {
        let stream_waiters = self.pending.get_mut(&stream_id)?;
        let waiter = stream_waiters.remove(&transaction_id);
        if stream_waiters.is_empty() {
            self.pending.remove(&stream_id);
        }

        waiter
    }

    /// Removes every waiter that is still pending, along with the stream it was waiting on
    pub fn drain_all(&mut self) -> Vec<(u32, W)> {
        self.pending
            .drain()
            .flat_map(|(stream_id, waiters)| {
                waiters.into_iter().map(move |(_, waiter)| (stream_id, waiter))
            })
            .collect()
    }

    /// Starts every stream's transaction ids over from the beginning
    pub fn reset(&mut self) {
        self.next_transaction_ids.clear();
    }

    /// Number of transactions that are still waiting on a reply
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(|waiters| waiters.len()).sum()
    }
}

impl<W> Default for TransactionTracker<W> {
    fn default() -> Self {
        TransactionTracker::new()
    }
}
