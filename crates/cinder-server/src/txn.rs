//! Per-client transaction queues.
//!
//! A client enters MULTI state by acquiring an (initially empty)
//! command queue; the dispatcher then diverts its commands here until
//! EXEC drains them or DISCARD drops them. State is keyed by client
//! id, so concurrent clients transact independently.

use dashmap::DashMap;

use crate::ClientId;

/// Registry of open transactions. Presence of a queue means the client
/// is in MULTI state.
#[derive(Default)]
pub struct TxnRegistry {
    queues: DashMap<ClientId, Vec<String>>,
}

impl TxnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters MULTI state, clearing any previously queued commands.
    pub fn begin(&self, client: ClientId) {
        self.queues.insert(client, Vec::new());
    }

    /// Whether the client is in MULTI state.
    pub fn in_txn(&self, client: ClientId) -> bool {
        self.queues.contains_key(&client)
    }

    /// Queues a command line. Returns `false` when the client has no
    /// open transaction.
    pub fn queue(&self, client: ClientId, line: String) -> bool {
        match self.queues.get_mut(&client) {
            Some(mut queue) => {
                queue.push(line);
                true
            }
            None => false,
        }
    }

    /// Takes the queued commands and leaves MULTI state. `None` when no
    /// transaction was open.
    pub fn take(&self, client: ClientId) -> Option<Vec<String>> {
        self.queues.remove(&client).map(|(_, queue)| queue)
    }

    /// Drops the queue and leaves MULTI state. Returns `false` when no
    /// transaction was open.
    pub fn discard(&self, client: ClientId) -> bool {
        self.queues.remove(&client).is_some()
    }
}
