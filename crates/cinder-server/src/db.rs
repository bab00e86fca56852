//! Shared server state.
//!
//! One `Db` holds everything the dispatcher touches: the keyspace
//! behind the process-wide reader-writer lock, the transaction
//! registry, the pub/sub broker, client sinks, and the persistence
//! handles. Connections share it through an `Arc`.
//!
//! Lock discipline: the keyspace lock is never held across an await,
//! and nothing is acquired while holding it except the append-only
//! log mutex (append happens before the handler takes the keyspace
//! lock, so in practice the two don't nest).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use cinder_core::Keyspace;
use cinder_persistence::aof::{self, AofLog};
use cinder_persistence::snapshot::{self, SnapshotState};
use cinder_persistence::{AofError, SnapshotError};

use crate::dispatch;
use crate::pubsub::{MessageSink, PubSub};
use crate::txn::TxnRegistry;
use crate::ClientId;

/// Reserved client id used while replaying the append-only log.
pub const REPLAY_CLIENT: ClientId = u64::MAX;

/// Reserved client id for the HTTP command endpoint, which has no
/// persistent connection to key per-client state to.
pub const HTTP_CLIENT: ClientId = u64::MAX - 1;

/// The server's shared state.
pub struct Db {
    pub(crate) keyspace: RwLock<Keyspace>,
    pub(crate) txns: TxnRegistry,
    pub(crate) pubsub: PubSub,
    sinks: DashMap<ClientId, Arc<dyn MessageSink>>,
    aof: Mutex<Option<AofLog>>,
    replaying: AtomicBool,
    snapshot_path: PathBuf,
    snapshot_lock: Mutex<()>,
    next_client_id: AtomicU64,
}

impl Db {
    /// Builds the shared state, opening the append-only log when a
    /// path is given and replaying it into the keyspace. A log that
    /// cannot be opened is fatal — the caller should exit.
    pub fn open(
        aof_path: Option<PathBuf>,
        snapshot_path: PathBuf,
    ) -> Result<Arc<Self>, AofError> {
        let aof = match &aof_path {
            Some(path) => Some(AofLog::open(path)?),
            None => None,
        };

        let db = Arc::new(Self {
            keyspace: RwLock::new(Keyspace::new()),
            txns: TxnRegistry::new(),
            pubsub: PubSub::new(),
            sinks: DashMap::new(),
            aof: Mutex::new(aof),
            replaying: AtomicBool::new(false),
            snapshot_path,
            snapshot_lock: Mutex::new(()),
            next_client_id: AtomicU64::new(1),
        });

        if let Some(path) = &aof_path {
            db.replay_aof(path);
        }
        Ok(db)
    }

    /// Re-dispatches every logged command under the reserved replay
    /// client. Log writes are suppressed for the duration, and a line
    /// that fails is logged and skipped rather than aborting startup.
    fn replay_aof(self: &Arc<Self>, path: &Path) {
        let commands = match aof::read_commands(path) {
            Ok(commands) => commands,
            Err(e) => {
                warn!("failed to read append-only log: {e}");
                return;
            }
        };
        if commands.is_empty() {
            return;
        }

        self.replaying.store(true, Ordering::SeqCst);
        for line in &commands {
            let reply = dispatch::dispatch(self, REPLAY_CLIENT, line);
            if reply.starts_with('-') {
                warn!(command = %line, %reply, "replayed command failed");
            }
        }
        self.replaying.store(false, Ordering::SeqCst);
        info!(count = commands.len(), "append-only log replayed");
    }

    /// Appends one command line to the log. No-ops while replaying or
    /// when the log is disabled.
    pub fn append_aof(&self, line: &str) -> Result<(), AofError> {
        if self.replaying.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.aof.lock().as_mut() {
            Some(log) => log.append(line),
            None => Ok(()),
        }
    }

    /// Whether the append-only log is enabled.
    pub fn aof_enabled(&self) -> bool {
        self.aof.lock().is_some()
    }

    /// Serializes the current state to the snapshot file.
    pub fn save_snapshot(&self) -> Result<(), SnapshotError> {
        let _guard = self.snapshot_lock.lock();
        let (store, expiries) = self.keyspace.read().export_state();
        snapshot::save(&self.snapshot_path, &SnapshotState { store, expiries })
    }

    /// Replaces the in-memory state from the snapshot file.
    pub fn load_snapshot(&self) -> Result<(), SnapshotError> {
        let _guard = self.snapshot_lock.lock();
        let state = snapshot::load(&self.snapshot_path)?;
        self.keyspace
            .write()
            .replace_state(state.store, state.expiries);
        Ok(())
    }

    /// Compacts the log to a minimal reconstruction of the current
    /// state. Returns `false` when the log is disabled.
    pub fn rewrite_aof(&self) -> Result<bool, AofError> {
        let commands = {
            let keyspace = self.keyspace.read();
            aof::reconstruction_commands(keyspace.iter_entries())
        };
        match self.aof.lock().as_mut() {
            Some(log) => {
                log.rewrite(&commands)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flushes and closes the append-only log on shutdown.
    pub fn close(&self) {
        if let Some(log) = self.aof.lock().as_mut() {
            if let Err(e) = log.close() {
                warn!("failed to close append-only log: {e}");
            }
        }
    }

    /// Registers a connected client and its message sink. Returns the
    /// client's id.
    pub fn register_client(&self, sink: Arc<dyn MessageSink>) -> ClientId {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.sinks.insert(id, sink);
        id
    }

    /// Tears down everything a departing client owns: sink,
    /// subscriptions, and any open transaction.
    pub fn unregister_client(&self, client: ClientId) {
        self.sinks.remove(&client);
        self.pubsub.drop_client(client);
        self.txns.discard(client);
    }

    /// The sink registered for a client, if any.
    pub fn sink_for(&self, client: ClientId) -> Option<Arc<dyn MessageSink>> {
        self.sinks.get(&client).map(|entry| Arc::clone(entry.value()))
    }
}
