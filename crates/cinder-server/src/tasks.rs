//! Background tasks: expiry sweep and the snapshot scheduler.
//!
//! Both run `select!` loops against a shared shutdown signal and drop
//! their resources on the way out. Errors are logged; neither task can
//! take the process down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::db::Db;

/// How often the expirer scans for passed deadlines. Lazy expiration
/// on access is the precise source of TTL visibility; this sweep just
/// reclaims memory for keys nobody reads.
const EXPIRY_TICK: Duration = Duration::from_secs(1);

/// Sweeps expired keys once per tick until shutdown.
pub async fn run_expirer(db: Arc<Db>, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(EXPIRY_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let removed = db.keyspace.write().sweep_expired();
                if removed > 0 {
                    debug!(removed, "swept expired keys");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("expirer stopped");
}

/// Saves a snapshot every `interval` until shutdown.
pub async fn run_snapshot_scheduler(
    db: Arc<Db>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick of a tokio interval fires immediately; skip it so
    // the first snapshot lands one full interval after startup
    tick.tick().await;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let db = db.clone();
                let result = tokio::task::spawn_blocking(move || db.save_snapshot()).await;
                match result {
                    Ok(Ok(())) => debug!("scheduled snapshot saved"),
                    Ok(Err(e)) => warn!("scheduled snapshot failed: {e}"),
                    Err(e) => warn!("snapshot task panicked: {e}"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("snapshot scheduler stopped");
}
