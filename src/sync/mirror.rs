//! Background change mirror between the two storage areas.
//!
//! Each direction (sync→local, local→sync) runs its own debounced loop:
//! user-originated change batches are coalesced for [`MIRROR_DEBOUNCE`] and
//! then written into the opposite area tagged [`WriteOrigin::Mirror`], which
//! is exactly what each loop drops on receipt — no echo can circulate.
//! Mirroring is best-effort: a failed mirror write is logged and forgotten,
//! the main read path never depends on it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::backend::{AreaKind, ChangeBatch, StorageArea, WriteOrigin, LEGACY_MIRROR_FLAG};
use crate::sync::status::StatusChannel;

/// Coalescing window for mirror writes
pub const MIRROR_DEBOUNCE: Duration = Duration::from_millis(150);

/// Handle for the running mirror tasks
pub struct ChangeMirror {
    shutdown_tx: watch::Sender<bool>,
}

impl ChangeMirror {
    /// Stop both mirror directions; pending unflushed changes are dropped
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// One-shot first-install snapshot: copy everything the sync area holds into
/// the local area so the fallback starts out fresh. No-op when sync is empty.
pub async fn bootstrap_local_snapshot(sync: &Arc<dyn StorageArea>, local: &Arc<dyn StorageArea>) {
    let mut all = match sync.get_all().await {
        Ok(all) => all,
        Err(e) => {
            log::warn!("bootstrap snapshot: sync area unreadable: {}", e);
            return;
        }
    };
    all.remove(LEGACY_MIRROR_FLAG);
    if all.is_empty() {
        return;
    }
    log::info!("bootstrap snapshot: copying {} entries sync -> local", all.len());
    if let Err(e) = local.set(all, WriteOrigin::Mirror).await {
        log::warn!("bootstrap snapshot failed: {}", e);
    }
}

/// Start mirroring both directions between the two areas.
///
/// When a [`StatusChannel`] is supplied, the local→sync direction reports its
/// pending queue depth and online state through it.
pub fn start_mirror(
    sync: Arc<dyn StorageArea>,
    local: Arc<dyn StorageArea>,
    status: Option<StatusChannel>,
) -> ChangeMirror {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Subscribe before spawning so writes made as soon as this returns are
    // never lost to the spawned tasks starting late.
    let sync_rx = sync.subscribe();
    let local_rx = local.subscribe();
    tokio::spawn(mirror_loop(
        Arc::clone(&sync),
        Arc::clone(&local),
        sync_rx,
        shutdown_rx.clone(),
        None,
    ));
    tokio::spawn(mirror_loop(local, sync, local_rx, shutdown_rx, status));

    ChangeMirror { shutdown_tx }
}

async fn mirror_loop(
    source: Arc<dyn StorageArea>,
    dest: Arc<dyn StorageArea>,
    mut rx: broadcast::Receiver<ChangeBatch>,
    mut shutdown: watch::Receiver<bool>,
    status: Option<StatusChannel>,
) {
    let mut pending_set: HashMap<String, Value> = HashMap::new();
    let mut pending_remove: HashSet<String> = HashSet::new();
    let mut deadline: Option<Instant> = None;

    log::debug!(
        "mirror {} -> {} started",
        source.kind().as_str(),
        dest.kind().as_str()
    );

    loop {
        let flush_at = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

        tokio::select! {
            _ = shutdown.changed() => break,

            batch = rx.recv() => match batch {
                Ok(batch) => {
                    if batch.origin == WriteOrigin::Mirror {
                        // Our own echo (or the other direction's); drop it
                        continue;
                    }
                    for (key, value) in batch.changes {
                        if key == LEGACY_MIRROR_FLAG {
                            continue;
                        }
                        match value {
                            Some(value) => {
                                pending_remove.remove(&key);
                                pending_set.insert(key, value);
                            }
                            None => {
                                pending_set.remove(&key);
                                pending_remove.insert(key);
                            }
                        }
                    }
                    deadline = Some(Instant::now() + MIRROR_DEBOUNCE);
                    if let Some(status) = &status {
                        status.set_queue_length(pending_set.len() + pending_remove.len());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "mirror {} -> {}: lagged, {} change batches lost",
                        source.kind().as_str(),
                        dest.kind().as_str(),
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            _ = tokio::time::sleep_until(flush_at), if deadline.is_some() => {
                flush(
                    &dest,
                    std::mem::take(&mut pending_set),
                    std::mem::take(&mut pending_remove),
                    status.as_ref(),
                )
                .await;
                deadline = None;
            }
        }
    }

    log::debug!(
        "mirror {} -> {} stopped",
        source.kind().as_str(),
        dest.kind().as_str()
    );
}

async fn flush(
    dest: &Arc<dyn StorageArea>,
    pending_set: HashMap<String, Value>,
    pending_remove: HashSet<String>,
    status: Option<&StatusChannel>,
) {
    let mut failed = false;

    if !pending_set.is_empty() {
        if let Err(e) = dest.set(pending_set, WriteOrigin::Mirror).await {
            // Best-effort: quota/offline on the sync side is expected
            log::debug!("mirror write to {} dropped: {}", dest.kind().as_str(), e);
            failed = true;
        }
    }
    if !pending_remove.is_empty() {
        let keys: Vec<&str> = pending_remove.iter().map(String::as_str).collect();
        if let Err(e) = dest.remove(&keys, WriteOrigin::Mirror).await {
            log::debug!("mirror removal in {} dropped: {}", dest.kind().as_str(), e);
            failed = true;
        }
    }

    if let Some(status) = status {
        status.set_queue_length(0);
        if dest.kind() == AreaKind::Sync {
            if failed {
                status.mark_offline();
            } else {
                status.mark_synced();
            }
        }
    }
}
