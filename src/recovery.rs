//! Manual disaster recovery.
//!
//! Never wired into normal startup: this runs only when the user asks for it
//! (dashboard gone, both load paths apparently empty). It restores from the
//! local backup, failing that from the legacy chunked layout old versions
//! left in the sync area, and as a last resort clears everything so the
//! facade's default path can repopulate.
//!
//! The chunked format is a closed legacy decoder — nothing writes it anymore.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::{Result, StorageArea, WriteOrigin};
use crate::storage::DATA_KEY;

/// Legacy metadata record declaring the chunk count
pub const LEGACY_META_KEY: &str = "bookmarkDashboard_meta";

/// Practical per-write ceiling of the sync-class backend; a reconstructed
/// document larger than this stays local-only.
pub const SYNC_SINGLE_WRITE_LIMIT: usize = 8000;

fn legacy_chunk_key(index: u64) -> String {
    format!("bookmarkDashboard_chunk_{}", index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The local backup was copied over a cleared sync area
    RestoredFromLocal,
    /// The legacy chunked document was reassembled into both areas
    RestoredFromChunks,
    /// Nothing recoverable; both areas cleared, defaults will repopulate
    ClearedBothAreas,
}

/// Run the three-step recovery. Unlike the facade this surfaces backend
/// errors — the operator asked for surgery and should see it fail.
pub async fn recover(
    sync: Option<&Arc<dyn StorageArea>>,
    local: &Arc<dyn StorageArea>,
) -> Result<RecoveryOutcome> {
    log::info!("starting dashboard recovery");

    // Step 1: a local backup outranks whatever state sync is in
    if let Some(backup) = local.get_one(DATA_KEY).await? {
        log::info!("found backup document in the local area");
        if let Some(sync) = sync {
            log::info!("clearing sync area and restoring the local copy");
            sync.clear(WriteOrigin::User).await?;
            sync.set(single(DATA_KEY, backup), WriteOrigin::User).await?;
        }
        log::info!("recovery complete (local backup)");
        return Ok(RecoveryOutcome::RestoredFromLocal);
    }

    // Step 2: legacy chunked layout in sync
    if let Some(sync) = sync {
        let entries = sync.get_all().await?;
        if let Some(reconstructed) = reassemble_chunks(&entries) {
            log::info!("reassembled legacy chunked document");
            local
                .set(single(DATA_KEY, reconstructed.clone()), WriteOrigin::User)
                .await?;

            let serialized_len = reconstructed.to_string().len();
            if serialized_len < SYNC_SINGLE_WRITE_LIMIT {
                sync.clear(WriteOrigin::User).await?;
                sync.set(single(DATA_KEY, reconstructed), WriteOrigin::User)
                    .await?;
            } else {
                log::info!(
                    "reconstructed document is {} bytes, over the sync write limit; kept local-only",
                    serialized_len
                );
            }
            log::info!("recovery complete (legacy chunks)");
            return Ok(RecoveryOutcome::RestoredFromChunks);
        }
    }

    // Step 3: accept the loss and start over
    log::info!("no recoverable data found; clearing both areas");
    if let Some(sync) = sync {
        sync.clear(WriteOrigin::User).await?;
    }
    local.clear(WriteOrigin::User).await?;
    log::info!("recovery complete (reset); defaults will repopulate on next load");
    Ok(RecoveryOutcome::ClearedBothAreas)
}

/// Decode the legacy chunked layout: a meta record with `chunkCount` plus
/// that many string fragments. Returns `None` unless every chunk is present
/// and the concatenation parses.
fn reassemble_chunks(entries: &HashMap<String, Value>) -> Option<Value> {
    let meta = entries.get(LEGACY_META_KEY)?;
    let chunk_count = meta.get("chunkCount").and_then(Value::as_u64)?;
    if chunk_count == 0 {
        return None;
    }

    let mut joined = String::new();
    for index in 0..chunk_count {
        match entries.get(&legacy_chunk_key(index)).and_then(Value::as_str) {
            Some(fragment) => joined.push_str(fragment),
            None => {
                log::warn!(
                    "legacy chunk set incomplete: missing chunk {} of {}",
                    index,
                    chunk_count
                );
                return None;
            }
        }
    }

    match serde_json::from_str(&joined) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("legacy chunk data did not parse: {}", e);
            None
        }
    }
}

fn single(key: &str, value: Value) -> HashMap<String, Value> {
    let mut items = HashMap::new();
    items.insert(key.to_string(), value);
    items
}
