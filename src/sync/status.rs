//! UI-facing sync-state channel.
//!
//! Optional glue: the facade and mirror publish here, status indicators may
//! subscribe or ignore it. The storage core never reads it back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Current sync state
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Sync backend reachable, nothing in flight
    Idle,
    /// A mirror write toward the sync backend is pending
    Syncing,
    /// Last sync-class write failed (quota or offline)
    Offline,
    /// No sync-class backend configured
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub status: SyncState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    /// Entries waiting in the mirror's debounce window
    pub queue_length: usize,
    pub is_online: bool,
}

impl SyncStatus {
    fn initial(sync_available: bool) -> Self {
        Self {
            status: if sync_available {
                SyncState::Idle
            } else {
                SyncState::Disabled
            },
            last_sync: None,
            queue_length: 0,
            is_online: sync_available,
        }
    }
}

/// Broadcast handle for [`SyncStatus`] updates
#[derive(Clone)]
pub struct StatusChannel {
    tx: Arc<watch::Sender<SyncStatus>>,
}

impl StatusChannel {
    pub fn new(sync_available: bool) -> Self {
        let (tx, _) = watch::channel(SyncStatus::initial(sync_available));
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    /// A sync-class write just succeeded
    pub fn mark_synced(&self) {
        self.tx.send_modify(|s| {
            s.status = SyncState::Idle;
            s.last_sync = Some(Utc::now());
            s.is_online = true;
        });
    }

    /// A sync-class write just failed
    pub fn mark_offline(&self) {
        self.tx.send_modify(|s| {
            s.status = SyncState::Offline;
            s.is_online = false;
        });
    }

    /// Mirror debounce queue depth changed
    pub fn set_queue_length(&self, queue_length: usize) {
        self.tx.send_modify(|s| {
            s.queue_length = queue_length;
            if queue_length > 0 && s.status == SyncState::Idle {
                s.status = SyncState::Syncing;
            } else if queue_length == 0 && s.status == SyncState::Syncing {
                s.status = SyncState::Idle;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_sync_backend() {
        let channel = StatusChannel::new(false);
        let status = channel.current();
        assert_eq!(status.status, SyncState::Disabled);
        assert!(!status.is_online);
        assert_eq!(status.queue_length, 0);
    }

    #[test]
    fn synced_then_offline_transitions() {
        let channel = StatusChannel::new(true);
        channel.mark_synced();
        assert_eq!(channel.current().status, SyncState::Idle);
        assert!(channel.current().last_sync.is_some());

        channel.mark_offline();
        let status = channel.current();
        assert_eq!(status.status, SyncState::Offline);
        assert!(!status.is_online);
        // last_sync survives going offline
        assert!(status.last_sync.is_some());
    }

    #[test]
    fn queue_depth_drives_syncing_state() {
        let channel = StatusChannel::new(true);
        channel.set_queue_length(3);
        assert_eq!(channel.current().status, SyncState::Syncing);
        channel.set_queue_length(0);
        assert_eq!(channel.current().status, SyncState::Idle);
    }
}
