//! Cross-area synchronization: the background change mirror and the
//! UI-facing status channel.
//!
//! The actual cross-device replication of the sync-class area is the
//! backend's own business; this module only keeps the two local areas
//! converged.

pub mod mirror;
pub mod status;

pub use mirror::{bootstrap_local_snapshot, start_mirror, ChangeMirror, MIRROR_DEBOUNCE};
pub use status::{StatusChannel, SyncState, SyncStatus};
