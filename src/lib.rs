//! tabdeck — storage core for a new-tab bookmark dashboard.
//!
//! Two JSON documents (dashboard data and settings) persist across a pair of
//! key-value areas: a small replicated "sync" area and a large device-local
//! one. The [`storage::HybridStorage`] facade reads sync-first with local and
//! synthesized-default fallbacks, a background [`sync::ChangeMirror`] keeps
//! the areas converged, and [`recovery`] offers a manual restore path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod backend;
pub mod device;
pub mod recovery;
pub mod storage;
pub mod sync;

pub use backend::{
    AreaKind, AreaQuota, ChangeBatch, FileArea, MemoryArea, Result, StorageArea, StorageError,
    WriteOrigin,
};
pub use storage::{
    Card, DashboardData, DashboardSettings, HybridStorage, LayoutSettings, LayoutUpdate, Link,
    SubLink, DATA_KEY, SCHEMA_VERSION, SETTINGS_KEY,
};
pub use sync::{ChangeMirror, StatusChannel, SyncState, SyncStatus};

/// Everything a session needs, wired together by [`open_profile`]
pub struct Profile {
    pub hybrid: HybridStorage,
    pub mirror: ChangeMirror,
    pub sync_area: Arc<dyn StorageArea>,
    pub local_area: Arc<dyn StorageArea>,
}

/// Default profile directory for this user
pub fn default_profile_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|p| p.join("tabdeck"))
        .ok_or(StorageError::ProfileDirNotFound)
}

/// Open (or create) a profile directory and wire up the full stack: both
/// file-backed areas, the device identity, the first-install snapshot, the
/// facade, and the running mirror.
///
/// The sync-class area carries the replicated backend's quota so over-quota
/// fallback behaves here the way it does against the real thing. Embedders
/// with an actual replicated backend can skip this and hand their own
/// [`StorageArea`] implementations to [`HybridStorage::new`] directly.
pub async fn open_profile(profile_dir: &Path) -> Result<Profile> {
    let sync_area: Arc<dyn StorageArea> = Arc::new(FileArea::with_quota(
        AreaKind::Sync,
        profile_dir.join("sync.json"),
        AreaQuota::sync_class(),
    ));
    let local_area: Arc<dyn StorageArea> =
        Arc::new(FileArea::new(AreaKind::Local, profile_dir.join("local.json")));

    let device_id = device::load_or_create(profile_dir);
    log::info!("opening profile at {:?} as {}", profile_dir, device_id);

    sync::bootstrap_local_snapshot(&sync_area, &local_area).await;

    let hybrid = HybridStorage::new(
        Some(Arc::clone(&sync_area)),
        Arc::clone(&local_area),
        device_id,
    );
    let mirror = sync::start_mirror(
        Arc::clone(&sync_area),
        Arc::clone(&local_area),
        Some(hybrid.status_channel()),
    );

    Ok(Profile {
        hybrid,
        mirror,
        sync_area,
        local_area,
    })
}
