//! Hybrid storage facade: the API the dashboard UI talks to.
//!
//! Reads prefer the sync area, fall back to local, and bottom out at
//! synthesized defaults; writes go sync-first with an immediate local copy so
//! the fallback is always current. Backend failures never reach the caller —
//! they are logged and treated as "no data there".

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::migration::{self, SCHEMA_VERSION};
use super::models::{DashboardData, DashboardSettings, LayoutSettings, LayoutUpdate};
use crate::backend::{StorageArea, WriteOrigin};
use crate::sync::status::StatusChannel;

/// Persisted key of the dashboard document, identical in both areas
pub const DATA_KEY: &str = "bookmarkDashboard";
/// Persisted key of the settings document, identical in both areas
pub const SETTINGS_KEY: &str = "dashboardSettings";

pub struct HybridStorage {
    sync: Option<Arc<dyn StorageArea>>,
    local: Arc<dyn StorageArea>,
    device_id: String,
    status: StatusChannel,
}

impl HybridStorage {
    /// One instance per session owns the device identity and status channel;
    /// construct it once and hand it to every consumer.
    pub fn new(
        sync: Option<Arc<dyn StorageArea>>,
        local: Arc<dyn StorageArea>,
        device_id: String,
    ) -> Self {
        let status = StatusChannel::new(sync.is_some());
        Self {
            sync,
            local,
            device_id,
            status,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The status channel the facade (and mirror) publish on
    pub fn status_channel(&self) -> StatusChannel {
        self.status.clone()
    }

    /// Load the dashboard document: sync, then local, then starter defaults.
    ///
    /// The defaults path seeds both areas so the first write exists
    /// everywhere; the seed writes are mirror-tagged to keep the mirror
    /// quiet about them.
    pub async fn load_data(&self) -> DashboardData {
        if let Some(sync) = &self.sync {
            if let Some(data) = self.read_data_from(sync).await {
                return data;
            }
        }
        if let Some(data) = self.read_data_from(&self.local).await {
            return data;
        }

        let data = DashboardData::starter(&self.device_id);
        log::info!("no dashboard document in either area; seeding starter data");
        if let Some(value) = to_json(&data) {
            self.try_set(&self.local, DATA_KEY, value.clone(), WriteOrigin::Mirror)
                .await;
            if let Some(sync) = &self.sync {
                self.try_set(sync, DATA_KEY, value, WriteOrigin::Mirror).await;
            }
        }
        data
    }

    /// Stamp and persist the dashboard document, sync-first.
    ///
    /// On a successful sync write the identical document is copied to local
    /// (mirror-tagged); on failure or when no sync backend exists, local
    /// becomes the sole copy until sync recovers. Returns the stamped
    /// document either way.
    pub async fn save_data(&self, data: &DashboardData) -> DashboardData {
        let mut stamped = data.clone();
        stamped.version = SCHEMA_VERSION.to_string();
        stamped.last_modified = Utc::now().timestamp_millis();
        stamped.last_modified_by = self.device_id.clone();

        if let Some(value) = to_json(&stamped) {
            self.write_preferring_sync(DATA_KEY, value).await;
        }
        stamped
    }

    /// Load settings with the same area preference as data, but always run
    /// migration and write the merged result back to both areas — passive
    /// default backfills must reach storage too.
    pub async fn load_settings(&self) -> DashboardSettings {
        let mut raw = None;
        if let Some(sync) = &self.sync {
            raw = self.try_get(sync, SETTINGS_KEY).await;
        }
        if raw.is_none() {
            raw = self.try_get(&self.local, SETTINGS_KEY).await;
        }

        let merged = migration::migrate_settings(raw.unwrap_or(Value::Null));

        self.try_set(
            &self.local,
            SETTINGS_KEY,
            merged.clone(),
            WriteOrigin::Mirror,
        )
        .await;
        if let Some(sync) = &self.sync {
            self.try_set(sync, SETTINGS_KEY, merged.clone(), WriteOrigin::Mirror)
                .await;
        }

        decode_settings(merged)
    }

    /// Merge against defaults, then persist sync-first like `save_data`
    pub async fn save_settings(&self, settings: &DashboardSettings) -> DashboardSettings {
        let merged = match to_json(settings) {
            Some(value) => migration::migrate_settings(value),
            None => return settings.clone(),
        };
        self.write_preferring_sync(SETTINGS_KEY, merged.clone()).await;
        decode_settings(merged)
    }

    /// The layout-only view over the settings document
    pub async fn get_layout_settings(&self) -> LayoutSettings {
        LayoutSettings::from_settings(&self.load_settings().await)
    }

    /// Patch the layout fields and persist the full settings document
    pub async fn update_layout_settings(&self, update: LayoutUpdate) -> DashboardSettings {
        let mut settings = self.load_settings().await;
        if let Some(card_width) = update.card_width {
            settings.card_width = card_width;
        }
        if let Some(container_margin) = update.container_margin {
            settings.container_margin = container_margin;
        }
        self.save_settings(&settings).await
    }

    /// Wipe both areas and re-seed starter data and default settings
    pub async fn reset_to_defaults(&self) -> DashboardData {
        log::info!("resetting dashboard storage to defaults");
        if let Some(sync) = &self.sync {
            if let Err(e) = sync.clear(WriteOrigin::Mirror).await {
                log::warn!("reset: sync clear failed: {}", e);
            }
        }
        if let Err(e) = self.local.clear(WriteOrigin::Mirror).await {
            log::warn!("reset: local clear failed: {}", e);
        }
        let data = self.load_data().await;
        self.load_settings().await;
        data
    }

    // ===== Internals =====

    async fn read_data_from(&self, area: &Arc<dyn StorageArea>) -> Option<DashboardData> {
        let mut raw = self.try_get(area, DATA_KEY).await?;
        if !migration::migrate_data(&mut raw) {
            log::warn!(
                "dashboard document in {} area has no cards array; ignoring it",
                area.kind().as_str()
            );
            return None;
        }
        match serde_json::from_value(raw) {
            Ok(data) => Some(data),
            Err(e) => {
                log::warn!(
                    "dashboard document in {} area did not decode: {}",
                    area.kind().as_str(),
                    e
                );
                None
            }
        }
    }

    /// Sync-first write with a mirror-tagged local copy on success and a
    /// direct local write on failure
    async fn write_preferring_sync(&self, key: &str, value: Value) {
        let mut sync_ok = false;
        if let Some(sync) = &self.sync {
            sync_ok = self.try_set(sync, key, value.clone(), WriteOrigin::User).await;
            if sync_ok {
                self.status.mark_synced();
            } else {
                self.status.mark_offline();
            }
        }
        if sync_ok {
            // Keep the fallback copy current without re-triggering the mirror
            self.try_set(&self.local, key, value, WriteOrigin::Mirror).await;
        } else {
            self.try_set(&self.local, key, value, WriteOrigin::User).await;
        }
    }

    async fn try_get(&self, area: &Arc<dyn StorageArea>, key: &str) -> Option<Value> {
        match area.get_one(key).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{} read of {} failed: {}", area.kind().as_str(), key, e);
                None
            }
        }
    }

    async fn try_set(
        &self,
        area: &Arc<dyn StorageArea>,
        key: &str,
        value: Value,
        origin: WriteOrigin,
    ) -> bool {
        let mut items = HashMap::new();
        items.insert(key.to_string(), value);
        match area.set(items, origin).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{} write of {} failed: {}", area.kind().as_str(), key, e);
                false
            }
        }
    }
}

fn to_json<T: serde::Serialize>(doc: &T) -> Option<Value> {
    match serde_json::to_value(doc) {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("document failed to serialize: {}", e);
            None
        }
    }
}

fn decode_settings(merged: Value) -> DashboardSettings {
    match serde_json::from_value(merged) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("merged settings did not decode, using defaults: {}", e);
            DashboardSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AreaKind, AreaQuota, MemoryArea};
    use crate::storage::models::Card;
    use serde_json::json;
    use std::time::Duration;

    fn facade() -> (HybridStorage, Arc<dyn StorageArea>, Arc<dyn StorageArea>) {
        let sync: Arc<dyn StorageArea> = Arc::new(MemoryArea::new(AreaKind::Sync));
        let local: Arc<dyn StorageArea> = Arc::new(MemoryArea::new(AreaKind::Local));
        let hybrid = HybridStorage::new(
            Some(Arc::clone(&sync)),
            Arc::clone(&local),
            "device_test".to_string(),
        );
        (hybrid, sync, local)
    }

    async fn seed(area: &Arc<dyn StorageArea>, key: &str, value: Value) {
        let mut items = HashMap::new();
        items.insert(key.to_string(), value);
        area.set(items, WriteOrigin::User).await.unwrap();
    }

    fn doc(marker: &str) -> Value {
        json!({
            "version": SCHEMA_VERSION,
            "lastModified": 1,
            "lastModifiedBy": marker,
            "cards": [{"id": marker, "title": marker, "color": "blue-500", "order": 0, "links": []}]
        })
    }

    #[tokio::test]
    async fn sync_area_wins_over_local() {
        let (hybrid, sync, local) = facade();
        seed(&sync, DATA_KEY, doc("from-sync")).await;
        seed(&local, DATA_KEY, doc("from-local")).await;

        let data = hybrid.load_data().await;
        assert_eq!(data.cards[0].id, "from-sync");

        sync.clear(WriteOrigin::User).await.unwrap();
        let data = hybrid.load_data().await;
        assert_eq!(data.cards[0].id, "from-local");
    }

    #[tokio::test]
    async fn defaults_seed_both_areas() {
        let (hybrid, sync, local) = facade();

        let data = hybrid.load_data().await;
        assert!(!data.cards.is_empty());

        let expected = serde_json::to_value(&data).unwrap();
        assert_eq!(sync.get_one(DATA_KEY).await.unwrap(), Some(expected.clone()));
        assert_eq!(local.get_one(DATA_KEY).await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn unusable_sync_document_falls_back_to_local() {
        let (hybrid, sync, local) = facade();
        // No cards array: migration declares it unusable
        seed(&sync, DATA_KEY, json!({"version": "0.0.1"})).await;
        seed(&local, DATA_KEY, doc("from-local")).await;

        let data = hybrid.load_data().await;
        assert_eq!(data.cards[0].id, "from-local");
    }

    #[tokio::test]
    async fn save_data_stamps_and_mirrors_to_local() {
        let (hybrid, sync, local) = facade();
        let mut data = DashboardData::default();
        data.version = "0.0.1".to_string();
        data.push_card(Card {
            id: "c1".into(),
            ..Card::default()
        });

        let stamped = hybrid.save_data(&data).await;
        assert_eq!(stamped.version, SCHEMA_VERSION);
        assert_eq!(stamped.last_modified_by, "device_test");
        assert!(stamped.last_modified > 0);

        let expected = serde_json::to_value(&stamped).unwrap();
        assert_eq!(sync.get_one(DATA_KEY).await.unwrap(), Some(expected.clone()));
        assert_eq!(local.get_one(DATA_KEY).await.unwrap(), Some(expected));
        assert!(hybrid.status_channel().current().last_sync.is_some());
    }

    #[tokio::test]
    async fn sync_write_failure_falls_back_to_local() {
        let sync: Arc<dyn StorageArea> = Arc::new(MemoryArea::with_quota(
            AreaKind::Sync,
            AreaQuota {
                max_item_bytes: Some(16),
                max_total_bytes: None,
            },
        ));
        let local: Arc<dyn StorageArea> = Arc::new(MemoryArea::new(AreaKind::Local));
        let hybrid = HybridStorage::new(
            Some(Arc::clone(&sync)),
            Arc::clone(&local),
            "device_test".to_string(),
        );

        let data = DashboardData::starter("device_test");
        let stamped = hybrid.save_data(&data).await;

        assert_eq!(stamped.version, SCHEMA_VERSION);
        assert_eq!(sync.get_one(DATA_KEY).await.unwrap(), None);
        assert!(local.get_one(DATA_KEY).await.unwrap().is_some());
        assert!(!hybrid.status_channel().current().is_online);
    }

    #[tokio::test]
    async fn no_sync_backend_routes_to_local_only() {
        let local: Arc<dyn StorageArea> = Arc::new(MemoryArea::new(AreaKind::Local));
        let hybrid = HybridStorage::new(None, Arc::clone(&local), "device_test".to_string());

        let data = hybrid.load_data().await;
        assert!(!data.cards.is_empty());
        assert!(local.get_one(DATA_KEY).await.unwrap().is_some());

        let saved = hybrid.save_data(&data).await;
        assert_eq!(saved.version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn load_settings_writes_migrated_copy_everywhere() {
        let (hybrid, sync, local) = facade();
        // Settings exist only in local, missing most keys
        seed(&local, SETTINGS_KEY, json!({"theme": "dark"})).await;

        let settings = hybrid.load_settings().await;
        assert_eq!(settings.theme, "dark");
        assert_eq!(settings.version, SCHEMA_VERSION);
        assert_eq!(settings.card_width, "sm");

        let in_sync = sync.get_one(SETTINGS_KEY).await.unwrap().unwrap();
        let in_local = local.get_one(SETTINGS_KEY).await.unwrap().unwrap();
        assert_eq!(in_sync, in_local);
        assert_eq!(in_sync["version"], json!(SCHEMA_VERSION));
    }

    #[tokio::test]
    async fn absent_settings_become_full_defaults() {
        let (hybrid, _sync, _local) = facade();
        let settings = hybrid.load_settings().await;
        assert_eq!(settings, DashboardSettings::default());
        assert_eq!(settings.version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn layout_view_round_trips() {
        let (hybrid, _sync, _local) = facade();

        let layout = hybrid.get_layout_settings().await;
        assert_eq!(layout.card_width, "sm");
        assert_eq!(layout.container_margin, "medium");

        let updated = hybrid
            .update_layout_settings(LayoutUpdate {
                card_width: Some("lg".to_string()),
                container_margin: None,
            })
            .await;
        assert_eq!(updated.card_width, "lg");
        assert_eq!(updated.container_margin, "medium");

        let layout = hybrid.get_layout_settings().await;
        assert_eq!(layout.card_width, "lg");
    }

    #[tokio::test]
    async fn reset_reseeds_starter_data() {
        let (hybrid, sync, _local) = facade();
        seed(&sync, DATA_KEY, doc("old")).await;

        let data = hybrid.reset_to_defaults().await;
        let ids: Vec<&str> = data.cards_sorted().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["google-workspace", "ai-tools"]);
        assert!(sync.get_one(SETTINGS_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn end_to_end_default_save_reload() {
        let (hybrid, _sync, _local) = facade();

        let data = hybrid.load_data().await;
        let ids: Vec<&str> = data.cards_sorted().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["google-workspace", "ai-tools"]);
        let first_modified = data.last_modified;

        tokio::time::sleep(Duration::from_millis(5)).await;

        let mut edited = data.clone();
        edited.push_card(Card {
            id: "third".into(),
            title: "Third".into(),
            color: "green-500".into(),
            ..Card::default()
        });
        assert_eq!(edited.card("third").unwrap().order, 2);
        hybrid.save_data(&edited).await;

        let reloaded = hybrid.load_data().await;
        assert_eq!(reloaded.cards.len(), 3);
        let orders: Vec<i64> = reloaded.cards_sorted().iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(reloaded.version, SCHEMA_VERSION);
        assert!(reloaded.last_modified > first_modified);
    }
}
