//! In-process storage area.
//!
//! Substitutes for a native backend when none exists, with the same async
//! contract and fabricated change notifications. Also the test double for
//! everything above the adapter.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{
    check_quota, entry_size, AreaKind, AreaQuota, ChangeBatch, Result, StorageArea, WriteOrigin,
};

const EVENT_CAPACITY: usize = 64;

pub struct MemoryArea {
    kind: AreaKind,
    quota: AreaQuota,
    entries: Mutex<HashMap<String, Value>>,
    events: broadcast::Sender<ChangeBatch>,
}

impl MemoryArea {
    pub fn new(kind: AreaKind) -> Self {
        Self::with_quota(kind, AreaQuota::unlimited())
    }

    pub fn with_quota(kind: AreaKind, quota: AreaQuota) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            kind,
            quota,
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn publish(&self, origin: WriteOrigin, changes: HashMap<String, Option<Value>>) {
        if changes.is_empty() {
            return;
        }
        // Nobody listening is fine
        let _ = self.events.send(ChangeBatch {
            area: self.kind,
            origin,
            changes,
        });
    }
}

#[async_trait]
impl StorageArea for MemoryArea {
    fn kind(&self) -> AreaKind {
        self.kind
    }

    async fn get_one(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).cloned())
    }

    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let entries = self.entries.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn get_with_defaults(
        &self,
        defaults: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>> {
        let entries = self.entries.lock().unwrap();
        Ok(defaults
            .iter()
            .map(|(k, d)| (k.clone(), entries.get(k).unwrap_or(d).clone()))
            .collect())
    }

    async fn set(&self, items: HashMap<String, Value>, origin: WriteOrigin) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        {
            let mut entries = self.entries.lock().unwrap();
            let mut resulting = entries.clone();
            for (k, v) in &items {
                resulting.insert(k.clone(), v.clone());
            }
            check_quota(&self.quota, &resulting, &items)?;
            *entries = resulting;
        }
        let changes = items.into_iter().map(|(k, v)| (k, Some(v))).collect();
        self.publish(origin, changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str], origin: WriteOrigin) -> Result<()> {
        let mut changes = HashMap::new();
        {
            let mut entries = self.entries.lock().unwrap();
            for key in keys {
                if entries.remove(*key).is_some() {
                    changes.insert(key.to_string(), None);
                }
            }
        }
        self.publish(origin, changes);
        Ok(())
    }

    async fn clear(&self, origin: WriteOrigin) -> Result<()> {
        let removed: Vec<String> = {
            let mut entries = self.entries.lock().unwrap();
            let keys = entries.keys().cloned().collect();
            entries.clear();
            keys
        };
        let changes = removed.into_iter().map(|k| (k, None)).collect();
        self.publish(origin, changes);
        Ok(())
    }

    async fn bytes_in_use(&self, keys: Option<&[&str]>) -> Result<u64> {
        let entries = self.entries.lock().unwrap();
        let total = match keys {
            Some(keys) => keys
                .iter()
                .filter_map(|k| entries.get(*k).map(|v| entry_size(k, v)))
                .sum(),
            None => entries.iter().map(|(k, v)| entry_size(k, v)).sum(),
        };
        Ok(total)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeBatch> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageError;
    use serde_json::json;

    fn items(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn set_then_get_variants() {
        let area = MemoryArea::new(AreaKind::Local);
        area.set(
            items(&[("a", json!(1)), ("b", json!("two"))]),
            WriteOrigin::User,
        )
        .await
        .unwrap();

        assert_eq!(area.get_one("a").await.unwrap(), Some(json!(1)));
        assert_eq!(area.get_one("missing").await.unwrap(), None);

        let many = area.get_many(&["a", "missing"]).await.unwrap();
        assert_eq!(many.len(), 1);
        assert_eq!(many["a"], json!(1));

        let all = area.get_all().await.unwrap();
        assert_eq!(all.len(), 2);

        let defaults = items(&[("b", json!("fallback")), ("c", json!("fallback"))]);
        let with_defaults = area.get_with_defaults(&defaults).await.unwrap();
        assert_eq!(with_defaults["b"], json!("two"));
        assert_eq!(with_defaults["c"], json!("fallback"));
    }

    #[tokio::test]
    async fn remove_and_clear_notify_with_none() {
        let area = MemoryArea::new(AreaKind::Local);
        let mut rx = area.subscribe();
        area.set(items(&[("a", json!(1))]), WriteOrigin::User)
            .await
            .unwrap();
        rx.recv().await.unwrap();

        area.remove(&["a", "missing"], WriteOrigin::User)
            .await
            .unwrap();
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.changes.len(), 1);
        assert_eq!(batch.changes["a"], None);
        assert_eq!(area.get_one("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn notifications_carry_origin() {
        let area = MemoryArea::new(AreaKind::Sync);
        let mut rx = area.subscribe();
        area.set(items(&[("k", json!(1))]), WriteOrigin::Mirror)
            .await
            .unwrap();
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.origin, WriteOrigin::Mirror);
        assert_eq!(batch.area, AreaKind::Sync);
    }

    #[tokio::test]
    async fn quota_exceeded_leaves_area_untouched_and_silent() {
        let area = MemoryArea::with_quota(
            AreaKind::Sync,
            AreaQuota {
                max_item_bytes: Some(16),
                max_total_bytes: None,
            },
        );
        let mut rx = area.subscribe();
        let err = area
            .set(
                items(&[("big", json!("x".repeat(100)))]),
                WriteOrigin::User,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(area.get_one("big").await.unwrap(), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bytes_in_use_sums_entries() {
        let area = MemoryArea::new(AreaKind::Local);
        area.set(items(&[("a", json!(1)), ("bb", json!(22))]), WriteOrigin::User)
            .await
            .unwrap();
        let total = area.bytes_in_use(None).await.unwrap();
        let partial = area.bytes_in_use(Some(&["a"])).await.unwrap();
        assert!(total > partial);
        assert_eq!(partial, 1 + "1".len() as u64);
    }
}
