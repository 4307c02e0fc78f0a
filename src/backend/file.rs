//! File-backed storage area.
//!
//! Each area persists as one JSON object file under the profile directory, so
//! the two areas are namespaced by file rather than by key prefix. Every
//! write re-reads and rewrites the file whole; the containing mutex keeps
//! read-modify-write cycles from interleaving within this process.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{
    check_quota, entry_size, AreaKind, AreaQuota, ChangeBatch, Result, StorageArea, WriteOrigin,
};

const EVENT_CAPACITY: usize = 64;

pub struct FileArea {
    kind: AreaKind,
    path: PathBuf,
    quota: AreaQuota,
    io_lock: Mutex<()>,
    events: broadcast::Sender<ChangeBatch>,
}

impl FileArea {
    pub fn new(kind: AreaKind, path: PathBuf) -> Self {
        Self::with_quota(kind, path, AreaQuota::unlimited())
    }

    pub fn with_quota(kind: AreaKind, path: PathBuf, quota: AreaQuota) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            kind,
            path,
            quota,
            io_lock: Mutex::new(()),
            events,
        }
    }

    /// Read the backing file. A missing file is an empty area; an unparsable
    /// file is treated the same (absence, not corruption).
    fn read_entries(&self) -> Result<HashMap<String, Value>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                log::warn!(
                    "{} area file {:?} is unreadable ({}); treating as empty",
                    self.kind.as_str(),
                    self.path,
                    e
                );
                Ok(HashMap::new())
            }
        }
    }

    fn write_entries(&self, entries: &HashMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn publish(&self, origin: WriteOrigin, changes: HashMap<String, Option<Value>>) {
        if changes.is_empty() {
            return;
        }
        let _ = self.events.send(ChangeBatch {
            area: self.kind,
            origin,
            changes,
        });
    }
}

#[async_trait]
impl StorageArea for FileArea {
    fn kind(&self) -> AreaKind {
        self.kind
    }

    async fn get_one(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.io_lock.lock().unwrap();
        Ok(self.read_entries()?.remove(key))
    }

    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let _guard = self.io_lock.lock().unwrap();
        let mut entries = self.read_entries()?;
        Ok(keys
            .iter()
            .filter_map(|k| entries.remove(*k).map(|v| (k.to_string(), v)))
            .collect())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        let _guard = self.io_lock.lock().unwrap();
        self.read_entries()
    }

    async fn get_with_defaults(
        &self,
        defaults: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>> {
        let _guard = self.io_lock.lock().unwrap();
        let mut entries = self.read_entries()?;
        Ok(defaults
            .iter()
            .map(|(k, d)| {
                let value = entries.remove(k).unwrap_or_else(|| d.clone());
                (k.clone(), value)
            })
            .collect())
    }

    async fn set(&self, items: HashMap<String, Value>, origin: WriteOrigin) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        {
            let _guard = self.io_lock.lock().unwrap();
            let mut resulting = self.read_entries()?;
            for (k, v) in &items {
                resulting.insert(k.clone(), v.clone());
            }
            check_quota(&self.quota, &resulting, &items)?;
            self.write_entries(&resulting)?;
        }
        let changes = items.into_iter().map(|(k, v)| (k, Some(v))).collect();
        self.publish(origin, changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str], origin: WriteOrigin) -> Result<()> {
        let mut changes = HashMap::new();
        {
            let _guard = self.io_lock.lock().unwrap();
            let mut entries = self.read_entries()?;
            for key in keys {
                if entries.remove(*key).is_some() {
                    changes.insert(key.to_string(), None);
                }
            }
            if !changes.is_empty() {
                self.write_entries(&entries)?;
            }
        }
        self.publish(origin, changes);
        Ok(())
    }

    async fn clear(&self, origin: WriteOrigin) -> Result<()> {
        let removed: Vec<String> = {
            let _guard = self.io_lock.lock().unwrap();
            let entries = self.read_entries()?;
            let keys: Vec<String> = entries.keys().cloned().collect();
            if !keys.is_empty() {
                self.write_entries(&HashMap::new())?;
            }
            keys
        };
        let changes = removed.into_iter().map(|k| (k, None)).collect();
        self.publish(origin, changes);
        Ok(())
    }

    async fn bytes_in_use(&self, keys: Option<&[&str]>) -> Result<u64> {
        let _guard = self.io_lock.lock().unwrap();
        let entries = self.read_entries()?;
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
