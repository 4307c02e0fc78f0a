//! Key-value backend adapter: a uniform async contract over the two storage
//! areas ("sync" — small quota, replicated across devices; "local" — large
//! quota, device-only).

mod file;
mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use file::FileArea;
pub use memory::MemoryArea;

/// Key used by the legacy extension to tag mirror-originated write batches.
/// Never written by this crate; pre-existing data may still contain it, so
/// whole-area reads treat it as noise.
pub const LEGACY_MIRROR_FLAG: &str = "__mirror_op__";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Quota exceeded: {used} of {limit} bytes")]
    QuotaExceeded { used: u64, limit: u64 },

    #[error("Storage area unavailable")]
    Unavailable,

    #[error("Profile directory not found")]
    ProfileDirNotFound,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Which of the two storage areas a backend represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaKind {
    /// Small quota, replicated across devices by the host
    Sync,
    /// Large quota, this device only
    Local,
}

impl AreaKind {
    /// The area writes are mirrored into
    pub fn other(self) -> AreaKind {
        match self {
            AreaKind::Sync => AreaKind::Local,
            AreaKind::Local => AreaKind::Sync,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AreaKind::Sync => "sync",
            AreaKind::Local => "local",
        }
    }
}

/// Provenance of a write, carried on every change notification so the mirror
/// can tell its own echoes from user writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A write issued by the application (facade, recovery, caller)
    User,
    /// A write issued by the change mirror; never propagated again
    Mirror,
}

/// One write batch as observed on an area's notification channel.
/// `changes` maps each affected key to its new value, `None` meaning removed.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub area: AreaKind,
    pub origin: WriteOrigin,
    pub changes: HashMap<String, Option<Value>>,
}

/// Practical write limits of an area. The sync-class backend enforces both a
/// per-item and a total cap; the local-class backend is effectively unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct AreaQuota {
    pub max_item_bytes: Option<u64>,
    pub max_total_bytes: Option<u64>,
}

impl AreaQuota {
    /// Limits of the replicated sync-class backend
    pub fn sync_class() -> Self {
        Self {
            max_item_bytes: Some(8192),
            max_total_bytes: Some(102_400),
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }
}

/// Estimated stored size of one entry: serialized key plus serialized value
pub(crate) fn entry_size(key: &str, value: &Value) -> u64 {
    let value_len = serde_json::to_string(value).map_or(0, |s| s.len());
    (key.len() + value_len) as u64
}

/// Check an incoming write against the quota, given the entries the area
/// would hold afterwards.
pub(crate) fn check_quota(
    quota: &AreaQuota,
    resulting: &HashMap<String, Value>,
    incoming: &HashMap<String, Value>,
) -> Result<()> {
    if let Some(limit) = quota.max_item_bytes {
        for (key, value) in incoming {
            let used = entry_size(key, value);
            if used > limit {
                return Err(StorageError::QuotaExceeded { used, limit });
            }
        }
    }
    if let Some(limit) = quota.max_total_bytes {
        let used: u64 = resulting.iter().map(|(k, v)| entry_size(k, v)).sum();
        if used > limit {
            return Err(StorageError::QuotaExceeded { used, limit });
        }
    }
    Ok(())
}

/// Uniform contract over one storage area.
///
/// The dynamic `get(keys)` shape of the original backend is split into four
/// explicitly-typed reads. Every write carries a [`WriteOrigin`] and, on
/// success, publishes a [`ChangeBatch`] on the area's notification channel.
#[async_trait]
pub trait StorageArea: Send + Sync {
    fn kind(&self) -> AreaKind;

    /// Read a single key
    async fn get_one(&self, key: &str) -> Result<Option<Value>>;

    /// Read several keys; absent keys are omitted from the result
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Read every entry in the area
    async fn get_all(&self) -> Result<HashMap<String, Value>>;

    /// Read the given keys, substituting the supplied default for any absent
    /// key
    async fn get_with_defaults(
        &self,
        defaults: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>>;

    /// Write a batch of entries
    async fn set(&self, items: HashMap<String, Value>, origin: WriteOrigin) -> Result<()>;

    /// Remove the given keys
    async fn remove(&self, keys: &[&str], origin: WriteOrigin) -> Result<()>;

    /// Remove every entry in the area
    async fn clear(&self, origin: WriteOrigin) -> Result<()>;

    /// Estimated bytes used by the given keys, or by the whole area when
    /// `keys` is `None`. Diagnostic only; not consulted on the write path.
    async fn bytes_in_use(&self, keys: Option<&[&str]>) -> Result<u64>;

    /// Subscribe to this area's change notifications
    fn subscribe(&self) -> broadcast::Receiver<ChangeBatch>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_size_counts_key_and_value() {
        let v = json!({"a": 1});
        assert_eq!(entry_size("k", &v), 1 + v.to_string().len() as u64);
    }

    #[test]
    fn quota_rejects_oversized_item() {
        let quota = AreaQuota {
            max_item_bytes: Some(8),
            max_total_bytes: None,
        };
        let mut incoming = HashMap::new();
        incoming.insert("key".to_string(), json!("long enough value"));
        let err = check_quota(&quota, &incoming, &incoming).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
    }

    #[test]
    fn quota_rejects_total_overflow() {
        let quota = AreaQuota {
            max_item_bytes: None,
            max_total_bytes: Some(10),
        };
        let mut resulting = HashMap::new();
        resulting.insert("a".to_string(), json!("12345"));
        resulting.insert("b".to_string(), json!("12345"));
        let mut incoming = HashMap::new();
        incoming.insert("b".to_string(), json!("12345"));
        assert!(check_quota(&quota, &resulting, &incoming).is_err());
    }

    #[test]
    fn unlimited_quota_accepts_anything() {
        let mut incoming = HashMap::new();
        incoming.insert("k".to_string(), json!("x".repeat(1_000_000)));
        assert!(check_quota(&AreaQuota::unlimited(), &incoming, &incoming).is_ok());
    }
}
