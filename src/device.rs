//! Per-profile device identity.
//!
//! Generated once, persisted in the profile directory (never in either
//! storage area, so it does not replicate), and used solely to stamp
//! `lastModifiedBy` on saved documents. It is provenance for debugging, not
//! a merge key.

use std::fs;
use std::path::Path;

use chrono::Utc;

/// Profile-local file the identity lives in
pub const DEVICE_ID_FILE: &str = "dashboardDeviceId";

/// Load the persisted device id, creating and persisting one if absent.
///
/// When the profile directory cannot be written, a freshly generated id is
/// still returned; it just will not survive the session.
pub fn load_or_create(profile_dir: &Path) -> String {
    let path = profile_dir.join(DEVICE_ID_FILE);

    if let Ok(existing) = fs::read_to_string(&path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return existing.to_string();
        }
    }

    let id = generate();
    let persisted = fs::create_dir_all(profile_dir).and_then(|_| fs::write(&path, &id));
    if let Err(e) = persisted {
        log::warn!("could not persist device id ({}); using ephemeral id", e);
    }
    id
}

/// `device_<hostname>-<base36 millis><random>`
fn generate() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    format!(
        "device_{}-{}{:08x}",
        host,
        to_base36(millis),
        rand::random::<u32>()
    )
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
