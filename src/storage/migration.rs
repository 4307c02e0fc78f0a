//! Schema migration for the two persisted documents.
//!
//! Runs on raw JSON, before any typed decode, so documents written by older
//! versions (or edited by hand) are healed rather than rejected. Both
//! routines are idempotent: a second pass over a migrated document changes
//! nothing.

use serde_json::{Map, Value};

use super::models::DashboardSettings;

/// Current schema version, stamped onto both documents on load and save
pub const SCHEMA_VERSION: &str = "0.0.7";

/// Heal a dashboard-data document in place.
///
/// Returns `false` when the value does not carry a `cards` array, in which
/// case it is unusable and the caller treats it as a miss. Otherwise ensures
/// every link has a `subLinks` array and stamps the current schema version —
/// but only when something actually needed fixing.
pub fn migrate_data(data: &mut Value) -> bool {
    let obj = match data.as_object_mut() {
        Some(obj) => obj,
        None => return false,
    };
    if !obj.get("cards").map_or(false, Value::is_array) {
        return false;
    }

    let mut needs_migration = obj
        .get("version")
        .and_then(Value::as_str)
        .map_or(true, |v| v != SCHEMA_VERSION);

    if let Some(cards) = obj.get_mut("cards").and_then(Value::as_array_mut) {
        for card in cards {
            let links = match card.get_mut("links").and_then(Value::as_array_mut) {
                Some(links) => links,
                None => continue,
            };
            for link in links {
                if let Some(link) = link.as_object_mut() {
                    if !link.get("subLinks").map_or(false, Value::is_array) {
                        link.insert("subLinks".to_string(), Value::Array(Vec::new()));
                        needs_migration = true;
                    }
                }
            }
        }
    }

    if needs_migration {
        obj.insert(
            "version".to_string(),
            Value::String(SCHEMA_VERSION.to_string()),
        );
    }
    true
}

/// Merge a settings document against the defaults.
///
/// A non-object input yields a fresh defaults copy. Otherwise every default
/// key absent from the input is copied in and the version is stamped when
/// absent or stale. Keys unknown to the defaults are kept as they are.
pub fn migrate_settings(settings: Value) -> Value {
    let defaults = default_settings_value();
    let mut obj = match settings {
        Value::Object(obj) => obj,
        _ => return Value::Object(defaults),
    };

    for (key, value) in defaults {
        if !obj.contains_key(&key) {
            obj.insert(key, value);
        }
    }

    let version_current = obj
        .get("version")
        .and_then(Value::as_str)
        .map_or(false, |v| v == SCHEMA_VERSION);
    if !version_current {
        obj.insert(
            "version".to_string(),
            Value::String(SCHEMA_VERSION.to_string()),
        );
    }

    Value::Object(obj)
}

fn default_settings_value() -> Map<String, Value> {
    match serde_json::to_value(DashboardSettings::default()) {
        Ok(Value::Object(map)) => map,
        // Defaults are a plain struct of scalars; this arm is unreachable
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_document_without_cards() {
        assert!(!migrate_data(&mut json!(null)));
        assert!(!migrate_data(&mut json!("string")));
        assert!(!migrate_data(&mut json!({"version": SCHEMA_VERSION})));
        assert!(!migrate_data(&mut json!({"cards": "not-an-array"})));
    }

    #[test]
    fn backfills_missing_sublinks() {
        let mut data = json!({
            "version": SCHEMA_VERSION,
            "cards": [{
                "id": "c1",
                "links": [
                    {"id": "l1"},
                    {"id": "l2", "subLinks": "bogus"},
                    {"id": "l3", "subLinks": [{"id": "s1"}]}
                ]
            }]
        });
        assert!(migrate_data(&mut data));

        let links = &data["cards"][0]["links"];
        assert_eq!(links[0]["subLinks"], json!([]));
        assert_eq!(links[1]["subLinks"], json!([]));
        assert_eq!(links[2]["subLinks"], json!([{"id": "s1"}]));
    }

    #[test]
    fn stale_version_is_restamped() {
        let mut data = json!({"version": "0.0.1", "cards": []});
        assert!(migrate_data(&mut data));
        assert_eq!(data["version"], json!(SCHEMA_VERSION));
    }

    #[test]
    fn migration_is_idempotent() {
        let mut data = json!({
            "cards": [{"id": "c1", "links": [{"id": "l1"}]}]
        });
        assert!(migrate_data(&mut data));
        let first = data.to_string();

        assert!(migrate_data(&mut data));
        let second = data.to_string();

        assert_eq!(first, second);
    }

    #[test]
    fn current_document_is_untouched() {
        let mut data = json!({
            "version": SCHEMA_VERSION,
            "lastModified": 12345,
            "cards": [{"id": "c1", "links": [{"id": "l1", "subLinks": []}]}]
        });
        let before = data.to_string();
        assert!(migrate_data(&mut data));
        assert_eq!(data.to_string(), before);
    }

    #[test]
    fn non_object_settings_become_defaults() {
        let migrated = migrate_settings(json!(null));
        assert_eq!(migrated["version"], json!(SCHEMA_VERSION));
        assert_eq!(migrated["theme"], json!("light"));
        assert_eq!(migrated["cardWidth"], json!("sm"));
        assert_eq!(migrated["containerMargin"], json!("medium"));
        assert_eq!(migrated["iconStrokeWidth"], json!(1.0));
    }

    #[test]
    fn missing_settings_keys_are_backfilled() {
        let migrated = migrate_settings(json!({"theme": "dark", "custom": 7}));
        assert_eq!(migrated["theme"], json!("dark"));
        assert_eq!(migrated["uniformCardHeight"], json!(false));
        assert_eq!(migrated["gridColumns"], json!("auto"));
        // Unknown keys survive the merge
        assert_eq!(migrated["custom"], json!(7));
        assert_eq!(migrated["version"], json!(SCHEMA_VERSION));
    }

    #[test]
    fn settings_migration_is_idempotent() {
        let once = migrate_settings(json!({"theme": "dark"}));
        let twice = migrate_settings(once.clone());
        assert_eq!(once, twice);
    }
}
