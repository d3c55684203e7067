//! Schema versioning for stored payloads.
//!
//! Every payload written to the local cache or the remote store is tagged with the collection's
//! current schema version. When reading, a payload tagged with any other version is treated as
//! absent, unless the migration table knows how to upgrade it. Bumping the version therefore
//! invalidates every stored copy, on every client, the next time they load.

use std::{collections::BTreeMap, rc::Rc};

use chrono::{DateTime, Utc};
use serde_json::Value;

/// The shape of a collection's subtree root in the remote store.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioned<T> {
    pub version: u32,
    #[serde(default)]
    pub payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> Versioned<T> {
    pub fn new(version: u32, payload: T, last_updated: DateTime<Utc>) -> Self {
        Self {
            version,
            payload,
            last_updated: Some(last_updated),
        }
    }
}

/// Upgrades a payload stored at an old version into the current version's shape.
/// Returning `None` discards it.
pub type Migration = Rc<dyn Fn(Value) -> Option<Value>>;

/// The version check every stored payload passes through, plus a table of migrations from older versions.
///
/// The table is empty today, so anything not at the current version is discarded.
#[derive(Clone)]
pub struct SchemaGate {
    current: u32,
    migrations: BTreeMap<u32, Migration>,
}

impl SchemaGate {
    pub fn new(current: u32) -> Self {
        Self {
            current,
            migrations: BTreeMap::new(),
        }
    }

    /// Registers an upgrade from payloads stored at `from` straight to the current version.
    pub fn with_migration(
        mut self,
        from: u32,
        migrate: impl Fn(Value) -> Option<Value> + 'static,
    ) -> Self {
        if from == self.current {
            log::warn!("Ignoring migration from the current schema version {from}");
            return self;
        }
        self.migrations.insert(from, Rc::new(migrate));
        self
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    /// Returns the payload in the current version's shape, or `None` if it must be discarded.
    pub fn admit(&self, version: Option<u32>, payload: Value) -> Option<Value> {
        let Some(version) = version else {
            log::info!("Discarding payload without a schema version tag");
            return None;
        };

        if version == self.current {
            return Some(payload);
        }

        match self.migrations.get(&version) {
            Some(migrate) => {
                let migrated = migrate(payload);
                if migrated.is_some() {
                    log::info!("Migrated payload from schema version {version} to {}", self.current);
                } else {
                    log::info!("Migration from schema version {version} discarded the payload");
                }
                migrated
            }
            None => {
                log::info!(
                    "Discarding payload stored at schema version {version} (current is {})",
                    self.current
                );
                None
            }
        }
    }

    /// Unwraps a remote subtree root (`{version, payload, lastUpdated}`).
    pub fn open_envelope(&self, snapshot: Option<Value>) -> Option<Value> {
        let snapshot = snapshot?;
        let envelope: Versioned<Value> = serde_json::from_value(snapshot)
            .inspect_err(|e| log::info!("Remote snapshot has no usable version envelope: {e}"))
            .ok()?;
        self.admit(Some(envelope.version), envelope.payload)
    }

    /// Parses a version tag as stored next to a cached payload.
    pub fn parse_tag(tag: Option<&str>) -> Option<u32> {
        let tag = tag?;
        tag.trim()
            .parse()
            .inspect_err(|e| log::error!("Malformed schema version tag {tag:?}: {e}"))
            .ok()
    }
}

impl std::fmt::Debug for SchemaGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaGate")
            .field("current", &self.current)
            .field("migrations_from", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_the_current_version_is_admitted() {
        let gate = SchemaGate::new(3);
        assert_eq!(gate.admit(Some(3), json!([1])), Some(json!([1])));
        assert_eq!(gate.admit(Some(2), json!([1])), None);
        assert_eq!(gate.admit(Some(4), json!([1])), None);
        assert_eq!(gate.admit(None, json!([1])), None);
    }

    #[test]
    fn migrations_upgrade_old_payloads() {
        let gate = SchemaGate::new(2).with_migration(1, |payload| Some(json!({ "days": payload })));
        assert_eq!(gate.admit(Some(1), json!([])), Some(json!({"days": []})));
        // no entry for version 0
        assert_eq!(gate.admit(Some(0), json!([])), None);
    }

    #[test]
    fn envelopes_are_unwrapped_and_checked() {
        let gate = SchemaGate::new(3);

        let current = json!({"version": 3, "payload": {"a": 1}, "lastUpdated": "2026-01-01T00:00:00Z"});
        assert_eq!(gate.open_envelope(Some(current)), Some(json!({"a": 1})));

        let stale = json!({"version": 2, "payload": {"a": 1}});
        assert_eq!(gate.open_envelope(Some(stale)), None);

        // a legacy subtree that was never wrapped
        let unwrapped = json!({"d1-100": {"completed": true}});
        assert_eq!(gate.open_envelope(Some(unwrapped)), None);

        assert_eq!(gate.open_envelope(None), None);

        // an empty collection vanishes from the tree, leaving only the tag
        let empty = json!({"version": 3});
        assert_eq!(gate.open_envelope(Some(empty)), Some(Value::Null));
    }

    #[test]
    fn version_tags_parse_from_strings() {
        assert_eq!(SchemaGate::parse_tag(Some("3")), Some(3));
        assert_eq!(SchemaGate::parse_tag(Some(" 3\n")), Some(3));
        assert_eq!(SchemaGate::parse_tag(Some("three")), None);
        assert_eq!(SchemaGate::parse_tag(None), None);
    }

    #[test]
    fn envelope_round_trips_camel_case() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let envelope = Versioned::new(1, json!({}), at);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["version"], json!(1));
        assert_eq!(value["payload"], json!({}));
        assert!(value["lastUpdated"].is_string());

        let back: Versioned<Value> = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }
}
