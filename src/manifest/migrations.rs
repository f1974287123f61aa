//! Forward-only manifest migrations.
//!
//! Manifests are migrated as raw JSON before typed deserialization, so fields this
//! binary does not know about survive untouched.

use serde_json::{Map, Value};

/// The schema version that the current binary writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Oldest schema version that can still be migrated.
pub const MIN_SCHEMA_VERSION: u32 = 1;

/// Why a manifest could not be brought to the current version.
#[derive(Debug, PartialEq, Eq)]
pub enum MigrationError {
    MissingVersion,
    TooOld(u32),
    TooNew(u32),
    Malformed(String),
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVersion => f.write_str("schema_version is missing or not an integer"),
            Self::TooOld(v) => write!(
                f,
                "schema_version {v} is older than the oldest supported ({MIN_SCHEMA_VERSION})"
            ),
            Self::TooNew(v) => write!(
                f,
                "schema_version {v} is newer than supported ({CURRENT_SCHEMA_VERSION}); upgrade ctxvault"
            ),
            Self::Malformed(msg) => f.write_str(msg),
        }
    }
}

/// Read the schema version from a raw manifest object.
pub fn schema_version(raw: &Map<String, Value>) -> Result<u32, MigrationError> {
    raw.get("schema_version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or(MigrationError::MissingVersion)
}

/// Run pending migrations in place. Returns the version the manifest started at.
pub fn run_migrations(raw: &mut Map<String, Value>) -> Result<u32, MigrationError> {
    let start = schema_version(raw)?;
    if start > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::TooNew(start));
    }
    if start < MIN_SCHEMA_VERSION {
        return Err(MigrationError::TooOld(start));
    }

    let mut version = start;
    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "migrating manifest");

        match next {
            2 => migrate_v1_to_v2(raw)?,
            _ => return Err(MigrationError::Malformed(format!("no migration to v{next}"))),
        }

        raw.insert("schema_version".into(), Value::from(next));
        version = next;
    }

    Ok(start)
}

/// Migration v1 → v2: `counters` became `id_counters`, and adapters changed from
/// a list of `{"name": ..}` objects to a list of names.
fn migrate_v1_to_v2(raw: &mut Map<String, Value>) -> Result<(), MigrationError> {
    if let Some(counters) = raw.remove("counters") {
        if !counters.is_object() {
            return Err(MigrationError::Malformed("counters must be an object".into()));
        }
        raw.entry("id_counters").or_insert(counters);
    }

    if let Some(Value::Array(adapters)) = raw.get_mut("adapters") {
        for adapter in adapters.iter_mut() {
            if let Some(name) = adapter.get("name").and_then(Value::as_str) {
                *adapter = Value::from(name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn v1_upgrades_to_current() {
        let mut raw = object(json!({
            "schema_version": 1,
            "project_name": "demo",
            "counters": {"decision": 4},
            "adapters": [{"name": "cursor"}, {"name": "claude"}],
            "team": "platform"
        }));

        let start = run_migrations(&mut raw).unwrap();

        assert_eq!(start, 1);
        assert_eq!(schema_version(&raw).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(raw["id_counters"], json!({"decision": 4}));
        assert_eq!(raw["adapters"], json!(["cursor", "claude"]));
        assert_eq!(raw["team"], json!("platform"));
        assert!(!raw.contains_key("counters"));
    }

    #[test]
    fn current_version_is_untouched() {
        let original = object(json!({"schema_version": CURRENT_SCHEMA_VERSION, "project_name": "x"}));
        let mut raw = original.clone();
        run_migrations(&mut raw).unwrap();
        assert_eq!(raw, original);
    }

    #[test]
    fn newer_version_fails_closed() {
        let mut raw = object(json!({"schema_version": CURRENT_SCHEMA_VERSION + 1}));
        assert_eq!(
            run_migrations(&mut raw),
            Err(MigrationError::TooNew(CURRENT_SCHEMA_VERSION + 1))
        );
    }

    #[test]
    fn missing_version_is_rejected() {
        let mut raw = object(json!({"project_name": "x"}));
        assert_eq!(run_migrations(&mut raw), Err(MigrationError::MissingVersion));
        let mut raw = object(json!({"schema_version": 0}));
        assert_eq!(run_migrations(&mut raw), Err(MigrationError::TooOld(0)));
    }
}
