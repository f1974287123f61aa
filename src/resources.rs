//! Read-only `context://` resource surface.
//!
//! `context://knowledge[/<key>]`, `context://decisions[/<id>]`,
//! `context://skills[/<name>]`, `context://manifest`, and `context://onboarding`
//! resolve to JSON values.

use serde_json::{json, Value};

use crate::error::{Result, StoreError};
use crate::session;
use crate::store::types::EntryKind;
use crate::store::ContextStore;

pub const SCHEME: &str = "context://";

/// Static resources, as `(uri, description)`.
pub const RESOURCES: [(&str, &str); 5] = [
    ("context://knowledge", "All knowledge notes"),
    ("context://decisions", "All architecture decision records"),
    ("context://skills", "All skill definitions"),
    ("context://manifest", "Project manifest"),
    ("context://onboarding", "Onboarding summary for a new session"),
];

/// Limits used by `context://onboarding`.
#[derive(Debug, Clone, Copy)]
pub struct OnboardingLimits {
    pub recent_items: usize,
    pub recent_syncs: usize,
}

impl Default for OnboardingLimits {
    fn default() -> Self {
        Self {
            recent_items: 10,
            recent_syncs: 5,
        }
    }
}

pub fn read_resource(store: &ContextStore, uri: &str, limits: OnboardingLimits) -> Result<Value> {
    let unknown = || StoreError::UnknownResource(uri.to_string());
    let rest = uri.strip_prefix(SCHEME).ok_or_else(unknown)?;
    let (collection, item) = match rest.split_once('/') {
        Some((collection, item)) if !item.is_empty() => (collection, Some(item)),
        Some((collection, _)) => (collection, None),
        None => (rest, None),
    };

    match (collection, item) {
        ("manifest", None) => {
            let manifest = store.manifest()?;
            let mut value = serde_json::to_value(&manifest)?;
            if let Value::Object(map) = &mut value {
                map.insert("last_sync".into(), serde_json::to_value(&manifest.last_sync)?);
            }
            Ok(value)
        }
        ("onboarding", None) => Ok(serde_json::to_value(session::onboarding(
            store,
            limits.recent_items,
            limits.recent_syncs,
        )?)?),
        (collection, item) => {
            let kind = match collection {
                "knowledge" => EntryKind::Knowledge,
                "decisions" => EntryKind::Decision,
                "skills" => EntryKind::Skill,
                _ => return Err(unknown()),
            };
            match item {
                Some(id) => Ok(serde_json::to_value(store.read(kind, id)?)?),
                None => Ok(json!({
                    "kind": kind,
                    "entries": store.list(kind)?,
                })),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{EntryContent, KnowledgeContent};
    use crate::store::StoreOptions;
    use tempfile::TempDir;

    #[test]
    fn resolves_collections_items_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let store = ContextStore::init(tmp.path(), "demo", StoreOptions::default()).unwrap();
        store
            .create(EntryContent::Knowledge(KnowledgeContent {
                key: "architecture".into(),
                content: "Hexagonal".into(),
            }))
            .unwrap();
        let limits = OnboardingLimits::default();

        let list = read_resource(&store, "context://knowledge", limits).unwrap();
        assert_eq!(list["entries"].as_array().unwrap().len(), 1);

        let item = read_resource(&store, "context://knowledge/architecture", limits).unwrap();
        assert_eq!(item["content"]["content"], "Hexagonal");

        let manifest = read_resource(&store, "context://manifest", limits).unwrap();
        assert_eq!(manifest["project_name"], "demo");
        assert!(manifest["last_sync"].is_null());

        let onboarding = read_resource(&store, "context://onboarding", limits).unwrap();
        assert_eq!(onboarding["counts"]["knowledge"], 1);
    }

    #[test]
    fn unknown_uris_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = ContextStore::init(tmp.path(), "demo", StoreOptions::default()).unwrap();
        let limits = OnboardingLimits::default();

        for uri in ["file:///etc/passwd", "context://sessions", "context://manifest/x"] {
            assert!(matches!(
                read_resource(&store, uri, limits),
                Err(StoreError::UnknownResource(_))
            ));
        }
        assert!(matches!(
            read_resource(&store, "context://decisions/ADR-0001", limits),
            Err(StoreError::NotFound { .. })
        ));
    }
}
