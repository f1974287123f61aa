//! Agent-tool adapters: write the MCP client configuration each tool reads, and
//! record registrations in the manifest.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{Result, StoreError};
use crate::fsio;
use crate::manifest::Manifest;
use crate::store::ContextStore;

/// How an agent tool should launch the context server.
#[derive(Debug, Clone)]
pub struct ServerLaunch {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ServerLaunch {
    fn default() -> Self {
        Self {
            command: "ctxvault".into(),
            args: vec!["serve".into()],
        }
    }
}

/// Name under which the server is registered in client configs.
pub const SERVER_NAME: &str = "ctxvault";

pub trait AgentAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the project shows signs of this tool being used.
    fn detect(&self, project_dir: &Path) -> bool;

    /// Project-level MCP configuration file for this tool.
    fn config_path(&self, project_dir: &Path) -> PathBuf;

    /// Top-level key holding the server table.
    fn servers_key(&self) -> &'static str {
        "mcpServers"
    }

    fn server_entry(&self, launch: &ServerLaunch) -> Value {
        json!({ "command": launch.command, "args": launch.args })
    }

    /// Add (or replace) the server entry, preserving everything else in the file.
    fn write_config(&self, project_dir: &Path, launch: &ServerLaunch) -> Result<PathBuf> {
        let path = self.config_path(project_dir);
        let mut root = match fsio::read_optional(&path)? {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                serde_json::from_slice::<Value>(&bytes)?
            }
            _ => Value::Object(Map::new()),
        };
        let Value::Object(root_map) = &mut root else {
            return Err(StoreError::io(
                &path,
                std::io::Error::other("config file is not a JSON object"),
            ));
        };

        let servers = root_map
            .entry(self.servers_key())
            .or_insert_with(|| Value::Object(Map::new()));
        if !servers.is_object() {
            *servers = Value::Object(Map::new());
        }
        if let Value::Object(servers) = servers {
            servers.insert(SERVER_NAME.to_string(), self.server_entry(launch));
        }

        let mut bytes = serde_json::to_vec_pretty(&root)?;
        bytes.push(b'\n');
        fsio::write_atomic(&path, &bytes)?;
        Ok(path)
    }
}

pub struct Claude;
pub struct Cursor;
pub struct VsCode;
pub struct Windsurf;

impl AgentAdapter for Claude {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn detect(&self, project_dir: &Path) -> bool {
        project_dir.join(".claude").is_dir()
            || project_dir.join("CLAUDE.md").is_file()
            || project_dir.join(".mcp.json").is_file()
    }

    fn config_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(".mcp.json")
    }
}

impl AgentAdapter for Cursor {
    fn name(&self) -> &'static str {
        "cursor"
    }

    fn detect(&self, project_dir: &Path) -> bool {
        project_dir.join(".cursor").is_dir() || project_dir.join(".cursorrules").is_file()
    }

    fn config_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(".cursor").join("mcp.json")
    }
}

impl AgentAdapter for VsCode {
    fn name(&self) -> &'static str {
        "vscode"
    }

    fn detect(&self, project_dir: &Path) -> bool {
        project_dir.join(".vscode").is_dir()
    }

    fn config_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(".vscode").join("mcp.json")
    }

    fn servers_key(&self) -> &'static str {
        "servers"
    }

    fn server_entry(&self, launch: &ServerLaunch) -> Value {
        json!({ "type": "stdio", "command": launch.command, "args": launch.args })
    }
}

impl AgentAdapter for Windsurf {
    fn name(&self) -> &'static str {
        "windsurf"
    }

    fn detect(&self, project_dir: &Path) -> bool {
        project_dir.join(".windsurf").is_dir() || project_dir.join(".windsurfrules").is_file()
    }

    fn config_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(".windsurf").join("mcp_config.json")
    }
}

pub fn all_adapters() -> Vec<Box<dyn AgentAdapter>> {
    vec![
        Box::new(Claude),
        Box::new(Cursor),
        Box::new(VsCode),
        Box::new(Windsurf),
    ]
}

pub fn adapter_by_name(name: &str) -> Option<Box<dyn AgentAdapter>> {
    let name = name.to_ascii_lowercase();
    all_adapters().into_iter().find(|a| a.name() == name)
}

/// One written client configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub adapter: String,
    pub config_path: PathBuf,
}

/// Write client configs for the named adapters (plus detected ones when
/// `detect` is set) and record them in the manifest.
pub fn register(
    store: &ContextStore,
    project_dir: &Path,
    names: &[String],
    detect: bool,
    launch: &ServerLaunch,
) -> Result<Vec<Registration>> {
    let mut selected: Vec<Box<dyn AgentAdapter>> = Vec::new();
    for name in names {
        let adapter =
            adapter_by_name(name).ok_or_else(|| StoreError::UnknownAdapter(name.clone()))?;
        selected.push(adapter);
    }
    if detect {
        for adapter in all_adapters() {
            if adapter.detect(project_dir) && !selected.iter().any(|s| s.name() == adapter.name()) {
                selected.push(adapter);
            }
        }
    }

    let guard = store.lock()?;
    let mut registrations = Vec::new();
    for adapter in &selected {
        let config_path = adapter.write_config(project_dir, launch)?;
        tracing::info!(adapter = adapter.name(), path = %config_path.display(), "adapter registered");
        registrations.push(Registration {
            adapter: adapter.name().to_string(),
            config_path,
        });
    }

    Manifest::mutate(store.root(), &guard, |m| {
        m.adapters
            .extend(selected.iter().map(|a| a.name().to_string()));
    })?;
    Ok(registrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreOptions;
    use tempfile::TempDir;

    #[test]
    fn write_config_preserves_other_servers() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(".mcp.json"),
            r#"{"mcpServers": {"other": {"command": "x"}}, "extra": 1}"#,
        )
        .unwrap();

        Claude.write_config(tmp.path(), &ServerLaunch::default()).unwrap();

        let value: Value =
            serde_json::from_slice(&std::fs::read(tmp.path().join(".mcp.json")).unwrap()).unwrap();
        assert_eq!(value["mcpServers"]["other"]["command"], "x");
        assert_eq!(value["mcpServers"]["ctxvault"]["args"], json!(["serve"]));
        assert_eq!(value["extra"], 1);
    }

    #[test]
    fn vscode_uses_servers_key() {
        let tmp = TempDir::new().unwrap();
        let path = VsCode.write_config(tmp.path(), &ServerLaunch::default()).unwrap();
        let value: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(value["servers"]["ctxvault"]["type"], "stdio");
    }

    #[test]
    fn register_records_names_in_manifest() {
        let project = TempDir::new().unwrap();
        std::fs::create_dir(project.path().join(".cursor")).unwrap();
        let store_dir = project.path().join(".ctxvault");
        let store = ContextStore::init(&store_dir, "demo", StoreOptions::default()).unwrap();

        let regs = register(
            &store,
            project.path(),
            &["claude".to_string()],
            true,
            &ServerLaunch::default(),
        )
        .unwrap();

        let names: Vec<&str> = regs.iter().map(|r| r.adapter.as_str()).collect();
        assert_eq!(names, vec!["claude", "cursor"]);
        let manifest = store.manifest().unwrap();
        assert!(manifest.adapters.contains("claude") && manifest.adapters.contains("cursor"));
        assert!(project.path().join(".cursor/mcp.json").is_file());
    }

    #[test]
    fn unknown_adapter_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = ContextStore::init(tmp.path(), "demo", StoreOptions::default()).unwrap();
        let err = register(&store, tmp.path(), &["emacs".into()], false, &ServerLaunch::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownAdapter(_)));
    }
}
