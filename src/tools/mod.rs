pub mod add_knowledge;
pub mod add_skill;
pub mod end_session;
pub mod onboarding;
pub mod read_context;
pub mod record_decision;
pub mod remove_entry;
pub mod search;
pub mod sync;
pub mod update_knowledge;

use add_knowledge::AddKnowledgeParams;
use add_skill::AddSkillParams;
use end_session::EndSessionParams;
use onboarding::OnboardingParams;
use read_context::ReadContextParams;
use record_decision::RecordDecisionParams;
use remove_entry::RemoveEntryParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search::SearchParams;
use serde_json::json;
use std::sync::Arc;
use sync::SyncParams;
use update_knowledge::UpdateKnowledgeParams;

use ctxvault::config::CtxConfig;
use ctxvault::error::StoreError;
use ctxvault::resources::{self, OnboardingLimits};
use ctxvault::session;
use ctxvault::store::types::{
    DecisionContent, DecisionStatus, EntryContent, EntryKind, KnowledgeContent, SkillContent,
};
use ctxvault::store::ContextStore;
use ctxvault::sync::{CancelFlag, SyncEngine, SyncMode};

/// The ctxvault MCP tool handler. Holds the store, the sync engine, and config,
/// and exposes all MCP tools via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct CtxTools {
    tool_router: ToolRouter<Self>,
    store: Arc<ContextStore>,
    engine: Arc<SyncEngine>,
    config: Arc<CtxConfig>,
}

#[tool_router]
impl CtxTools {
    pub fn new(store: Arc<ContextStore>, engine: Arc<SyncEngine>, config: Arc<CtxConfig>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            store,
            engine,
            config,
        }
    }

    /// Add a knowledge note.
    #[tool(description = "Add a knowledge note under a unique key (e.g. 'architecture'). Fails if the key exists; use update_knowledge to change it.")]
    async fn add_knowledge(
        &self,
        Parameters(params): Parameters<AddKnowledgeParams>,
    ) -> Result<String, String> {
        tracing::info!(key = %params.key, content_len = params.content.len(), "add_knowledge called");
        let content = EntryContent::Knowledge(KnowledgeContent {
            key: params.key,
            content: params.content,
        });
        let entry = self.blocking(move |store| store.create(content)).await?;
        to_json(&entry)
    }

    /// Replace the body of an existing knowledge note.
    #[tool(description = "Replace the body of an existing knowledge note. The revision is incremented.")]
    async fn update_knowledge(
        &self,
        Parameters(params): Parameters<UpdateKnowledgeParams>,
    ) -> Result<String, String> {
        tracing::info!(key = %params.key, "update_knowledge called");
        let key = params.key.clone();
        let content = EntryContent::Knowledge(KnowledgeContent {
            key: params.key,
            content: params.content,
        });
        let entry = self
            .blocking(move |store| store.update(EntryKind::Knowledge, &key, content))
            .await?;
        to_json(&entry)
    }

    /// Record an architecture decision.
    #[tool(description = "Record an architecture decision (ADR). The id (ADR-NNNN) is allocated automatically.")]
    async fn record_decision(
        &self,
        Parameters(params): Parameters<RecordDecisionParams>,
    ) -> Result<String, String> {
        // 1. Validate inputs
        let status: DecisionStatus = match params.status.as_deref() {
            Some(s) => s.parse().map_err(|e: String| e)?,
            None => DecisionStatus::default(),
        };
        tracing::info!(title = %params.title, status = %status, "record_decision called");

        // 2. Allocate the id and write
        let content = EntryContent::Decision(DecisionContent {
            title: params.title,
            context: params.context,
            decision: params.decision,
            consequences: params.consequences,
            status,
        });
        let entry = self.blocking(move |store| store.create(content)).await?;

        tracing::info!(id = %entry.id, "decision recorded");
        to_json(&entry)
    }

    /// Add a reusable skill.
    #[tool(description = "Add a reusable skill: a named, described set of instructions agents can follow.")]
    async fn add_skill(
        &self,
        Parameters(params): Parameters<AddSkillParams>,
    ) -> Result<String, String> {
        tracing::info!(name = %params.name, "add_skill called");
        let content = EntryContent::Skill(SkillContent {
            name: params.name,
            description: params.description,
            instructions: params.instructions,
        });
        let entry = self.blocking(move |store| store.create(content)).await?;
        to_json(&entry)
    }

    /// Delete an entry of any kind.
    #[tool(description = "Remove a knowledge note, decision, or skill by kind and id.")]
    async fn remove_entry(
        &self,
        Parameters(params): Parameters<RemoveEntryParams>,
    ) -> Result<String, String> {
        let kind: EntryKind = params.kind.parse().map_err(|e: String| e)?;
        tracing::info!(kind = %kind, id = %params.id, "remove_entry called");

        let id = params.id.clone();
        self.blocking(move |store| store.delete(kind, &id)).await?;
        Ok(json!({ "removed": true, "kind": kind, "id": params.id }).to_string())
    }

    /// Keyword search across all entries.
    #[tool(description = "Search knowledge, decisions, and skills by keyword. Returns ranked hits with the best-matching line.")]
    async fn search(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<String, String> {
        let limit = params.limit.unwrap_or(self.config.search.default_limit);
        let include_entries = params.include_entries.unwrap_or(false);
        tracing::info!(query = %params.query, limit, "search called");

        let query = params.query;
        let result = self
            .blocking(move |store| {
                let hits = store.search(&query, Some(limit))?;
                if !include_entries {
                    return Ok(json!({ "total": hits.len(), "hits": hits }));
                }
                let mut results = Vec::with_capacity(hits.len());
                for hit in hits.iter() {
                    results.push(json!({ "hit": hit, "entry": store.read(hit.kind, &hit.id)? }));
                }
                Ok(json!({ "total": results.len(), "hits": results }))
            })
            .await?;
        Ok(result.to_string())
    }

    /// Read a `context://` resource.
    #[tool(description = "Read a context resource: context://knowledge[/<key>], context://decisions[/<id>], context://skills[/<name>], context://manifest, context://onboarding.")]
    async fn read_context(
        &self,
        Parameters(params): Parameters<ReadContextParams>,
    ) -> Result<String, String> {
        tracing::debug!(uri = %params.uri, "read_context called");
        let limits = self.config.onboarding_limits();
        let uri = params.uri;
        let value = self
            .blocking(move |store| resources::read_resource(store, &uri, limits))
            .await?;
        Ok(value.to_string())
    }

    /// Commit local changes, merge the remote, and publish.
    #[tool(description = "Sync with the team: commit local context changes, merge remote changes, and push. Conflicts stop the sync and are reported with both file locations.")]
    async fn sync_push(
        &self,
        Parameters(params): Parameters<SyncParams>,
    ) -> Result<String, String> {
        self.sync(SyncMode::Push, params).await
    }

    /// Commit local changes and merge the remote without publishing.
    #[tool(description = "Fetch and merge remote context changes without pushing local work.")]
    async fn sync_pull(
        &self,
        Parameters(params): Parameters<SyncParams>,
    ) -> Result<String, String> {
        self.sync(SyncMode::Pull, params).await
    }

    /// Summary for a fresh agent session.
    #[tool(description = "Get an onboarding summary: project, entry counts, decisions, skills, recent changes, open conflicts, and sync history. Pass 'agent' to also open a session.")]
    async fn onboarding(
        &self,
        Parameters(params): Parameters<OnboardingParams>,
    ) -> Result<String, String> {
        let defaults = self.config.onboarding_limits();
        let limits = OnboardingLimits {
            recent_items: params.recent_items.unwrap_or(defaults.recent_items),
            recent_syncs: params.recent_syncs.unwrap_or(defaults.recent_syncs),
        };
        tracing::info!(agent = ?params.agent, "onboarding called");

        let agent = params.agent;
        let value = self
            .blocking(move |store| {
                let started = agent
                    .as_deref()
                    .map(|agent| session::start_session(store, agent))
                    .transpose()?;
                let summary = session::onboarding(store, limits.recent_items, limits.recent_syncs)?;
                let mut value = serde_json::to_value(summary)?;
                if let Some(record) = started {
                    value["session_id"] = json!(record.id);
                }
                Ok(value)
            })
            .await?;
        Ok(value.to_string())
    }

    /// Close a session opened by `onboarding`.
    #[tool(description = "End a session started by onboarding, recording a short summary of the work done.")]
    async fn end_session(
        &self,
        Parameters(params): Parameters<EndSessionParams>,
    ) -> Result<String, String> {
        tracing::info!(session = %params.session_id, "end_session called");
        let record = self
            .blocking(move |store| {
                session::end_session(store, &params.session_id, params.summary.as_deref())
            })
            .await?;
        to_json(&record)
    }
}

impl CtxTools {
    /// Run store work off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&ContextStore) -> ctxvault::error::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| format!("store task failed: {e}"))?
            .map_err(tool_error)
    }

    async fn sync(&self, mode: SyncMode, params: SyncParams) -> Result<String, String> {
        tracing::info!(mode = ?mode, reason = ?params.reason, "sync called");
        let engine = Arc::clone(&self.engine);
        let outcome = self
            .blocking(move |store| engine.run(store, mode, &CancelFlag::new()))
            .await?;
        to_json(&outcome)
    }
}

/// Render a store error for the calling agent, with conflict locations when
/// there are any.
fn tool_error(err: StoreError) -> String {
    let mut body = json!({
        "error": err.to_string(),
        "retryable": err.is_retryable(),
    });
    if let StoreError::ConflictUnresolved { conflicts } = &err {
        body["conflicts"] = json!(conflicts);
    }
    body.to_string()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_handler]
impl ServerHandler for CtxTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "ctxvault is a shared, git-backed context store. Call onboarding first, \
                 search before adding, record_decision for architecture choices, and \
                 sync_push when done."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
