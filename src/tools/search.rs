//! MCP `search` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Whitespace-separated terms; an entry matches if it contains any of them.
    #[schemars(description = "Search terms. Entries matching any term are returned, best first.")]
    pub query: String,

    /// Maximum number of hits. Defaults to the configured search limit.
    #[schemars(description = "Maximum number of hits to return")]
    pub limit: Option<usize>,

    #[schemars(description = "If true, include each hit's full entry. Defaults to false.")]
    pub include_entries: Option<bool>,
}
