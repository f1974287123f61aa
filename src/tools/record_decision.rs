//! MCP `record_decision` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `record_decision` MCP tool.
///
/// The id (`ADR-NNNN`) is allocated by the store.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecordDecisionParams {
    #[schemars(description = "Short title, e.g. 'Use Postgres'")]
    pub title: String,

    #[schemars(description = "Forces and background that led to the decision")]
    pub context: String,

    #[schemars(description = "What was decided")]
    pub decision: String,

    #[schemars(description = "Resulting trade-offs and follow-ups")]
    pub consequences: String,

    /// `proposed`, `accepted`, `superseded`, or `deprecated`.
    #[schemars(
        description = "Status: 'proposed', 'accepted', 'superseded', 'deprecated'. Defaults to 'accepted'."
    )]
    pub status: Option<String>,
}
