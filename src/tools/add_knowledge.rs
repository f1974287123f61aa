//! MCP `add_knowledge` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `add_knowledge` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddKnowledgeParams {
    /// Lowercase slug identifying the note, e.g. `architecture`.
    #[schemars(description = "Lowercase slug for the note (a-z, 0-9, '-', '_'), e.g. 'architecture'")]
    pub key: String,

    #[schemars(description = "Free-form markdown body of the note")]
    pub content: String,
}
