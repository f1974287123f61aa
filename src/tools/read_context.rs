//! MCP `read_context` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `read_context` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadContextParams {
    #[schemars(
        description = "Resource URI: context://knowledge[/<key>], context://decisions[/<id>], context://skills[/<name>], context://manifest, or context://onboarding"
    )]
    pub uri: String,
}
