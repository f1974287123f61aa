use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateKnowledgeParams {
    #[schemars(description = "Key of the existing note")]
    pub key: String,

    #[schemars(description = "New markdown body. Replaces the previous body entirely.")]
    pub content: String,
}
